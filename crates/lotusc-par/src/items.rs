//! Item parsing: imports, functions, structs, enums, classes.

use crate::ast::*;
use crate::{PResult, ParseErrorKind, Parser};
use lotusc_lex::TokenKind;

impl<'a> Parser<'a> {
    /// `use "module";` / `use "module::name";` / `use "module::*";`
    /// with an optional `as alias`. Exactly one item per `use`.
    pub(crate) fn parse_import(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::Use, ParseErrorKind::ExpectedToken)?;

        let token = self.expect(TokenKind::StrLit, ParseErrorKind::ExpectedToken)?;
        let path = token.value.unwrap_or_default();

        let (module, item, wildcard) = match path.split_once("::") {
            Some((module, "*")) => (module.to_string(), None, true),
            Some((module, item)) => (module.to_string(), Some(item.to_string()), false),
            None => (path, None, false),
        };

        let alias = if self.eat(TokenKind::As) {
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        self.expect_semicolon()?;

        Ok(Stmt::Import(Import {
            module,
            item,
            alias,
            wildcard,
            span,
        }))
    }

    /// `fn <return type> <name>(<type> <name>, ...) { body }`
    pub(crate) fn parse_function(&mut self) -> PResult<FunctionDef> {
        let span = self.span();
        self.expect(TokenKind::Fn, ParseErrorKind::ExpectedToken)?;
        let return_type = self.parse_type()?;
        let (name, _) = self.expect_ident()?;

        self.expect(TokenKind::LParen, ParseErrorKind::ExpectedToken)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param_span = self.span();
                let ty = self.parse_type()?;
                let (param_name, _) = self.expect_ident()?;
                params.push(Param {
                    name: param_name,
                    ty,
                    span: param_span,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedToken)?;

        let body = self.parse_block()?;

        Ok(FunctionDef {
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    /// `struct Name { <type> <name>; ... }`. Field offsets are the
    /// running sum of the element sizes in declaration order.
    pub(crate) fn parse_struct(&mut self) -> PResult<StructDef> {
        let span = self.span();
        self.expect(TokenKind::Struct, ParseErrorKind::ExpectedToken)?;
        let (name, _) = self.expect_ident()?;
        let fields = self.parse_field_decls()?;

        Ok(StructDef { name, fields, span })
    }

    /// `enum Name { A, B = 5, C }`. Unassigned values continue from
    /// the previous one, starting at 0.
    pub(crate) fn parse_enum(&mut self) -> PResult<EnumDef> {
        let span = self.span();
        self.expect(TokenKind::Enum, ParseErrorKind::ExpectedToken)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LBrace, ParseErrorKind::MissingBrace)?;
        self.skip_newlines();

        let mut values = Vec::new();
        let mut next_value = 0i64;
        while !self.check(TokenKind::RBrace) {
            let (variant, variant_span) = self.expect_ident()?;

            let value = if self.eat(TokenKind::Eq) {
                let token = self.expect(TokenKind::IntLit, ParseErrorKind::ExpectedToken)?;
                let text = token.value.unwrap_or_default();
                text.parse::<i64>().map_err(|_| {
                    crate::ParseError {
                        kind: ParseErrorKind::InvalidDeclaration,
                        message: format!("invalid enum value `{}`", text),
                        span: variant_span,
                        suggestion: None,
                    }
                })?
            } else {
                next_value
            };
            next_value = value + 1;

            values.push(EnumValue {
                name: variant,
                value,
            });

            if !self.eat(TokenKind::Comma) {
                self.skip_newlines();
                break;
            }
            self.skip_newlines();
        }

        self.expect(TokenKind::RBrace, ParseErrorKind::MissingBrace)?;

        Ok(EnumDef { name, values, span })
    }

    /// `class Name { <fields and methods> }`. Fields first or mixed;
    /// methods are ordinary `fn` definitions.
    pub(crate) fn parse_class(&mut self) -> PResult<ClassDef> {
        let span = self.span();
        self.expect(TokenKind::Class, ParseErrorKind::ExpectedToken)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LBrace, ParseErrorKind::MissingBrace)?;
        self.skip_newlines();

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut offset = 0usize;
        while !self.check(TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error(
                    ParseErrorKind::MissingBrace,
                    "missing `}` in class definition",
                ));
            }
            if self.check(TokenKind::Fn) {
                methods.push(self.parse_function()?);
            } else {
                let ty = self.parse_type()?;
                let (field_name, _) = self.expect_ident()?;
                self.expect_semicolon()?;
                let size = ty.size();
                fields.push(Field {
                    name: field_name,
                    ty,
                    offset,
                });
                offset += size;
            }
            self.skip_newlines();
        }

        self.expect(TokenKind::RBrace, ParseErrorKind::MissingBrace)?;

        Ok(ClassDef {
            name,
            fields,
            methods,
            span,
        })
    }

    /// Shared `{ <type> <name>; ... }` field list for structs.
    fn parse_field_decls(&mut self) -> PResult<Vec<Field>> {
        self.expect(TokenKind::LBrace, ParseErrorKind::MissingBrace)?;
        self.skip_newlines();

        let mut fields = Vec::new();
        let mut offset = 0usize;
        while !self.check(TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error(
                    ParseErrorKind::MissingBrace,
                    "missing `}` in struct definition",
                ));
            }
            let ty = self.parse_type()?;
            let (name, _) = self.expect_ident()?;
            self.expect_semicolon()?;

            let size = ty.size();
            fields.push(Field { name, ty, offset });
            offset += size;
            self.skip_newlines();
        }

        self.expect(TokenKind::RBrace, ParseErrorKind::MissingBrace)?;
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_lex::Lexer;
    use lotusc_util::Handler;

    fn parse(source: &str) -> Vec<Stmt> {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler).tokenize();
        Parser::new(tokens, &handler)
            .parse()
            .expect("source should parse")
    }

    #[test]
    fn test_import_forms() {
        let ast = parse("use \"io\";\nuse \"math::sqrt\";\nuse \"collections::*\";\nuse \"hash\" as h;");
        match &ast[0] {
            Stmt::Import(i) => {
                assert_eq!(i.module, "io");
                assert!(i.item.is_none());
                assert!(!i.wildcard);
            }
            other => panic!("expected import, got {:?}", other),
        }
        match &ast[1] {
            Stmt::Import(i) => {
                assert_eq!(i.module, "math");
                assert_eq!(i.item.as_deref(), Some("sqrt"));
            }
            other => panic!("expected import, got {:?}", other),
        }
        match &ast[2] {
            Stmt::Import(i) => {
                assert_eq!(i.module, "collections");
                assert!(i.wildcard);
            }
            other => panic!("expected import, got {:?}", other),
        }
        match &ast[3] {
            Stmt::Import(i) => {
                assert_eq!(i.alias.as_deref(), Some("h"));
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_function_signature() {
        let ast = parse("fn int add(int a, int b) { ret a + b; }");
        match &ast[0] {
            Stmt::FunctionDef(def) => {
                assert_eq!(def.name, "add");
                assert_eq!(def.return_type, Type::Int);
                assert_eq!(def.params.len(), 2);
                assert_eq!(def.params[1].name, "b");
                assert_eq!(def.body.len(), 1);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_field_offsets_are_running_sums() {
        let ast = parse("struct Mixed { int8 a; int16 b; int32 c; int d; }");
        match &ast[0] {
            Stmt::StructDef(def) => {
                let offsets: Vec<usize> = def.fields.iter().map(|f| f.offset).collect();
                assert_eq!(offsets, vec![0, 1, 3, 7]);
                assert_eq!(def.size(), 15);

                // invariant: offset(k) == sum(size(i) for i < k)
                let mut sum = 0;
                for field in &def.fields {
                    assert_eq!(field.offset, sum);
                    sum += field.ty.size();
                }
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_auto_assignment() {
        let ast = parse("enum Status { Ok, NotFound = 404, Error, Teapot = 418, Next }");
        match &ast[0] {
            Stmt::EnumDef(def) => {
                let values: Vec<i64> = def.values.iter().map(|v| v.value).collect();
                assert_eq!(values, vec![0, 404, 405, 418, 419]);
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_first_defaults_to_zero() {
        let ast = parse("enum Color { Red, Green, Blue }");
        match &ast[0] {
            Stmt::EnumDef(def) => {
                assert_eq!(def.value_of("Red"), Some(0));
                assert_eq!(def.value_of("Blue"), Some(2));
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn test_class_with_fields_and_methods() {
        let source = "class Counter {\n    int value;\n    fn void inc() { value += 1; }\n    fn int get() { ret value; }\n}";
        let ast = parse(source);
        match &ast[0] {
            Stmt::ClassDef(def) => {
                assert_eq!(def.name, "Counter");
                assert_eq!(def.fields.len(), 1);
                assert_eq!(def.methods.len(), 2);
                assert_eq!(def.methods[0].name, "inc");
            }
            other => panic!("expected class, got {:?}", other),
        }
    }
}
