//! Statement parsing: declarations, control flow, assignments.

use crate::ast::*;
use crate::{PResult, ParseErrorKind, Parser};
use lotusc_lex::{keyword_names, TokenKind};
use lotusc_util::find_similar;

impl<'a> Parser<'a> {
    /// Parse one statement at top level or inside a body.
    pub(crate) fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.kind() {
            TokenKind::Use => self.parse_import(),
            TokenKind::Const => self.parse_const_decl(),
            TokenKind::Fn => self.parse_function().map(Stmt::FunctionDef),
            TokenKind::Struct => self.parse_struct().map(Stmt::StructDef),
            TokenKind::Enum => self.parse_enum().map(Stmt::EnumDef),
            TokenKind::Class => self.parse_class().map(Stmt::ClassDef),
            TokenKind::Ret | TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => self.parse_throw(),
            kind if kind.is_type_keyword() => self.parse_var_decl(),
            TokenKind::Ident => {
                // `Point p = ...` declares with a named type; anything
                // else is an expression statement.
                if self.peek_kind(1) == TokenKind::Ident {
                    self.parse_var_decl()
                } else if let Some(suggestion) = self.keyword_typo() {
                    Err(self
                        .error(
                            ParseErrorKind::UnexpectedToken,
                            format!("unexpected identifier `{}`", self.current().lexeme()),
                        )
                        .with_suggestion(Some(suggestion)))
                } else {
                    self.parse_expr_stmt()
                }
            }
            TokenKind::Star => self.parse_expr_stmt(),
            TokenKind::Eof => Err(self.error(
                ParseErrorKind::UnexpectedEof,
                "unexpected end of file, expected a statement",
            )),
            _ => {
                let suggestion = match (&self.current().kind, &self.current().value) {
                    (TokenKind::Ident, Some(text)) => {
                        find_similar(text, keyword_names(), 2).map(str::to_string)
                    }
                    _ => None,
                };
                Err(self
                    .error(
                        ParseErrorKind::UnexpectedToken,
                        format!("unexpected token `{}`", self.current().lexeme()),
                    )
                    .with_suggestion(suggestion))
            }
        }
    }

    /// `{ stmt* }` with newlines tolerated between statements.
    pub(crate) fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, ParseErrorKind::MissingBrace)?;
        self.skip_newlines();

        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error(
                    ParseErrorKind::MissingBrace,
                    "missing `}` before end of file",
                ));
            }
            stmts.push(self.parse_stmt()?);
            self.skip_newlines();
        }

        self.expect(TokenKind::RBrace, ParseErrorKind::MissingBrace)?;
        Ok(stmts)
    }

    /// Typed variable or array declaration:
    /// `int x = e;` / `Point p;` / `int[4] xs = [1, 2, 3, 4];`
    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let ty = self.parse_type()?;
        let (name, _) = self.expect_ident()?;

        if let Type::Array(elem_type, size) = ty {
            let initial = if self.eat(TokenKind::Eq) {
                match self.parse_expr()? {
                    Expr::ArrayLit { elems, .. } => elems,
                    _ => {
                        return Err(self.error(
                            ParseErrorKind::InvalidDeclaration,
                            "array declaration initializer must be an array literal",
                        ));
                    }
                }
            } else {
                Vec::new()
            };
            self.expect_semicolon()?;
            return Ok(Stmt::ArrayDecl {
                name,
                elem_type: *elem_type,
                size,
                initial,
                span,
            });
        }

        let value = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_semicolon()?;

        Ok(Stmt::VariableDecl {
            name,
            ty,
            value,
            span,
        })
    }

    /// `const int NAME = value;`
    fn parse_const_decl(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::Const, ParseErrorKind::ExpectedToken)?;
        let ty = self.parse_type()?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::Eq, ParseErrorKind::InvalidDeclaration)?;
        let value = self.parse_expr()?;
        self.expect_semicolon()?;

        Ok(Stmt::ConstantDecl {
            name,
            ty,
            value,
            span,
        })
    }

    /// `ret e;` / `return e;` / `ret;`
    fn parse_return(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();

        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_semicolon()?;

        Ok(Stmt::Return { value, span })
    }

    /// `if cond { } elif cond { } else { }`; each `elif` arm becomes a
    /// nested `If` in the else body.
    fn parse_if(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::If, ParseErrorKind::ExpectedToken)?;

        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        self.skip_newlines();
        let else_body = self.parse_trailing_else()?;

        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            span,
        })
    }

    /// The `elif`/`else` continuation of an `if` chain.
    fn parse_trailing_else(&mut self) -> PResult<Vec<Stmt>> {
        if self.check(TokenKind::Elif) {
            let span = self.span();
            self.advance();
            let cond = self.parse_expr()?;
            let then_body = self.parse_block()?;
            self.skip_newlines();
            let else_body = self.parse_trailing_else()?;
            return Ok(vec![Stmt::If {
                cond,
                then_body,
                else_body,
                span,
            }]);
        }
        if self.eat(TokenKind::Else) {
            return Ok(self.parse_block()?);
        }
        Ok(Vec::new())
    }

    /// `while cond { body }`
    fn parse_while(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::While, ParseErrorKind::ExpectedToken)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;

        Ok(Stmt::While { cond, body, span })
    }

    /// `for (init; cond; update) { body }`; each header slot may be
    /// empty.
    fn parse_for(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::For, ParseErrorKind::ExpectedToken)?;
        self.expect(TokenKind::LParen, ParseErrorKind::ExpectedToken)?;

        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else {
            // The init statement consumes its own semicolon.
            let stmt = if self.kind().is_type_keyword() {
                self.parse_var_decl()?
            } else {
                self.parse_expr_stmt()?
            };
            Some(Box::new(stmt))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_semicolon()?;

        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_assign_like(false)?))
        };
        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedToken)?;

        let body = self.parse_block()?;

        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
            span,
        })
    }

    /// `try { } catch { } finally { }`; the catch and finally arms are
    /// optional.
    fn parse_try(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::Try, ParseErrorKind::ExpectedToken)?;
        let body = self.parse_block()?;
        self.skip_newlines();

        let catch_body = if self.eat(TokenKind::Catch) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.skip_newlines();

        let finally_body = if self.eat(TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };

        Ok(Stmt::Try(TryStmt {
            body,
            catch_body,
            finally_body,
            span,
        }))
    }

    fn parse_throw(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(TokenKind::Throw, ParseErrorKind::ExpectedToken)?;
        let value = self.parse_expr()?;
        self.expect_semicolon()?;

        Ok(Stmt::Throw { value, span })
    }

    /// Expression statement: assignment, compound assignment,
    /// increment/decrement, or a bare call. Consumes the trailing
    /// semicolon.
    fn parse_expr_stmt(&mut self) -> PResult<Stmt> {
        let stmt = self.parse_assign_like(true)?;
        Ok(stmt)
    }

    /// The assignment-like core shared by expression statements and
    /// `for` updates. `want_semicolon` controls the trailing `;`.
    fn parse_assign_like(&mut self, want_semicolon: bool) -> PResult<Stmt> {
        let span = self.span();
        let target = self.parse_expr()?;

        let stmt = if self.eat(TokenKind::Eq) {
            let value = self.parse_expr()?;
            Stmt::Assign {
                target,
                value,
                span,
            }
        } else if let Some(op) = self.compound_assign_op() {
            self.advance();
            let value = self.parse_expr()?;
            Stmt::CompoundAssign {
                target,
                op,
                value,
                span,
            }
        } else if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            // `i++` / `i--` lower to compound assignment by 1.
            let op = if self.kind() == TokenKind::PlusPlus {
                BinOp::Add
            } else {
                BinOp::Sub
            };
            self.advance();
            Stmt::CompoundAssign {
                target,
                op,
                value: Expr::IntLit { value: 1, span },
                span,
            }
        } else {
            Stmt::Expr { expr: target, span }
        };

        if want_semicolon {
            self.expect_semicolon()?;
        }
        Ok(stmt)
    }

    /// A statement-initial identifier followed by something that cannot
    /// continue an expression is usually a mistyped keyword.
    fn keyword_typo(&self) -> Option<String> {
        let text = self.current().value.as_deref()?;
        let continues_like_keyword = matches!(
            self.peek_kind(1),
            TokenKind::True
                | TokenKind::False
                | TokenKind::IntLit
                | TokenKind::FloatLit
                | TokenKind::StrLit
                | TokenKind::LBrace
        );
        if !continues_like_keyword {
            return None;
        }
        find_similar(text, keyword_names(), 2).map(str::to_string)
    }

    fn compound_assign_op(&self) -> Option<BinOp> {
        match self.kind() {
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            _ => None,
        }
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
    fn test_variable_decl_with_value() {
        let ast = parse("int x = 2 + 3;");
        match &ast[0] {
            Stmt::VariableDecl {
                name, ty, value, ..
            } => {
                assert_eq!(name, "x");
                assert_eq!(*ty, Type::Int);
                assert!(value.is_some());
            }
            other => panic!("expected variable declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_named_type_decl() {
        let ast = parse("Point p = new Point{x: 1, y: 2};");
        match &ast[0] {
            Stmt::VariableDecl { ty, value, .. } => {
                assert_eq!(*ty, Type::Named("Point".into()));
                assert!(matches!(value, Some(Expr::StructLit { .. })));
            }
            other => panic!("expected variable declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_const_decl() {
        let ast = parse("const int MAX = 100;");
        assert!(matches!(&ast[0], Stmt::ConstantDecl { name, .. } if name == "MAX"));
    }

    #[test]
    fn test_array_decl() {
        let ast = parse("int[3] xs = [1, 2, 3];");
        match &ast[0] {
            Stmt::ArrayDecl {
                size, initial, ..
            } => {
                assert_eq!(*size, Some(3));
                assert_eq!(initial.len(), 3);
            }
            other => panic!("expected array declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_if_elif_else_chain() {
        let ast = parse("fn int f() { if a { ret 1; } elif b { ret 2; } else { ret 3; } }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            other => panic!("expected function, got {:?}", other),
        };
        match &body[0] {
            Stmt::If { else_body, .. } => {
                // elif arm became a nested If carrying the final else
                match &else_body[0] {
                    Stmt::If {
                        else_body: innermost,
                        ..
                    } => assert_eq!(innermost.len(), 1),
                    other => panic!("expected nested if, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_while_loop() {
        let ast = parse("fn void f() { while i < 10 { i += 1; } }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        assert!(matches!(&body[0], Stmt::While { .. }));
    }

    #[test]
    fn test_for_loop_full_header() {
        let ast = parse("fn void f() { for (int i = 0; i < 10; i++) { } }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        match &body[0] {
            Stmt::For {
                init,
                cond,
                update,
                ..
            } => {
                assert!(init.is_some());
                assert!(cond.is_some());
                assert!(matches!(
                    update.as_deref(),
                    Some(Stmt::CompoundAssign { op: BinOp::Add, .. })
                ));
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_for_loop_empty_header() {
        let ast = parse("fn void f() { for (;;) { } }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        match &body[0] {
            Stmt::For {
                init,
                cond,
                update,
                ..
            } => {
                assert!(init.is_none());
                assert!(cond.is_none());
                assert!(update.is_none());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_try_catch_finally() {
        let ast = parse("fn void f() { try { g(); } catch { h(); } finally { k(); } }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        match &body[0] {
            Stmt::Try(t) => {
                assert_eq!(t.body.len(), 1);
                assert_eq!(t.catch_body.len(), 1);
                assert_eq!(t.finally_body.len(), 1);
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_throw() {
        let ast = parse("fn void f() { throw 1; }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        assert!(matches!(&body[0], Stmt::Throw { .. }));
    }

    #[test]
    fn test_assignment_and_compound() {
        let ast = parse("fn void f() { x = 1; x += 2; x *= 3; }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        assert!(matches!(&body[0], Stmt::Assign { .. }));
        assert!(matches!(
            &body[1],
            Stmt::CompoundAssign { op: BinOp::Add, .. }
        ));
        assert!(matches!(
            &body[2],
            Stmt::CompoundAssign { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn test_increment_lowers_to_compound() {
        let ast = parse("fn void f() { i++; j--; }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        assert!(matches!(
            &body[0],
            Stmt::CompoundAssign { op: BinOp::Add, value: Expr::IntLit { value: 1, .. }, .. }
        ));
        assert!(matches!(
            &body[1],
            Stmt::CompoundAssign { op: BinOp::Sub, .. }
        ));
    }

    #[test]
    fn test_index_assignment_target() {
        let ast = parse("fn void f() { xs[0] = 5; p->x = 1; }");
        let body = match &ast[0] {
            Stmt::FunctionDef(def) => &def.body,
            _ => unreachable!(),
        };
        assert!(matches!(
            &body[0],
            Stmt::Assign { target: Expr::Index { .. }, .. }
        ));
        assert!(matches!(
            &body[1],
            Stmt::Assign { target: Expr::FieldAccess { is_pointer: true, .. }, .. }
        ));
    }

    #[test]
    fn test_missing_semicolon_error() {
        let handler = Handler::new();
        let tokens = Lexer::new("int x = 1", &handler).tokenize();
        let err = Parser::new(tokens, &handler).parse().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingSemicolon);
    }

    #[test]
    fn test_missing_brace_error() {
        let handler = Handler::new();
        let tokens = Lexer::new("fn void f() { int x = 1;", &handler).tokenize();
        let err = Parser::new(tokens, &handler).parse().unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingBrace);
    }
}
