//! Expression parsing (Pratt / top-down operator precedence).
//!
//! # Operator precedence (lowest to highest)
//!
//! | Level | Operators | Node |
//! |-------|-----------|------|
//! | 1 | `?:` | `Ternary` |
//! | 2 | `\|\|` | `Logical` |
//! | 3 | `&&` | `Logical` |
//! | 4 | `==`, `!=` | `Comparison` |
//! | 5 | `<`, `<=`, `>`, `>=` | `Comparison` |
//! | 6 | `\|` | `Binary` |
//! | 7 | `^` | `Binary` |
//! | 8 | `&` | `Binary` |
//! | 9 | `<<`, `>>` | `Binary` |
//! | 10 | `+`, `-` | `Binary` |
//! | 11 | `*`, `/`, `%` | `Binary` |
//!
//! Comparison chains parse left-associatively into nested `Comparison`
//! nodes; parentheses escape the ladder.

use crate::ast::*;
use crate::{PResult, ParseErrorKind, Parser};
use lotusc_lex::TokenKind;

/// Binding power levels. Higher binds tighter; left-associative
/// operators use `(bp, bp + 1)`.
mod bp {
    pub const MIN: u8 = 0;
    pub const LOGICAL_OR: u8 = 2;
    pub const LOGICAL_AND: u8 = 4;
    pub const EQUALITY: u8 = 6;
    pub const RELATIONAL: u8 = 8;
    pub const BITWISE_OR: u8 = 10;
    pub const BITWISE_XOR: u8 = 12;
    pub const BITWISE_AND: u8 = 14;
    pub const SHIFT: u8 = 16;
    pub const ADDITIVE: u8 = 18;
    pub const MULTIPLICATIVE: u8 = 20;
    pub const UNARY: u8 = 24;
}

/// What an infix token combines into.
enum Infix {
    Binary(BinOp),
    Comparison(CmpOp),
    Logical(LogicalOp),
}

fn infix_binding_power(kind: TokenKind) -> Option<(u8, Infix)> {
    let entry = match kind {
        TokenKind::OrOr => (bp::LOGICAL_OR, Infix::Logical(LogicalOp::Or)),
        TokenKind::AndAnd => (bp::LOGICAL_AND, Infix::Logical(LogicalOp::And)),
        TokenKind::EqEq => (bp::EQUALITY, Infix::Comparison(CmpOp::Eq)),
        TokenKind::NotEq => (bp::EQUALITY, Infix::Comparison(CmpOp::Ne)),
        TokenKind::Lt => (bp::RELATIONAL, Infix::Comparison(CmpOp::Lt)),
        TokenKind::LtEq => (bp::RELATIONAL, Infix::Comparison(CmpOp::Le)),
        TokenKind::Gt => (bp::RELATIONAL, Infix::Comparison(CmpOp::Gt)),
        TokenKind::GtEq => (bp::RELATIONAL, Infix::Comparison(CmpOp::Ge)),
        TokenKind::Pipe => (bp::BITWISE_OR, Infix::Binary(BinOp::BitOr)),
        TokenKind::Caret => (bp::BITWISE_XOR, Infix::Binary(BinOp::BitXor)),
        TokenKind::Amp => (bp::BITWISE_AND, Infix::Binary(BinOp::BitAnd)),
        TokenKind::Shl => (bp::SHIFT, Infix::Binary(BinOp::Shl)),
        TokenKind::Shr => (bp::SHIFT, Infix::Binary(BinOp::Shr)),
        TokenKind::Plus => (bp::ADDITIVE, Infix::Binary(BinOp::Add)),
        TokenKind::Minus => (bp::ADDITIVE, Infix::Binary(BinOp::Sub)),
        TokenKind::Star => (bp::MULTIPLICATIVE, Infix::Binary(BinOp::Mul)),
        TokenKind::Slash => (bp::MULTIPLICATIVE, Infix::Binary(BinOp::Div)),
        TokenKind::Percent => (bp::MULTIPLICATIVE, Infix::Binary(BinOp::Mod)),
        _ => return None,
    };
    Some(entry)
}

impl<'a> Parser<'a> {
    /// Parse a complete expression, including the ternary operator.
    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        let cond = self.parse_bp(bp::MIN)?;

        if self.eat(TokenKind::Question) {
            let span = cond.span();
            let then_expr = self.parse_expr()?;
            self.expect(TokenKind::Colon, ParseErrorKind::ExpectedToken)?;
            let else_expr = self.parse_expr()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                span,
            });
        }

        Ok(cond)
    }

    /// Pratt core: parse while the next operator binds at least as
    /// tightly as `min_bp`.
    fn parse_bp(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_prefix()?;

        while let Some((lbp, _)) = infix_binding_power(self.kind()) {
            if lbp < min_bp {
                break;
            }
            let (_, infix) = infix_binding_power(self.kind()).unwrap();
            self.advance();

            let rhs = self.parse_bp(lbp + 1)?;
            let span = lhs.span();
            lhs = match infix {
                Infix::Binary(op) => Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
                Infix::Comparison(op) => Expr::Comparison {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
                Infix::Logical(op) => Expr::Logical {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                },
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.kind() {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_bp(bp::UNARY)?;
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_bp(bp::UNARY)?;
                Ok(Expr::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_bp(bp::UNARY)?;
                Ok(Expr::Unary {
                    op: UnOp::BitNot,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Amp => {
                self.advance();
                let operand = self.parse_bp(bp::UNARY)?;
                Ok(Expr::Ref {
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Star => {
                self.advance();
                let operand = self.parse_bp(bp::UNARY)?;
                Ok(Expr::Deref {
                    operand: Box::new(operand),
                    span,
                })
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.kind() {
            TokenKind::IntLit => {
                let token = self.advance();
                let text = token.value.unwrap_or_default();
                let value = text.parse::<i64>().map_err(|_| {
                    self.error(
                        ParseErrorKind::InvalidExpression,
                        format!("integer literal `{}` out of range", text),
                    )
                })?;
                Ok(Expr::IntLit { value, span })
            }
            TokenKind::FloatLit => {
                let token = self.advance();
                let text = token.value.unwrap_or_default();
                Ok(Expr::FloatLit {
                    value: parse_fixed_point(&text),
                    span,
                })
            }
            TokenKind::StrLit => {
                let token = self.advance();
                Ok(Expr::StrLit {
                    value: token.value.unwrap_or_default(),
                    span,
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit { value: true, span })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit { value: false, span })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null { span })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, ParseErrorKind::ExpectedToken)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedToken)?;
                Ok(Expr::ArrayLit { elems, span })
            }
            TokenKind::New => {
                self.advance();
                let (name, _) = self.expect_ident()?;
                let fields = self.parse_field_inits()?;
                Ok(Expr::StructLit { name, fields, span })
            }
            TokenKind::Ident => {
                let token = self.advance();
                let name = token.value.unwrap_or_default();

                if self.eat(TokenKind::ColonColon) {
                    let (second, _) = self.expect_ident()?;
                    if self.check(TokenKind::LParen) {
                        let qualified = format!("{}::{}", name, second);
                        return self.parse_call(qualified, span);
                    }
                    return Ok(Expr::EnumLit {
                        enum_name: name,
                        variant: second,
                        span,
                    });
                }

                if self.check(TokenKind::LParen) {
                    return self.parse_call(name, span);
                }

                Ok(Expr::Ident { name, span })
            }
            TokenKind::Eof => Err(self.error(
                ParseErrorKind::UnexpectedEof,
                "unexpected end of file in expression",
            )),
            _ => Err(self.error(
                ParseErrorKind::InvalidExpression,
                format!("expected an expression, found `{}`", self.current().lexeme()),
            )),
        }
    }

    /// Parse the parenthesized argument list of a call. The memory
    /// primitives get dedicated AST variants.
    fn parse_call(&mut self, name: String, span: lotusc_util::Span) -> PResult<Expr> {
        self.expect(TokenKind::LParen, ParseErrorKind::ExpectedToken)?;

        if name == "sizeof" {
            let arg = if self.kind().is_type_keyword() && self.peek_kind(1) == TokenKind::RParen {
                SizeofArg::Type(self.parse_type()?)
            } else {
                SizeofArg::Expr(self.parse_expr()?)
            };
            self.expect(TokenKind::RParen, ParseErrorKind::ExpectedToken)?;
            return Ok(Expr::Sizeof {
                arg: Box::new(arg),
                span,
            });
        }

        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedToken)?;

        match name.as_str() {
            "malloc" if args.len() == 1 => Ok(Expr::Malloc {
                size: Box::new(args.into_iter().next().unwrap()),
                span,
            }),
            "free" if args.len() == 1 => Ok(Expr::Free {
                ptr: Box::new(args.into_iter().next().unwrap()),
                span,
            }),
            _ => Ok(Expr::Call { name, args, span }),
        }
    }

    /// Postfix suffixes: indexing, field access, method calls.
    fn parse_postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            let span = expr.span();
            match self.kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedToken)?;
                    expr = Expr::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let is_pointer = self.kind() == TokenKind::Arrow;
                    self.advance();
                    let (member, _) = self.expect_ident()?;

                    if self.check(TokenKind::LParen) {
                        self.advance();
                        let mut args = Vec::new();
                        if !self.check(TokenKind::RParen) {
                            loop {
                                args.push(self.parse_expr()?);
                                if !self.eat(TokenKind::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(TokenKind::RParen, ParseErrorKind::ExpectedToken)?;
                        expr = Expr::MethodCall {
                            object: Box::new(expr),
                            method: member,
                            args,
                            span,
                        };
                    } else {
                        expr = Expr::FieldAccess {
                            object: Box::new(expr),
                            field: member,
                            is_pointer,
                            span,
                        };
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parse the `{name: value, ...}` initializer list of `new`.
    pub(crate) fn parse_field_inits(&mut self) -> PResult<Vec<(String, Expr)>> {
        self.expect(TokenKind::LBrace, ParseErrorKind::MissingBrace)?;
        self.skip_newlines();

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let (name, _) = self.expect_ident()?;
            self.expect(TokenKind::Colon, ParseErrorKind::ExpectedToken)?;
            let value = self.parse_expr()?;
            fields.push((name, value));

            if !self.eat(TokenKind::Comma) {
                self.skip_newlines();
                break;
            }
            self.skip_newlines();
        }

        self.expect(TokenKind::RBrace, ParseErrorKind::MissingBrace)?;
        Ok(fields)
    }
}

/// Convert a float lexeme to the fixed-point (×1000) representation.
fn parse_fixed_point(text: &str) -> i64 {
    let mut parts = text.splitn(2, '.');
    let whole: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let frac_text = parts.next().unwrap_or("");

    let mut frac = 0i64;
    for (i, c) in frac_text.chars().take(3).enumerate() {
        frac += (c as i64 - '0' as i64) * 10i64.pow(2 - i as u32);
    }

    whole * 1000 + frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_lex::Lexer;
    use lotusc_util::Handler;

    fn parse_one_expr(source: &str) -> Expr {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler).tokenize();
        let mut parser = Parser::new(tokens, &handler);
        parser.parse_expr().expect("expression should parse")
    }

    #[test]
    fn test_precedence_mul_over_add() {
        // 2 + 3 * 4 => 2 + (3 * 4)
        match parse_one_expr("2 + 3 * 4") {
            Expr::Binary {
                op: BinOp::Add,
                rhs,
                ..
            } => match *rhs {
                Expr::Binary {
                    op: BinOp::Mul, ..
                } => {}
                other => panic!("expected multiplication on the right, got {:?}", other),
            },
            other => panic!("expected addition at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associativity() {
        // 10 - 3 - 2 => (10 - 3) - 2
        match parse_one_expr("10 - 3 - 2") {
            Expr::Binary {
                op: BinOp::Sub,
                lhs,
                rhs,
                ..
            } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinOp::Sub, .. }));
                assert!(matches!(*rhs, Expr::IntLit { value: 2, .. }));
            }
            other => panic!("expected subtraction at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_parens_escape_precedence() {
        match parse_one_expr("(2 + 3) * 4") {
            Expr::Binary {
                op: BinOp::Mul,
                lhs,
                ..
            } => assert!(matches!(*lhs, Expr::Binary { op: BinOp::Add, .. })),
            other => panic!("expected multiplication at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_below_arithmetic() {
        match parse_one_expr("a + 1 < b * 2") {
            Expr::Comparison { op: CmpOp::Lt, .. } => {}
            other => panic!("expected comparison at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_chain() {
        match parse_one_expr("a && b || c") {
            Expr::Logical {
                op: LogicalOp::Or,
                lhs,
                ..
            } => assert!(matches!(
                *lhs,
                Expr::Logical {
                    op: LogicalOp::And,
                    ..
                }
            )),
            other => panic!("expected || at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary() {
        match parse_one_expr("a > 0 ? 1 : 2") {
            Expr::Ternary { cond, .. } => {
                assert!(matches!(*cond, Expr::Comparison { op: CmpOp::Gt, .. }))
            }
            other => panic!("expected ternary, got {:?}", other),
        }
    }

    #[test]
    fn test_qualified_call_and_enum_literal() {
        match parse_one_expr("io::println(1)") {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "io::println");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected call, got {:?}", other),
        }
        match parse_one_expr("Color::Red") {
            Expr::EnumLit {
                enum_name, variant, ..
            } => {
                assert_eq!(enum_name, "Color");
                assert_eq!(variant, "Red");
            }
            other => panic!("expected enum literal, got {:?}", other),
        }
    }

    #[test]
    fn test_memory_primitives() {
        assert!(matches!(parse_one_expr("malloc(64)"), Expr::Malloc { .. }));
        assert!(matches!(parse_one_expr("free(p)"), Expr::Free { .. }));
        match parse_one_expr("sizeof(int16)") {
            Expr::Sizeof { arg, .. } => assert_eq!(*arg, SizeofArg::Type(Type::Int16)),
            other => panic!("expected sizeof, got {:?}", other),
        }
        match parse_one_expr("sizeof(x)") {
            Expr::Sizeof { arg, .. } => {
                assert!(matches!(*arg, SizeofArg::Expr(Expr::Ident { .. })))
            }
            other => panic!("expected sizeof, got {:?}", other),
        }
    }

    #[test]
    fn test_postfix_chain() {
        match parse_one_expr("points[2].dist(origin)") {
            Expr::MethodCall { object, method, .. } => {
                assert_eq!(method, "dist");
                assert!(matches!(*object, Expr::Index { .. }));
            }
            other => panic!("expected method call, got {:?}", other),
        }
    }

    #[test]
    fn test_pointer_field_access() {
        match parse_one_expr("p->x") {
            Expr::FieldAccess {
                is_pointer: true, ..
            } => {}
            other => panic!("expected pointer field access, got {:?}", other),
        }
    }

    #[test]
    fn test_new_struct_literal() {
        match parse_one_expr("new Point{x: 1, y: 2}") {
            Expr::StructLit { name, fields, .. } => {
                assert_eq!(name, "Point");
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].0, "x");
            }
            other => panic!("expected struct literal, got {:?}", other),
        }
    }

    #[test]
    fn test_fixed_point_floats() {
        assert_eq!(parse_fixed_point("3.14"), 3140);
        assert_eq!(parse_fixed_point("0.5"), 500);
        assert_eq!(parse_fixed_point("2.001"), 2001);
        assert_eq!(parse_fixed_point("7.0"), 7000);
        match parse_one_expr("1.25") {
            Expr::FloatLit { value, .. } => assert_eq!(value, 1250),
            other => panic!("expected float literal, got {:?}", other),
        }
    }

    #[test]
    fn test_ref_and_deref() {
        assert!(matches!(parse_one_expr("&x"), Expr::Ref { .. }));
        assert!(matches!(parse_one_expr("*p"), Expr::Deref { .. }));
    }

    #[test]
    fn test_bitwise_between_comparison_and_shift() {
        // a == b & c  =>  a == (b & c)
        match parse_one_expr("a == b & c") {
            Expr::Comparison { op: CmpOp::Eq, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::BitAnd, .. }))
            }
            other => panic!("expected comparison at the root, got {:?}", other),
        }
    }
}
