//! lotusc-par - Recursive-descent parser for Lotus.
//!
//! Consumes the token stream and produces the ordered top-level AST.
//! Expression parsing is Pratt-style (see [`expr`]); statements and
//! items are plain recursive descent. The parser stops at the first
//! syntactic error: [`Parser::parse`] returns a [`ParseError`] which is
//! also recorded in the shared diagnostic [`Handler`].

pub mod ast;
mod expr;
mod items;
mod stmt;

pub use ast::*;

use lotusc_lex::{keyword_names, Token, TokenKind};
use lotusc_util::{find_similar, Diagnostic, DiagnosticCode, Handler, Span};
use thiserror::Error;

/// What went wrong, mirrored into a diagnostic code on emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    ExpectedToken,
    MissingBrace,
    MissingSemicolon,
    MissingIdentifier,
    MissingType,
    InvalidExpression,
    InvalidDeclaration,
    UnexpectedEof,
}

impl ParseErrorKind {
    fn code(self) -> DiagnosticCode {
        match self {
            ParseErrorKind::UnexpectedToken => DiagnosticCode::E0201,
            ParseErrorKind::ExpectedToken => DiagnosticCode::E0202,
            ParseErrorKind::MissingBrace => DiagnosticCode::E0203,
            ParseErrorKind::MissingSemicolon => DiagnosticCode::E0204,
            ParseErrorKind::MissingIdentifier => DiagnosticCode::E0205,
            ParseErrorKind::MissingType => DiagnosticCode::E0206,
            ParseErrorKind::InvalidExpression => DiagnosticCode::E0207,
            ParseErrorKind::InvalidDeclaration => DiagnosticCode::E0208,
            ParseErrorKind::UnexpectedEof => DiagnosticCode::E0209,
        }
    }
}

/// A fatal syntactic error. The parser does not attempt recovery.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub span: Span,
    /// Keyword-typo candidate, when an identifier sat where a keyword
    /// was expected.
    pub suggestion: Option<String>,
}

impl ParseError {
    fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

/// Result alias for parser productions.
pub type PResult<T> = Result<T, ParseError>;

/// The Lotus parser.
///
/// # Example
///
/// ```
/// use lotusc_lex::Lexer;
/// use lotusc_par::Parser;
/// use lotusc_util::Handler;
///
/// let handler = Handler::new();
/// let tokens = Lexer::new("int x = 1;", &handler).tokenize();
/// let ast = Parser::new(tokens, &handler).parse().unwrap();
/// assert_eq!(ast.len(), 1);
/// ```
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    handler: &'a Handler,
    /// Fallback token when reading past the end of the stream.
    eof: Token,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, handler: &'a Handler) -> Self {
        let eof = Token::new(
            TokenKind::Eof,
            tokens.last().map(|t| t.span).unwrap_or(Span::DUMMY),
        );
        Self {
            tokens,
            pos: 0,
            handler,
            eof,
        }
    }

    /// Parse the whole token stream into top-level statements.
    ///
    /// The first syntactic error aborts parsing; it is recorded in the
    /// handler and returned.
    pub fn parse(&mut self) -> PResult<Ast> {
        let mut stmts = Vec::new();

        self.skip_newlines();
        while !self.at_eof() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.emit(&err);
                    return Err(err);
                }
            }
            self.skip_newlines();
        }

        Ok(stmts)
    }

    fn emit(&self, err: &ParseError) {
        let mut diag =
            Diagnostic::error(err.message.clone(), err.span).with_code(err.kind.code());
        if let Some(s) = &err.suggestion {
            diag = diag.with_suggestion(s.clone());
        }
        self.handler.emit(diag);
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    pub(crate) fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.current().kind
    }

    pub(crate) fn span(&self) -> Span {
        self.current().span
    }

    /// Kind of the token `n` ahead, skipping nothing.
    pub(crate) fn peek_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    /// Consume the current token if it has the given kind.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, err: ParseErrorKind) -> PResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        if self.at_eof() {
            return Err(self.error(
                ParseErrorKind::UnexpectedEof,
                format!("expected `{}`, found end of file", kind),
            ));
        }

        // An identifier in keyword position is often a typo.
        let suggestion = match (&self.current().kind, &self.current().value) {
            (TokenKind::Ident, Some(text)) => {
                find_similar(text, keyword_names(), 2).map(str::to_string)
            }
            _ => None,
        };

        Err(self
            .error(
                err,
                format!("expected `{}`, found `{}`", kind, self.current().lexeme()),
            )
            .with_suggestion(suggestion))
    }

    pub(crate) fn expect_ident(&mut self) -> PResult<(String, Span)> {
        let token = self.expect(TokenKind::Ident, ParseErrorKind::MissingIdentifier)?;
        let span = token.span;
        Ok((token.value.unwrap_or_default(), span))
    }

    pub(crate) fn expect_semicolon(&mut self) -> PResult<()> {
        self.expect(TokenKind::Semicolon, ParseErrorKind::MissingSemicolon)?;
        Ok(())
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    pub(crate) fn error(&self, kind: ParseErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::new(kind, message, self.span())
    }

    // =========================================================================
    // Types
    // =========================================================================

    /// Parse a type: a type keyword or named type, optionally prefixed
    /// with `*` (pointer) and suffixed with `[]`/`[N]` (array).
    pub(crate) fn parse_type(&mut self) -> PResult<Type> {
        if self.eat(TokenKind::Star) {
            let inner = self.parse_type()?;
            return Ok(Type::Ptr(Box::new(inner)));
        }

        let base = match self.kind() {
            TokenKind::Int => Type::Int,
            TokenKind::Int8 => Type::Int8,
            TokenKind::Int16 => Type::Int16,
            TokenKind::Int32 => Type::Int32,
            TokenKind::Int64 => Type::Int64,
            TokenKind::UInt => Type::UInt,
            TokenKind::UInt8 => Type::UInt8,
            TokenKind::UInt16 => Type::UInt16,
            TokenKind::UInt32 => Type::UInt32,
            TokenKind::UInt64 => Type::UInt64,
            TokenKind::Float => Type::Float,
            TokenKind::Bool => Type::Bool,
            TokenKind::Str => Type::Str,
            TokenKind::Void => Type::Void,
            TokenKind::Ident => {
                let name = self.current().value.clone().unwrap_or_default();
                Type::Named(name)
            }
            _ => {
                return Err(self.error(
                    ParseErrorKind::MissingType,
                    format!("expected a type, found `{}`", self.current().lexeme()),
                ));
            }
        };
        self.advance();

        if self.eat(TokenKind::LBracket) {
            let size = if self.check(TokenKind::IntLit) {
                let token = self.advance();
                let text = token.value.unwrap_or_default();
                Some(text.parse::<usize>().map_err(|_| {
                    ParseError::new(
                        ParseErrorKind::InvalidDeclaration,
                        format!("invalid array size `{}`", text),
                        token.span,
                    )
                })?)
            } else {
                None
            };
            self.expect(TokenKind::RBracket, ParseErrorKind::ExpectedToken)?;
            return Ok(Type::Array(Box::new(base), size));
        }

        Ok(base)
    }
}
