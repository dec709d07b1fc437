//! The Lotus lexer.
//!
//! Dispatches on the first character of each token: identifiers and
//! keywords, numeric literals (integer by default, float on the first
//! `.`), double-quoted strings with escape processing, and
//! longest-match operator lexing. Lexical errors are fatal.

use lotusc_util::{Diagnostic, DiagnosticCode, Handler, Span};

use crate::cursor::Cursor;
use crate::token::{keyword_from_ident, Token, TokenKind};

/// The Lotus lexer.
///
/// # Example
///
/// ```
/// use lotusc_lex::{Lexer, TokenKind};
/// use lotusc_util::Handler;
///
/// let handler = Handler::new();
/// let tokens = Lexer::new("int x = 42;", &handler).tokenize();
/// assert_eq!(tokens.first().map(|t| t.kind), Some(TokenKind::Int));
/// assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
/// ```
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    handler: &'a Handler,

    /// Byte position where the current token started.
    token_start: usize,

    /// Line/column where the current token started.
    start_line: u32,
    start_column: u32,

    /// Set when an unrecoverable lexical error was reported.
    fatal: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, handler: &'a Handler) -> Self {
        Self {
            cursor: Cursor::new(source),
            handler,
            token_start: 0,
            start_line: 1,
            start_column: 1,
            fatal: false,
        }
    }

    /// Tokenize the whole input.
    ///
    /// Returns the token stream ending in `Eof`, or an empty vector if a
    /// lexical error was reported (the driver treats that as fatal).
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        if self.fatal {
            return Vec::new();
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        self.token_start = self.cursor.position();
        self.start_line = self.cursor.line();
        self.start_column = self.cursor.column();

        if self.cursor.is_at_end() {
            return self.make(TokenKind::Eof);
        }

        match self.cursor.current_char() {
            '\n' => {
                self.cursor.advance();
                self.make(TokenKind::Newline)
            }
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ',' => self.single(TokenKind::Comma),
            ';' => self.single(TokenKind::Semicolon),
            '.' => self.single(TokenKind::Dot),
            '?' => self.single(TokenKind::Question),
            '~' => self.single(TokenKind::Tilde),
            '^' => self.single(TokenKind::Caret),
            ':' => {
                self.cursor.advance();
                if self.cursor.match_char(':') {
                    self.make(TokenKind::ColonColon)
                } else {
                    self.make(TokenKind::Colon)
                }
            }
            '+' => {
                self.cursor.advance();
                if self.cursor.match_char('+') {
                    self.make(TokenKind::PlusPlus)
                } else if self.cursor.match_char('=') {
                    self.make(TokenKind::PlusEq)
                } else {
                    self.make(TokenKind::Plus)
                }
            }
            '-' => {
                self.cursor.advance();
                if self.cursor.match_char('-') {
                    self.make(TokenKind::MinusMinus)
                } else if self.cursor.match_char('=') {
                    self.make(TokenKind::MinusEq)
                } else if self.cursor.match_char('>') {
                    self.make(TokenKind::Arrow)
                } else {
                    self.make(TokenKind::Minus)
                }
            }
            '*' => {
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::StarEq)
                } else {
                    self.make(TokenKind::Star)
                }
            }
            '/' => {
                // `//` comments were consumed by the skip loop; anything
                // still here is an operator.
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::SlashEq)
                } else {
                    self.make(TokenKind::Slash)
                }
            }
            '%' => {
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::PercentEq)
                } else {
                    self.make(TokenKind::Percent)
                }
            }
            '=' => {
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::EqEq)
                } else {
                    self.make(TokenKind::Eq)
                }
            }
            '!' => {
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::NotEq)
                } else {
                    self.make(TokenKind::Not)
                }
            }
            '<' => {
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::LtEq)
                } else if self.cursor.match_char('<') {
                    self.make(TokenKind::Shl)
                } else {
                    self.make(TokenKind::Lt)
                }
            }
            '>' => {
                self.cursor.advance();
                if self.cursor.match_char('=') {
                    self.make(TokenKind::GtEq)
                } else if self.cursor.match_char('>') {
                    self.make(TokenKind::Shr)
                } else {
                    self.make(TokenKind::Gt)
                }
            }
            '&' => {
                self.cursor.advance();
                if self.cursor.match_char('&') {
                    self.make(TokenKind::AndAnd)
                } else {
                    self.make(TokenKind::Amp)
                }
            }
            '|' => {
                self.cursor.advance();
                if self.cursor.match_char('|') {
                    self.make(TokenKind::OrOr)
                } else {
                    self.make(TokenKind::Pipe)
                }
            }
            '"' => self.lex_string(),
            c if c.is_ascii_alphabetic() || c == '_' => self.lex_identifier(),
            c if c.is_ascii_digit() => self.lex_number(),
            c => {
                self.report(
                    DiagnosticCode::E0101,
                    format!("unexpected character '{}'", c),
                );
                self.cursor.advance();
                self.make_with_value(TokenKind::Unknown, c.to_string())
            }
        }
    }

    /// Identifiers start with a letter or underscore, then letters,
    /// digits or underscores. Reserved words map to their keyword kinds.
    fn lex_identifier(&mut self) -> Token {
        while {
            let c = self.cursor.current_char();
            c.is_ascii_alphanumeric() || c == '_'
        } {
            self.cursor.advance();
        }

        let text = self.cursor.slice_from(self.token_start);
        match keyword_from_ident(text) {
            Some(kind) => self.make(kind),
            None => self.make_with_value(TokenKind::Ident, text.to_string()),
        }
    }

    /// Integer by default; switches to float on the first `.` followed
    /// by a digit.
    fn lex_number(&mut self) -> Token {
        while self.cursor.current_char().is_ascii_digit() {
            self.cursor.advance();
        }

        let mut kind = TokenKind::IntLit;
        if self.cursor.current_char() == '.' && self.cursor.peek_next().is_ascii_digit() {
            kind = TokenKind::FloatLit;
            self.cursor.advance();
            while self.cursor.current_char().is_ascii_digit() {
                self.cursor.advance();
            }
        }

        let text = self.cursor.slice_from(self.token_start).to_string();
        self.make_with_value(kind, text)
    }

    /// Double-quoted string with `\n \t \\ \"` escapes. An unknown
    /// escape passes the escaped character through. Unterminated
    /// strings are fatal.
    fn lex_string(&mut self) -> Token {
        self.cursor.advance();

        let mut content = String::new();
        loop {
            if self.cursor.is_at_end() || self.cursor.current_char() == '\n' {
                self.report(DiagnosticCode::E0102, "unterminated string literal");
                break;
            }

            let c = self.cursor.current_char();
            if c == '"' {
                self.cursor.advance();
                break;
            }

            if c == '\\' {
                self.cursor.advance();
                let escaped = self.cursor.current_char();
                self.cursor.advance();
                match escaped {
                    'n' => content.push('\n'),
                    't' => content.push('\t'),
                    '\\' => content.push('\\'),
                    '"' => content.push('"'),
                    other => content.push(other),
                }
            } else {
                content.push(c);
                self.cursor.advance();
            }
        }

        self.make_with_value(TokenKind::StrLit, content)
    }

    /// Skip spaces, tabs, carriage returns and `//` comments. Newlines
    /// are significant and stay for the dispatcher.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.cursor.current_char() {
                ' ' | '\t' | '\r' => self.cursor.advance(),
                '/' if self.cursor.peek_next() == '/' => {
                    while !self.cursor.is_at_end() && self.cursor.current_char() != '\n' {
                        self.cursor.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn span(&self) -> Span {
        Span::new(self.start_line, self.start_column, self.cursor.column())
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        self.cursor.advance();
        self.make(kind)
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.span())
    }

    fn make_with_value(&self, kind: TokenKind, value: String) -> Token {
        Token::with_value(kind, value, self.span())
    }

    fn report(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.fatal = true;
        self.handler.emit(
            Diagnostic::error(message, Span::point(self.start_line, self.start_column))
                .with_code(code),
        );
    }
}
