//! lotusc-lex - Lexical analysis for Lotus source.
//!
//! Transforms Lotus source text into a token stream. Whitespace is
//! skipped except newlines, which become [`TokenKind::Newline`] tokens
//! so the parser can skip them uniformly; `//` comments run to the end
//! of the line. Lexical errors (unknown character, unterminated string)
//! are fatal: they are reported to the [`Handler`](lotusc_util::Handler)
//! and [`tokenize`](Lexer::tokenize) returns an empty vector.

pub mod cursor;
pub mod lexer;
pub mod token;

pub use cursor::Cursor;
pub use lexer::Lexer;
pub use token::{keyword_from_ident, keyword_names, Token, TokenKind};
