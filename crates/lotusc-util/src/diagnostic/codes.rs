//! Diagnostic codes.
//!
//! Codes partition by pipeline stage: `E01xx` lexical, `E02xx`
//! syntactic, `E03xx` semantic, `E04xx` codegen, `W0xxx` warnings.

use std::fmt;

/// A stable identifier for a class of diagnostic.
///
/// # Examples
///
/// ```
/// use lotusc_util::DiagnosticCode;
///
/// assert_eq!(format!("{}", DiagnosticCode::E0201), "E0201");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosticCode {
    /// Numeric code.
    pub number: u16,
    /// Short machine-readable name.
    pub name: &'static str,
    /// True for warning codes.
    pub warning: bool,
}

impl DiagnosticCode {
    const fn error(number: u16, name: &'static str) -> Self {
        Self {
            number,
            name,
            warning: false,
        }
    }

    const fn warn(number: u16, name: &'static str) -> Self {
        Self {
            number,
            name,
            warning: true,
        }
    }

    // Lexical
    pub const E0101: Self = Self::error(101, "unexpected_character");
    pub const E0102: Self = Self::error(102, "unterminated_string");

    // Syntactic
    pub const E0201: Self = Self::error(201, "unexpected_token");
    pub const E0202: Self = Self::error(202, "expected_token");
    pub const E0203: Self = Self::error(203, "missing_brace");
    pub const E0204: Self = Self::error(204, "missing_semicolon");
    pub const E0205: Self = Self::error(205, "missing_identifier");
    pub const E0206: Self = Self::error(206, "missing_type");
    pub const E0207: Self = Self::error(207, "invalid_expression");
    pub const E0208: Self = Self::error(208, "invalid_declaration");
    pub const E0209: Self = Self::error(209, "unexpected_eof");

    // Semantic
    pub const E0301: Self = Self::error(301, "redeclaration");
    pub const E0302: Self = Self::error(302, "undeclared_symbol");

    // Codegen
    pub const E0401: Self = Self::error(401, "unknown_function");
    pub const E0402: Self = Self::error(402, "unsupported_construct");

    // Warnings
    pub const W0001: Self = Self::warn(1, "unused_variable");
    pub const W0002: Self = Self::warn(2, "shadowed_variable");
    pub const W0003: Self = Self::warn(3, "deprecated");
    pub const W0004: Self = Self::warn(4, "unused_parameter");
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.warning { 'W' } else { 'E' };
        write!(f, "{}{:04}", prefix, self.number)
    }
}
