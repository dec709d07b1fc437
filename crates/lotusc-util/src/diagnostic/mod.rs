//! Diagnostic model and collector.
//!
//! Every phase reports through a shared [`Handler`]: the lexer and
//! parser for fatal errors, the semantic analyzer for errors and gated
//! warnings, the code generator for non-fatal notes. The driver consults
//! the error count to decide the exit code.
//!
//! # Examples
//!
//! ```
//! use lotusc_util::{Diagnostic, Handler, Span};
//!
//! let handler = Handler::new();
//! handler.emit(Diagnostic::error("unexpected token", Span::point(1, 4)));
//!
//! assert!(handler.has_errors());
//! assert_eq!(handler.error_count(), 1);
//! ```

mod codes;
mod render;

pub use codes::DiagnosticCode;
pub use render::Renderer;

use crate::span::Span;
use std::cell::RefCell;
use std::fmt;

/// Diagnostic severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Prevents output emission.
    Error,
    /// Reported but does not prevent compilation.
    Warning,
    /// Additional context attached to another diagnostic.
    Note,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
            Level::Note => write!(f, "note"),
        }
    }
}

/// Which warning family a diagnostic belongs to, for flag gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningKind {
    Unused,
    Shadow,
    Implicit,
    Deprecated,
}

/// Warning switches as set on the command line.
///
/// `-Wall` turns every family on; `-w` suppresses all warnings and wins
/// over everything else; `-Werror` promotes surviving warnings to
/// errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct WarningOpts {
    pub unused: bool,
    pub shadow: bool,
    pub implicit: bool,
    pub deprecated: bool,
    pub warnings_as_errors: bool,
    pub suppress: bool,
}

impl WarningOpts {
    /// All families on, as `-Wall` does.
    pub fn all() -> Self {
        Self {
            unused: true,
            shadow: true,
            implicit: true,
            deprecated: true,
            ..Self::default()
        }
    }

    /// True if the given family should be reported at all.
    pub fn enabled(&self, kind: WarningKind) -> bool {
        if self.suppress {
            return false;
        }
        match kind {
            WarningKind::Unused => self.unused,
            WarningKind::Shadow => self.shadow,
            WarningKind::Implicit => self.implicit,
            WarningKind::Deprecated => self.deprecated,
        }
    }
}

/// A single diagnostic.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub span: Span,
    pub code: Option<DiagnosticCode>,
    /// Extra context lines, rendered after the snippet.
    pub notes: Vec<String>,
    /// A fix hint, rendered as `help: ...`.
    pub help: Option<String>,
    /// A did-you-mean candidate, rendered as part of the help line.
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            message: message.into(),
            span,
            code: None,
            notes: Vec::new(),
            help: None,
            suggestion: None,
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Error, message, span)
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self::new(Level::Warning, message, span)
    }

    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Collects diagnostics for one compilation.
///
/// Interior mutability lets every phase share one handler without
/// threading `&mut` through the pipeline. Errors past the `max_errors`
/// cutoff are counted but not stored.
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
    dropped_errors: RefCell<usize>,
    max_errors: usize,
    warnings_as_errors: bool,
    suppress_warnings: bool,
}

/// Default `--max-errors` value.
pub const DEFAULT_MAX_ERRORS: usize = 20;

impl Handler {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ERRORS, false, false)
    }

    /// Build a handler honoring `--max-errors`, `-Werror` and `-w`.
    pub fn with_limits(max_errors: usize, warnings_as_errors: bool, suppress_warnings: bool) -> Self {
        Self {
            diagnostics: RefCell::new(Vec::new()),
            dropped_errors: RefCell::new(0),
            max_errors,
            warnings_as_errors,
            suppress_warnings,
        }
    }

    /// Record a diagnostic, applying `-w` suppression, `-Werror`
    /// promotion and the `--max-errors` cutoff.
    pub fn emit(&self, mut diagnostic: Diagnostic) {
        if diagnostic.level == Level::Warning {
            if self.suppress_warnings {
                return;
            }
            if self.warnings_as_errors {
                diagnostic.level = Level::Error;
            }
        }

        if diagnostic.level == Level::Error && self.error_count() >= self.max_errors {
            *self.dropped_errors.borrow_mut() += 1;
            return;
        }

        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Warning)
            .count()
    }

    /// Errors discarded past the `--max-errors` cutoff.
    pub fn dropped_error_count(&self) -> usize {
        *self.dropped_errors.borrow()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn clear(&self) {
        self.diagnostics.borrow_mut().clear();
        *self.dropped_errors.borrow_mut() = 0;
    }
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display() {
        assert_eq!(format!("{}", Level::Error), "error");
        assert_eq!(format!("{}", Level::Warning), "warning");
        assert_eq!(format!("{}", Level::Note), "note");
    }

    #[test]
    fn test_diagnostic_builders() {
        let diag = Diagnostic::error("type mismatch", Span::DUMMY)
            .with_code(DiagnosticCode::E0302)
            .with_note("declared here")
            .with_help("check the name")
            .with_suggestion("counter");
        assert_eq!(diag.code, Some(DiagnosticCode::E0302));
        assert_eq!(diag.notes, vec!["declared here"]);
        assert_eq!(diag.suggestion.as_deref(), Some("counter"));
    }

    #[test]
    fn test_handler_counts() {
        let handler = Handler::new();
        handler.emit(Diagnostic::error("e", Span::DUMMY));
        handler.emit(Diagnostic::warning("w", Span::DUMMY));
        assert!(handler.has_errors());
        assert_eq!(handler.error_count(), 1);
        assert_eq!(handler.warning_count(), 1);
    }

    #[test]
    fn test_max_errors_cutoff() {
        let handler = Handler::with_limits(2, false, false);
        for i in 0..5 {
            handler.emit(Diagnostic::error(format!("e{}", i), Span::DUMMY));
        }
        assert_eq!(handler.error_count(), 2);
        assert_eq!(handler.dropped_error_count(), 3);
    }

    #[test]
    fn test_werror_promotion() {
        let handler = Handler::with_limits(DEFAULT_MAX_ERRORS, true, false);
        handler.emit(Diagnostic::warning("w", Span::DUMMY));
        assert!(handler.has_errors());
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_suppress_wins_over_werror() {
        let handler = Handler::with_limits(DEFAULT_MAX_ERRORS, true, true);
        handler.emit(Diagnostic::warning("w", Span::DUMMY));
        assert!(!handler.has_errors());
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_warning_opts_all() {
        let opts = WarningOpts::all();
        assert!(opts.enabled(WarningKind::Unused));
        assert!(opts.enabled(WarningKind::Shadow));
        assert!(opts.enabled(WarningKind::Deprecated));
    }

    #[test]
    fn test_warning_opts_suppress() {
        let mut opts = WarningOpts::all();
        opts.suppress = true;
        assert!(!opts.enabled(WarningKind::Shadow));
    }
}
