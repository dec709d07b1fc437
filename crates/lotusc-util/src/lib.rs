//! lotusc-util - Shared compiler infrastructure.
//!
//! This crate holds everything more than one phase needs: source spans,
//! the diagnostic model and its collector, and the edit-distance
//! suggestion helper used for did-you-mean hints.

pub mod diagnostic;
pub mod span;
pub mod suggest;

pub use diagnostic::{
    Diagnostic, DiagnosticCode, Handler, Level, Renderer, WarningKind, WarningOpts,
    DEFAULT_MAX_ERRORS,
};
pub use span::Span;
pub use suggest::{find_similar, levenshtein};
