//! lotusc-sem - Semantic analysis for Lotus.
//!
//! A single read-only walk over the AST maintaining a scope stack.
//! Reports redeclarations and uses of undeclared names as errors, and
//! shadowing / unused / deprecated uses as flag-gated warnings. The
//! walk never mutates the AST and never aborts: the driver decides what
//! to do with the collected diagnostics.

mod analysis;
mod scope;

pub use analysis::{SemanticAnalyzer, DEPRECATED_BUILTINS};
pub use scope::{Binding, BindingKind, ScopeStack};
