//! Scope stack for name resolution.
//!
//! Scopes are a plain stack with the outermost scope at index 0. Each
//! binding carries a `used` flag; popping a scope yields the bindings
//! that were never used so the analyzer can warn about them.

use lotusc_util::Span;
use rustc_hash::FxHashMap;

/// What kind of name a binding introduces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Variable,
    Parameter,
    Constant,
    Function,
    Type,
}

impl BindingKind {
    /// Human label for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            BindingKind::Variable => "variable",
            BindingKind::Parameter => "parameter",
            BindingKind::Constant => "constant",
            BindingKind::Function => "function",
            BindingKind::Type => "type",
        }
    }
}

/// One declared name.
#[derive(Clone, Debug)]
pub struct Binding {
    pub kind: BindingKind,
    pub span: Span,
    pub used: bool,
}

/// A stack of scopes, outermost at index 0.
#[derive(Default)]
pub struct ScopeStack {
    scopes: Vec<FxHashMap<String, Binding>>,
}

impl ScopeStack {
    /// A stack holding just the file scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Pop the innermost scope, returning its never-used bindings in
    /// declaration-independent map order.
    pub fn pop(&mut self) -> Vec<(String, Binding)> {
        let scope = self.scopes.pop().unwrap_or_default();
        let mut unused: Vec<(String, Binding)> = scope
            .into_iter()
            .filter(|(name, binding)| !binding.used && !name.starts_with('_'))
            .collect();
        // Deterministic warning order.
        unused.sort_by(|(_, a), (_, b)| (a.span.line, a.span.column).cmp(&(b.span.line, b.span.column)));
        unused
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a name in the innermost scope. Returns the previous
    /// binding if the name already exists there (a redeclaration).
    pub fn declare(&mut self, name: &str, kind: BindingKind, span: Span) -> Option<Binding> {
        let scope = self
            .scopes
            .last_mut()
            .expect("scope stack is never empty while analyzing");
        scope.insert(
            name.to_string(),
            Binding {
                kind,
                span,
                used: false,
            },
        )
    }

    /// The binding shadowed by `name`, if one exists in any outer
    /// scope.
    pub fn shadowed(&self, name: &str) -> Option<&Binding> {
        let outer = self.scopes.len().checked_sub(1)?;
        self.scopes[..outer]
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    /// Look `name` up through all visible scopes, innermost first, and
    /// mark it used.
    pub fn mark_used(&mut self, name: &str) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.get_mut(name) {
                binding.used = true;
                return true;
            }
        }
        false
    }

    /// Whether `name` is visible at all (without marking it used).
    pub fn is_visible(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains_key(name))
    }

    /// Every visible name, for did-you-mean candidates.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(|scope| scope.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
