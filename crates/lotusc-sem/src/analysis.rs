//! The semantic analyzer walk.
//!
//! One pass over the AST with a [`ScopeStack`]. A scope is pushed for
//! every function body, `if`/`else` arm, loop body and `try` arm, and
//! popped on exit; the file scope is popped when the walk finishes, so
//! the stack ends empty.

use crate::scope::{BindingKind, ScopeStack};
use lotusc_par::{Expr, Import, SizeofArg, Stmt, TryStmt};
use lotusc_util::{
    find_similar, Diagnostic, DiagnosticCode, Handler, Span, WarningKind, WarningOpts,
};

/// Deprecated builtin names and their replacements.
pub const DEPRECATED_BUILTINS: &[(&str, &str)] = &[
    ("puts", "io::println"),
    ("print_num", "io::printf"),
    ("strlen", "str::len"),
    ("strcmp", "str::compare"),
    ("alloc", "mem::malloc"),
    ("dealloc", "mem::munmap"),
];

/// Read-only AST walk collecting semantic diagnostics.
///
/// # Example
///
/// ```
/// use lotusc_sem::SemanticAnalyzer;
/// use lotusc_util::{Handler, WarningOpts};
///
/// let handler = Handler::new();
/// let mut analyzer = SemanticAnalyzer::new(&handler, WarningOpts::all());
/// analyzer.analyze(&[]);
/// assert_eq!(analyzer.scope_depth(), 0);
/// ```
pub struct SemanticAnalyzer<'a> {
    handler: &'a Handler,
    opts: WarningOpts,
    scopes: ScopeStack,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(handler: &'a Handler, opts: WarningOpts) -> Self {
        Self {
            handler,
            opts,
            scopes: ScopeStack::new(),
        }
    }

    /// Walk the whole program. Diagnostics land in the handler; the
    /// walk itself never aborts.
    pub fn analyze(&mut self, ast: &[Stmt]) {
        for stmt in ast {
            self.check_stmt(stmt);
        }
        self.pop_scope();
        log::debug!(
            "semantic analysis finished: {} errors, {} warnings",
            self.handler.error_count(),
            self.handler.warning_count()
        );
    }

    /// Scope depth after analysis; zero once [`analyze`](Self::analyze)
    /// has returned.
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VariableDecl {
                name, value, span, ..
            } => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
                self.declare(name, BindingKind::Variable, *span);
            }
            Stmt::ConstantDecl {
                name, value, span, ..
            } => {
                self.check_expr(value);
                self.declare(name, BindingKind::Constant, *span);
            }
            Stmt::ArrayDecl {
                name,
                initial,
                span,
                ..
            } => {
                for elem in initial {
                    self.check_expr(elem);
                }
                self.declare(name, BindingKind::Variable, *span);
            }
            Stmt::FunctionDef(def) => {
                self.declare_silent(&def.name, BindingKind::Function, def.span);
                self.check_function_body(&def.params, &def.body);
            }
            Stmt::StructDef(def) => {
                self.declare_silent(&def.name, BindingKind::Type, def.span);
            }
            Stmt::EnumDef(def) => {
                self.declare_silent(&def.name, BindingKind::Type, def.span);
            }
            Stmt::ClassDef(def) => {
                self.declare_silent(&def.name, BindingKind::Type, def.span);
                for method in &def.methods {
                    // Fields are visible inside method bodies.
                    self.scopes.push();
                    for field in &def.fields {
                        self.declare_silent(&field.name, BindingKind::Variable, def.span);
                    }
                    self.check_function_body(&method.params, &method.body);
                    self.scopes.pop();
                }
            }
            Stmt::Import(Import { .. }) => {}
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            Stmt::Assign { target, value, .. } => {
                self.check_assign_target(target);
                self.check_expr(value);
            }
            Stmt::CompoundAssign { target, value, .. } => {
                // Compound assignment reads the target as well.
                self.check_expr(target);
                self.check_expr(value);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.check_expr(cond);
                self.check_block(then_body);
                if !else_body.is_empty() {
                    self.check_block(else_body);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.check_expr(cond);
                self.check_block(body);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                // The init declaration lives in the loop scope.
                self.scopes.push();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_expr(cond);
                }
                if let Some(update) = update {
                    self.check_stmt(update);
                }
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.pop_scope();
            }
            Stmt::Try(TryStmt {
                body,
                catch_body,
                finally_body,
                ..
            }) => {
                self.check_block(body);
                if !catch_body.is_empty() {
                    self.check_block(catch_body);
                }
                if !finally_body.is_empty() {
                    self.check_block(finally_body);
                }
            }
            Stmt::Throw { value, .. } => self.check_expr(value),
            Stmt::Expr { expr, .. } => self.check_expr(expr),
        }
    }

    fn check_function_body(&mut self, params: &[lotusc_par::Param], body: &[Stmt]) {
        self.scopes.push();
        for param in params {
            self.declare(&param.name, BindingKind::Parameter, param.span);
        }
        for stmt in body {
            self.check_stmt(stmt);
        }
        self.pop_scope();
    }

    fn check_block(&mut self, body: &[Stmt]) {
        self.scopes.push();
        for stmt in body {
            self.check_stmt(stmt);
        }
        self.pop_scope();
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident { name, span } => {
                if !self.scopes.mark_used(name) {
                    self.undeclared(name, *span);
                }
            }
            Expr::Binary { lhs, rhs, .. }
            | Expr::Comparison { lhs, rhs, .. }
            | Expr::Logical { lhs, rhs, .. } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
            }
            Expr::Unary { operand, .. }
            | Expr::Ref { operand, .. }
            | Expr::Deref { operand, .. } => self.check_expr(operand),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.check_expr(cond);
                self.check_expr(then_expr);
                self.check_expr(else_expr);
            }
            Expr::Call { name, args, span } => {
                self.check_deprecated(name, *span);
                for arg in args {
                    self.check_expr(arg);
                }
            }
            Expr::ArrayLit { elems, .. } => {
                for elem in elems {
                    self.check_expr(elem);
                }
            }
            Expr::Index { array, index, .. } => {
                self.check_expr(array);
                self.check_expr(index);
            }
            Expr::StructLit { fields, .. } | Expr::ClassLit { fields, .. } => {
                for (_, value) in fields {
                    self.check_expr(value);
                }
            }
            Expr::MethodCall { object, args, .. } => {
                self.check_expr(object);
                for arg in args {
                    self.check_expr(arg);
                }
            }
            Expr::FieldAccess { object, .. } => self.check_expr(object),
            Expr::Malloc { size, .. } => self.check_expr(size),
            Expr::Free { ptr, .. } => self.check_expr(ptr),
            Expr::Sizeof { arg, .. } => {
                if let SizeofArg::Expr(inner) = arg.as_ref() {
                    // `sizeof` resolves the name but does not read it.
                    if let Expr::Ident { name, span } = inner {
                        if !self.scopes.mark_used(name) {
                            self.undeclared(name, *span);
                        }
                    } else {
                        self.check_expr(inner);
                    }
                }
            }
            Expr::IntLit { .. }
            | Expr::FloatLit { .. }
            | Expr::StrLit { .. }
            | Expr::BoolLit { .. }
            | Expr::EnumLit { .. }
            | Expr::Null { .. } => {}
        }
    }

    /// An assignment target must be declared, but writing to it does
    /// not count as a use.
    fn check_assign_target(&mut self, target: &Expr) {
        match target {
            Expr::Ident { name, span } => {
                if !self.scopes.is_visible(name) {
                    self.undeclared(name, *span);
                }
            }
            _ => self.check_expr(target),
        }
    }

    // =========================================================================
    // Declaration bookkeeping
    // =========================================================================

    /// Declare with redeclaration and shadow checks.
    fn declare(&mut self, name: &str, kind: BindingKind, span: Span) {
        if self.opts.enabled(WarningKind::Shadow) && !name.starts_with('_') {
            if let Some(shadowed) = self.scopes.shadowed(name) {
                let shadowed_line = shadowed.span.line;
                self.handler.emit(
                    Diagnostic::warning(
                        format!("declaration of `{}` shadows an outer declaration", name),
                        span,
                    )
                    .with_code(DiagnosticCode::W0002)
                    .with_note(format!(
                        "the shadowed declaration is on line {}",
                        shadowed_line
                    )),
                );
            }
        }

        if let Some(previous) = self.scopes.declare(name, kind, span) {
            self.handler.emit(
                Diagnostic::error(
                    format!("redeclaration of {} `{}`", previous.kind.describe(), name),
                    span,
                )
                .with_code(DiagnosticCode::E0301)
                .with_note(format!(
                    "`{}` was previously declared on line {}",
                    name, previous.span.line
                )),
            );
        }
    }

    /// Declare without checks, for names that live outside the
    /// unused/shadow machinery (functions, types, class fields).
    fn declare_silent(&mut self, name: &str, kind: BindingKind, span: Span) {
        self.scopes.declare(name, kind, span);
        self.scopes.mark_used(name);
    }

    fn pop_scope(&mut self) {
        for (name, binding) in self.scopes.pop() {
            if !self.opts.enabled(WarningKind::Unused) {
                continue;
            }
            let (code, what) = match binding.kind {
                BindingKind::Parameter => (DiagnosticCode::W0004, "parameter"),
                BindingKind::Variable | BindingKind::Constant => {
                    (DiagnosticCode::W0001, "variable")
                }
                _ => continue,
            };
            self.handler.emit(
                Diagnostic::warning(format!("unused {} `{}`", what, name), binding.span)
                    .with_code(code),
            );
        }
    }

    fn undeclared(&mut self, name: &str, span: Span) {
        let names = self.scopes.visible_names();
        let suggestion = find_similar(name, names.iter().map(String::as_str), 2);

        let mut diag = Diagnostic::error(
            format!("use of undeclared variable `{}`", name),
            span,
        )
        .with_code(DiagnosticCode::E0302);
        if let Some(suggestion) = suggestion {
            diag = diag.with_suggestion(suggestion);
        }
        self.handler.emit(diag);
    }

    fn check_deprecated(&mut self, name: &str, span: Span) {
        if !self.opts.enabled(WarningKind::Deprecated) {
            return;
        }
        let bare = name.rsplit("::").next().unwrap_or(name);
        if let Some((_, replacement)) = DEPRECATED_BUILTINS.iter().find(|(old, _)| *old == bare) {
            self.handler.emit(
                Diagnostic::warning(format!("`{}` is deprecated", name), span)
                    .with_code(DiagnosticCode::W0003)
                    .with_help(format!("use `{}` instead", replacement)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_lex::Lexer;
    use lotusc_par::Parser;
    use lotusc_util::Level;

    fn analyze_with(source: &str, opts: WarningOpts) -> Handler {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler).tokenize();
        let ast = Parser::new(tokens, &handler).parse().expect("parse");
        let mut analyzer = SemanticAnalyzer::new(&handler, opts);
        analyzer.analyze(&ast);
        assert_eq!(analyzer.scope_depth(), 0, "scope stack must end empty");
        handler
    }

    fn analyze(source: &str) -> Handler {
        analyze_with(source, WarningOpts::all())
    }

    #[test]
    fn test_clean_program() {
        let handler = analyze("fn int main() { int x = 1; ret x; }");
        assert!(!handler.has_errors());
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_redeclaration_error() {
        let handler = analyze("fn void f() { int x = 1; int x = 2; ret x; }");
        assert_eq!(handler.error_count(), 1);
        let diag = &handler.diagnostics()[0];
        assert_eq!(diag.code, Some(DiagnosticCode::E0301));
        assert!(diag.notes[0].contains("line 1"));
    }

    #[test]
    fn test_undeclared_with_suggestion() {
        let handler = analyze("fn int f() { int counter = 1; ret countr; }");
        assert_eq!(handler.error_count(), 1);
        let diag = &handler.diagnostics()[0];
        assert_eq!(diag.code, Some(DiagnosticCode::E0302));
        assert_eq!(diag.suggestion.as_deref(), Some("counter"));
    }

    #[test]
    fn test_shadow_warning_names_both_lines() {
        let source = "fn void f() {\n    int x = 1;\n    if true {\n        int x = 2;\n        g(x);\n    }\n    g(x);\n}";
        let handler = analyze(source);
        let warnings: Vec<_> = handler
            .diagnostics()
            .into_iter()
            .filter(|d| d.level == Level::Warning && d.code == Some(DiagnosticCode::W0002))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].span.line, 4);
        assert!(warnings[0].notes[0].contains("line 2"));
    }

    #[test]
    fn test_shadow_silent_without_flag() {
        let source = "fn void f() { int x = 1; if true { int x = 2; g(x); } g(x); }";
        let handler = analyze_with(source, WarningOpts::default());
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_unused_variable_warning() {
        let handler = analyze("fn void f() { int idle = 1; }");
        let diags = handler.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(DiagnosticCode::W0001));
        assert!(diags[0].message.contains("idle"));
    }

    #[test]
    fn test_unused_parameter_warning() {
        let handler = analyze("fn int f(int a, int b) { ret a; }");
        let diags = handler.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(DiagnosticCode::W0004));
        assert!(diags[0].message.contains("`b`"));
    }

    #[test]
    fn test_underscore_names_exempt() {
        let handler = analyze("fn void f(int _unused) { int _x = 1; }");
        assert_eq!(handler.warning_count(), 0);
    }

    #[test]
    fn test_write_only_variable_still_unused() {
        let handler = analyze("fn void f() { int x = 1; x = 2; }");
        let diags = handler.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(DiagnosticCode::W0001));
    }

    #[test]
    fn test_assignment_to_undeclared() {
        let handler = analyze("fn void f() { y = 2; }");
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_deprecated_builtin() {
        let handler = analyze("fn void f() { strlen(\"abc\"); }");
        let diags = handler.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Some(DiagnosticCode::W0003));
        assert!(diags[0].help.as_deref().unwrap().contains("str::len"));
    }

    #[test]
    fn test_class_fields_visible_in_methods() {
        let source = "class Counter { int value; fn void inc() { value += 1; } }";
        let handler = analyze(source);
        assert!(!handler.has_errors());
    }

    #[test]
    fn test_for_init_scoped_to_loop() {
        let handler = analyze("fn void f() { for (int i = 0; i < 3; i++) { g(i); } }");
        assert!(!handler.has_errors());

        // `i` is not visible after the loop.
        let handler = analyze("fn void f() { for (int i = 0; i < 3; i++) { } g(i); }");
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn test_max_errors_limits_collection() {
        let source = "fn void f() { a = 1; b = 1; c = 1; d = 1; }";
        let handler = Handler::with_limits(2, false, false);
        let tokens = Lexer::new(source, &handler).tokenize();
        let ast = Parser::new(tokens, &handler).parse().expect("parse");
        SemanticAnalyzer::new(&handler, WarningOpts::all()).analyze(&ast);
        assert_eq!(handler.error_count(), 2);
        assert_eq!(handler.dropped_error_count(), 2);
    }
}
