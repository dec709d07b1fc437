//! Compilation statistics: counts and per-phase timings.

use lotusc_par::{Expr, SizeofArg, Stmt};
use std::time::Duration;

/// Collected over one compilation and printed for `--stats` /
/// `--timing`.
#[derive(Default)]
pub struct Stats {
    pub tokens: usize,
    pub ast_nodes: usize,
    pub asm_lines: usize,
    pub phases: Vec<(&'static str, Duration)>,
}

impl Stats {
    pub fn record_phase(&mut self, name: &'static str, elapsed: Duration) {
        self.phases.push((name, elapsed));
    }

    /// Render the `--stats` block.
    pub fn print(&self) {
        println!("compilation statistics:");
        println!("  tokens:         {}", self.tokens);
        println!("  ast nodes:      {}", self.ast_nodes);
        println!("  assembly lines: {}", self.asm_lines);
        self.print_timing();
    }

    /// Render only the per-phase timing (`--timing`).
    pub fn print_timing(&self) {
        for (name, elapsed) in &self.phases {
            println!("  {:<10} {:>10.3}ms", name, elapsed.as_secs_f64() * 1000.0);
        }
    }
}

/// Count every statement and expression node in the tree.
pub fn count_nodes(ast: &[Stmt]) -> usize {
    ast.iter().map(count_stmt).sum()
}

fn count_stmt(stmt: &Stmt) -> usize {
    1 + match stmt {
        Stmt::VariableDecl { value, .. } => value.as_ref().map(count_expr).unwrap_or(0),
        Stmt::ConstantDecl { value, .. } => count_expr(value),
        Stmt::ArrayDecl { initial, .. } => initial.iter().map(count_expr).sum(),
        Stmt::FunctionDef(def) => count_nodes(&def.body),
        Stmt::ClassDef(def) => def.methods.iter().map(|m| count_nodes(&m.body)).sum(),
        Stmt::Return { value, .. } => value.as_ref().map(count_expr).unwrap_or(0),
        Stmt::Assign { target, value, .. } => count_expr(target) + count_expr(value),
        Stmt::CompoundAssign { target, value, .. } => count_expr(target) + count_expr(value),
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => count_expr(cond) + count_nodes(then_body) + count_nodes(else_body),
        Stmt::While { cond, body, .. } => count_expr(cond) + count_nodes(body),
        Stmt::For {
            init,
            cond,
            update,
            body,
            ..
        } => {
            init.as_deref().map(count_stmt).unwrap_or(0)
                + cond.as_ref().map(count_expr).unwrap_or(0)
                + update.as_deref().map(count_stmt).unwrap_or(0)
                + count_nodes(body)
        }
        Stmt::Try(t) => {
            count_nodes(&t.body) + count_nodes(&t.catch_body) + count_nodes(&t.finally_body)
        }
        Stmt::Throw { value, .. } => count_expr(value),
        Stmt::Expr { expr, .. } => count_expr(expr),
        Stmt::StructDef(_) | Stmt::EnumDef(_) | Stmt::Import(_) => 0,
    }
}

fn count_expr(expr: &Expr) -> usize {
    1 + match expr {
        Expr::Binary { lhs, rhs, .. }
        | Expr::Comparison { lhs, rhs, .. }
        | Expr::Logical { lhs, rhs, .. } => count_expr(lhs) + count_expr(rhs),
        Expr::Unary { operand, .. } | Expr::Ref { operand, .. } | Expr::Deref { operand, .. } => {
            count_expr(operand)
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            ..
        } => count_expr(cond) + count_expr(then_expr) + count_expr(else_expr),
        Expr::Call { args, .. } | Expr::MethodCall { args, .. } => {
            args.iter().map(count_expr).sum::<usize>()
                + match expr {
                    Expr::MethodCall { object, .. } => count_expr(object),
                    _ => 0,
                }
        }
        Expr::ArrayLit { elems, .. } => elems.iter().map(count_expr).sum(),
        Expr::Index { array, index, .. } => count_expr(array) + count_expr(index),
        Expr::StructLit { fields, .. } | Expr::ClassLit { fields, .. } => {
            fields.iter().map(|(_, v)| count_expr(v)).sum()
        }
        Expr::FieldAccess { object, .. } => count_expr(object),
        Expr::Malloc { size, .. } => count_expr(size),
        Expr::Free { ptr, .. } => count_expr(ptr),
        Expr::Sizeof { arg, .. } => match arg.as_ref() {
            SizeofArg::Expr(inner) => count_expr(inner),
            SizeofArg::Type(_) => 0,
        },
        Expr::IntLit { .. }
        | Expr::FloatLit { .. }
        | Expr::StrLit { .. }
        | Expr::BoolLit { .. }
        | Expr::Ident { .. }
        | Expr::EnumLit { .. }
        | Expr::Null { .. } => 0,
    }
}
