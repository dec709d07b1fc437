//! lotusc-opt - AST-level optimization.
//!
//! A pure `Ast -> Ast` transformation applied between semantic analysis
//! and code generation:
//!
//! - constant folding over arithmetic, comparison and logical operators
//!   when both operands are literals of matching kind (division and
//!   modulo by a zero constant are never folded);
//! - strength reduction (`x*2 -> x+x`, `x*1 -> x`, `x+0 -> x`,
//!   `x-0 -> x`, `x*0 -> 0`);
//! - short-circuit simplification (`true && e -> e`,
//!   `false && e -> false`, `true || e -> true`, `false || e -> e`).
//!
//! The pass is idempotent: `optimize(optimize(ast)) == optimize(ast)`.
//! Rewrites that would drop or duplicate an operand only apply to
//! side-effect-free operands (identifiers and literals).

mod fold;

use lotusc_par::{Ast, Stmt, TryStmt};

/// Optimize a whole program.
pub fn optimize(ast: Ast) -> Ast {
    let stmts: Vec<Stmt> = ast.into_iter().map(opt_stmt).collect();
    log::debug!("ast optimizer finished over {} top-level statements", stmts.len());
    stmts
}

fn opt_stmt(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::VariableDecl {
            name,
            ty,
            value,
            span,
        } => Stmt::VariableDecl {
            name,
            ty,
            value: value.map(fold::opt_expr),
            span,
        },
        Stmt::ConstantDecl {
            name,
            ty,
            value,
            span,
        } => Stmt::ConstantDecl {
            name,
            ty,
            value: fold::opt_expr(value),
            span,
        },
        Stmt::ArrayDecl {
            name,
            elem_type,
            size,
            initial,
            span,
        } => Stmt::ArrayDecl {
            name,
            elem_type,
            size,
            initial: initial.into_iter().map(fold::opt_expr).collect(),
            span,
        },
        Stmt::FunctionDef(mut def) => {
            def.body = def.body.into_iter().map(opt_stmt).collect();
            Stmt::FunctionDef(def)
        }
        Stmt::ClassDef(mut def) => {
            def.methods = def
                .methods
                .into_iter()
                .map(|mut method| {
                    method.body = method.body.into_iter().map(opt_stmt).collect();
                    method
                })
                .collect();
            Stmt::ClassDef(def)
        }
        Stmt::Return { value, span } => Stmt::Return {
            value: value.map(fold::opt_expr),
            span,
        },
        Stmt::Assign {
            target,
            value,
            span,
        } => Stmt::Assign {
            target,
            value: fold::opt_expr(value),
            span,
        },
        Stmt::CompoundAssign {
            target,
            op,
            value,
            span,
        } => Stmt::CompoundAssign {
            target,
            op,
            value: fold::opt_expr(value),
            span,
        },
        Stmt::If {
            cond,
            then_body,
            else_body,
            span,
        } => Stmt::If {
            cond: fold::opt_expr(cond),
            then_body: then_body.into_iter().map(opt_stmt).collect(),
            else_body: else_body.into_iter().map(opt_stmt).collect(),
            span,
        },
        Stmt::While { cond, body, span } => Stmt::While {
            cond: fold::opt_expr(cond),
            body: body.into_iter().map(opt_stmt).collect(),
            span,
        },
        Stmt::For {
            init,
            cond,
            update,
            body,
            span,
        } => Stmt::For {
            init: init.map(|s| Box::new(opt_stmt(*s))),
            cond: cond.map(fold::opt_expr),
            update: update.map(|s| Box::new(opt_stmt(*s))),
            body: body.into_iter().map(opt_stmt).collect(),
            span,
        },
        Stmt::Try(t) => Stmt::Try(TryStmt {
            body: t.body.into_iter().map(opt_stmt).collect(),
            catch_body: t.catch_body.into_iter().map(opt_stmt).collect(),
            finally_body: t.finally_body.into_iter().map(opt_stmt).collect(),
            span: t.span,
        }),
        Stmt::Throw { value, span } => Stmt::Throw {
            value: fold::opt_expr(value),
            span,
        },
        Stmt::Expr { expr, span } => Stmt::Expr {
            expr: fold::opt_expr(expr),
            span,
        },
        other @ (Stmt::StructDef(_) | Stmt::EnumDef(_) | Stmt::Import(_)) => other,
    }
}
