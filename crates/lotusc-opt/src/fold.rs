//! Expression rewrites: constant folding, strength reduction,
//! short-circuit simplification.
//!
//! Children are optimized first, then a single rule fires at the node;
//! every rewrite result is a fixed point, which makes the whole pass
//! idempotent.

use lotusc_par::{BinOp, CmpOp, Expr, LogicalOp, SizeofArg, UnOp};
use lotusc_util::Span;

/// Optimize one expression bottom-up.
pub(crate) fn opt_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { op, lhs, rhs, span } => {
            let lhs = opt_expr(*lhs);
            let rhs = opt_expr(*rhs);
            fold_binary(op, lhs, rhs, span)
        }
        Expr::Comparison { op, lhs, rhs, span } => {
            let lhs = opt_expr(*lhs);
            let rhs = opt_expr(*rhs);
            fold_comparison(op, lhs, rhs, span)
        }
        Expr::Logical { op, lhs, rhs, span } => {
            let lhs = opt_expr(*lhs);
            let rhs = opt_expr(*rhs);
            fold_logical(op, lhs, rhs, span)
        }
        Expr::Unary { op, operand, span } => {
            let operand = opt_expr(*operand);
            fold_unary(op, operand, span)
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            span,
        } => Expr::Ternary {
            cond: Box::new(opt_expr(*cond)),
            then_expr: Box::new(opt_expr(*then_expr)),
            else_expr: Box::new(opt_expr(*else_expr)),
            span,
        },
        Expr::Call { name, args, span } => Expr::Call {
            name,
            args: args.into_iter().map(opt_expr).collect(),
            span,
        },
        Expr::ArrayLit { elems, span } => Expr::ArrayLit {
            elems: elems.into_iter().map(opt_expr).collect(),
            span,
        },
        Expr::Index { array, index, span } => Expr::Index {
            array: Box::new(opt_expr(*array)),
            index: Box::new(opt_expr(*index)),
            span,
        },
        Expr::StructLit { name, fields, span } => Expr::StructLit {
            name,
            fields: fields
                .into_iter()
                .map(|(field, value)| (field, opt_expr(value)))
                .collect(),
            span,
        },
        Expr::ClassLit { name, fields, span } => Expr::ClassLit {
            name,
            fields: fields
                .into_iter()
                .map(|(field, value)| (field, opt_expr(value)))
                .collect(),
            span,
        },
        Expr::MethodCall {
            object,
            method,
            args,
            span,
        } => Expr::MethodCall {
            object: Box::new(opt_expr(*object)),
            method,
            args: args.into_iter().map(opt_expr).collect(),
            span,
        },
        Expr::FieldAccess {
            object,
            field,
            is_pointer,
            span,
        } => Expr::FieldAccess {
            object: Box::new(opt_expr(*object)),
            field,
            is_pointer,
            span,
        },
        Expr::Ref { operand, span } => Expr::Ref {
            operand: Box::new(opt_expr(*operand)),
            span,
        },
        Expr::Deref { operand, span } => Expr::Deref {
            operand: Box::new(opt_expr(*operand)),
            span,
        },
        Expr::Malloc { size, span } => Expr::Malloc {
            size: Box::new(opt_expr(*size)),
            span,
        },
        Expr::Free { ptr, span } => Expr::Free {
            ptr: Box::new(opt_expr(*ptr)),
            span,
        },
        Expr::Sizeof { arg, span } => Expr::Sizeof {
            arg: Box::new(match *arg {
                SizeofArg::Expr(inner) => SizeofArg::Expr(opt_expr(inner)),
                ty => ty,
            }),
            span,
        },
        leaf => leaf,
    }
}

/// Operand safe to drop or duplicate: evaluating it has no effect.
fn is_pure(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::IntLit { .. }
            | Expr::FloatLit { .. }
            | Expr::BoolLit { .. }
            | Expr::StrLit { .. }
            | Expr::Ident { .. }
            | Expr::EnumLit { .. }
            | Expr::Null { .. }
    )
}

fn int_value(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::IntLit { value, .. } => Some(*value),
        _ => None,
    }
}

fn fold_binary(op: BinOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    // Integer constant folding. Division and modulo by zero stay
    // unfolded so the behavior surfaces at run time.
    if let (Some(a), Some(b)) = (int_value(&lhs), int_value(&rhs)) {
        let folded = match op {
            BinOp::Add => Some(a.wrapping_add(b)),
            BinOp::Sub => Some(a.wrapping_sub(b)),
            BinOp::Mul => Some(a.wrapping_mul(b)),
            BinOp::Div if b != 0 => Some(a.wrapping_div(b)),
            BinOp::Mod if b != 0 => Some(a.wrapping_rem(b)),
            BinOp::BitAnd => Some(a & b),
            BinOp::BitOr => Some(a | b),
            BinOp::BitXor => Some(a ^ b),
            BinOp::Shl => Some(a.wrapping_shl(b as u32)),
            BinOp::Shr => Some(a.wrapping_shr(b as u32)),
            _ => None,
        };
        if let Some(value) = folded {
            return Expr::IntLit { value, span };
        }
    }

    // Fixed-point float folding (values are scaled by 1000).
    if let (Expr::FloatLit { value: a, .. }, Expr::FloatLit { value: b, .. }) = (&lhs, &rhs) {
        let folded = match op {
            BinOp::Add => Some(a.wrapping_add(*b)),
            BinOp::Sub => Some(a.wrapping_sub(*b)),
            BinOp::Mul => Some(a.wrapping_mul(*b) / 1000),
            BinOp::Div if *b != 0 => Some(a.wrapping_mul(1000) / b),
            _ => None,
        };
        if let Some(value) = folded {
            return Expr::FloatLit { value, span };
        }
    }

    // Strength reduction. Rules that drop or duplicate the other
    // operand require it to be pure.
    match op {
        BinOp::Add => {
            if int_value(&rhs) == Some(0) {
                return lhs;
            }
            if int_value(&lhs) == Some(0) {
                return rhs;
            }
        }
        BinOp::Sub => {
            if int_value(&rhs) == Some(0) {
                return lhs;
            }
        }
        BinOp::Mul => {
            if int_value(&rhs) == Some(1) {
                return lhs;
            }
            if int_value(&lhs) == Some(1) {
                return rhs;
            }
            if int_value(&rhs) == Some(0) && is_pure(&lhs) {
                return Expr::IntLit { value: 0, span };
            }
            if int_value(&lhs) == Some(0) && is_pure(&rhs) {
                return Expr::IntLit { value: 0, span };
            }
            if int_value(&rhs) == Some(2) && is_pure(&lhs) {
                return Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(lhs.clone()),
                    rhs: Box::new(lhs),
                    span,
                };
            }
            if int_value(&lhs) == Some(2) && is_pure(&rhs) {
                return Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(rhs.clone()),
                    rhs: Box::new(rhs),
                    span,
                };
            }
        }
        _ => {}
    }

    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span,
    }
}

fn fold_comparison(op: CmpOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    if let (Some(a), Some(b)) = (int_value(&lhs), int_value(&rhs)) {
        let value = match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
        return Expr::BoolLit { value, span };
    }

    if let (Expr::BoolLit { value: a, .. }, Expr::BoolLit { value: b, .. }) = (&lhs, &rhs) {
        let value = match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            _ => {
                return Expr::Comparison {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                }
            }
        };
        return Expr::BoolLit { value, span };
    }

    Expr::Comparison {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span,
    }
}

fn fold_logical(op: LogicalOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    // Short-circuit simplification on a literal left side.
    if let Expr::BoolLit { value, .. } = lhs {
        return match (op, value) {
            (LogicalOp::And, true) => rhs,
            (LogicalOp::And, false) => Expr::BoolLit { value: false, span },
            (LogicalOp::Or, true) => Expr::BoolLit { value: true, span },
            (LogicalOp::Or, false) => rhs,
        };
    }

    Expr::Logical {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span,
    }
}

fn fold_unary(op: UnOp, operand: Expr, span: Span) -> Expr {
    match (op, &operand) {
        (UnOp::Neg, Expr::IntLit { value, .. }) => Expr::IntLit {
            value: value.wrapping_neg(),
            span,
        },
        (UnOp::Neg, Expr::FloatLit { value, .. }) => Expr::FloatLit {
            value: value.wrapping_neg(),
            span,
        },
        (UnOp::Not, Expr::BoolLit { value, .. }) => Expr::BoolLit {
            value: !value,
            span,
        },
        (UnOp::BitNot, Expr::IntLit { value, .. }) => Expr::IntLit { value: !value, span },
        _ => Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_util::Span;

    fn int(value: i64) -> Expr {
        Expr::IntLit {
            value,
            span: Span::DUMMY,
        }
    }

    fn boolean(value: bool) -> Expr {
        Expr::BoolLit {
            value,
            span: Span::DUMMY,
        }
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident {
            name: name.into(),
            span: Span::DUMMY,
        }
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span: Span::DUMMY,
        }
    }

    #[test]
    fn test_fold_add() {
        assert_eq!(opt_expr(binary(BinOp::Add, int(2), int(3))), int(5));
    }

    #[test]
    fn test_fold_nested() {
        let expr = binary(BinOp::Add, int(2), binary(BinOp::Mul, int(3), int(4)));
        assert_eq!(opt_expr(expr), int(14));
    }

    #[test]
    fn test_no_fold_div_by_zero() {
        let expr = binary(BinOp::Div, int(1), int(0));
        assert!(matches!(opt_expr(expr), Expr::Binary { .. }));
    }

    #[test]
    fn test_strength_reduction_mul_two() {
        match opt_expr(binary(BinOp::Mul, ident("x"), int(2))) {
            Expr::Binary {
                op: BinOp::Add,
                lhs,
                rhs,
                ..
            } => {
                assert_eq!(*lhs, ident("x"));
                assert_eq!(*rhs, ident("x"));
            }
            other => panic!("expected x+x, got {:?}", other),
        }
    }

    #[test]
    fn test_strength_reduction_identities() {
        assert_eq!(opt_expr(binary(BinOp::Mul, ident("x"), int(1))), ident("x"));
        assert_eq!(opt_expr(binary(BinOp::Add, ident("x"), int(0))), ident("x"));
        assert_eq!(opt_expr(binary(BinOp::Sub, ident("x"), int(0))), ident("x"));
        assert_eq!(opt_expr(binary(BinOp::Mul, ident("x"), int(0))), int(0));
    }

    #[test]
    fn test_mul_zero_preserves_call() {
        // A call may have side effects; `f() * 0` must survive.
        let call = Expr::Call {
            name: "f".into(),
            args: vec![],
            span: Span::DUMMY,
        };
        let expr = binary(BinOp::Mul, call, int(0));
        assert!(matches!(opt_expr(expr), Expr::Binary { .. }));
    }

    #[test]
    fn test_comparison_folds() {
        assert_eq!(
            opt_expr(Expr::Comparison {
                op: CmpOp::Lt,
                lhs: Box::new(int(1)),
                rhs: Box::new(int(2)),
                span: Span::DUMMY,
            }),
            boolean(true)
        );
    }

    #[test]
    fn test_short_circuit() {
        let and_true = Expr::Logical {
            op: LogicalOp::And,
            lhs: Box::new(boolean(true)),
            rhs: Box::new(ident("e")),
            span: Span::DUMMY,
        };
        assert_eq!(opt_expr(and_true), ident("e"));

        let and_false = Expr::Logical {
            op: LogicalOp::And,
            lhs: Box::new(boolean(false)),
            rhs: Box::new(ident("e")),
            span: Span::DUMMY,
        };
        assert_eq!(opt_expr(and_false), boolean(false));

        let or_true = Expr::Logical {
            op: LogicalOp::Or,
            lhs: Box::new(boolean(true)),
            rhs: Box::new(ident("e")),
            span: Span::DUMMY,
        };
        assert_eq!(opt_expr(or_true), boolean(true));

        let or_false = Expr::Logical {
            op: LogicalOp::Or,
            lhs: Box::new(boolean(false)),
            rhs: Box::new(ident("e")),
            span: Span::DUMMY,
        };
        assert_eq!(opt_expr(or_false), ident("e"));
    }

    #[test]
    fn test_unary_folds() {
        assert_eq!(
            opt_expr(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(int(5)),
                span: Span::DUMMY,
            }),
            int(-5)
        );
        assert_eq!(
            opt_expr(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(boolean(false)),
                span: Span::DUMMY,
            }),
            boolean(true)
        );
    }

    #[test]
    fn test_fixed_point_float_folds() {
        let float = |value: i64| Expr::FloatLit {
            value,
            span: Span::DUMMY,
        };
        // 1.5 + 2.25 = 3.75
        assert_eq!(
            opt_expr(binary(BinOp::Add, float(1500), float(2250))),
            float(3750)
        );
        // 1.5 * 2.0 = 3.0 (rescaled)
        assert_eq!(
            opt_expr(binary(BinOp::Mul, float(1500), float(2000))),
            float(3000)
        );
    }
}
