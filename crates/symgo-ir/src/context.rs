//! Shared context of canonical terms.
//!
//! The engine threads one `Context` through everything instead of a global
//! type pool; the canonical constants live here as plain fields.

use crate::expr::{BinOp, Expr, ExprRef, UnOp};
use crate::types::{Type, TypeRef};

/// Canonical types and constants shared across one run.
#[derive(Clone, Debug)]
pub struct Context {
    pub bool_type: TypeRef,
    pub empty_type: TypeRef,
    pub true_expr: ExprRef,
    pub false_expr: ExprRef,
}

impl Context {
    pub fn new() -> Self {
        let bool_type = Type::Bool.rc();
        let true_expr = Expr::new(bool_type.clone(), crate::expr::ExprKind::BoolConst(true));
        let false_expr = Expr::new(bool_type.clone(), crate::expr::ExprKind::BoolConst(false));
        Context {
            bool_type,
            empty_type: Type::Empty.rc(),
            true_expr,
            false_expr,
        }
    }

    /// One of the two canonical boolean constants.
    pub fn bool_const(&self, value: bool) -> ExprRef {
        if value {
            self.true_expr.clone()
        } else {
            self.false_expr.clone()
        }
    }

    /// Boolean negation over the canonical bool type.
    pub fn not(&self, value: ExprRef) -> ExprRef {
        Expr::new(
            self.bool_type.clone(),
            crate::expr::ExprKind::Unary {
                op: UnOp::Not,
                value,
            },
        )
    }

    pub fn and(&self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.connective(BinOp::And, lhs, rhs)
    }

    pub fn or(&self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.connective(BinOp::Or, lhs, rhs)
    }

    pub fn implies(&self, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        self.connective(BinOp::Implies, lhs, rhs)
    }

    fn connective(&self, op: BinOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Expr::new(
            self.bool_type.clone(),
            crate::expr::ExprKind::Binary { op, lhs, rhs },
        )
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_constants_are_shared() {
        let ctx = Context::new();
        let a = ctx.bool_const(true);
        let b = ctx.bool_const(true);
        assert!(ExprRef::same(&a, &b));
        assert!(a.is_true());
        assert!(ctx.bool_const(false).is_false());
    }

    #[test]
    fn connectives_carry_the_shared_bool_type() {
        let ctx = Context::new();
        let e = ctx.and(ctx.true_expr.clone(), ctx.false_expr.clone());
        assert!(TypeRef::same(&e.ty, &ctx.bool_type));
    }
}
