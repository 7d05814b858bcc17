//! Local algebraic simplification over the term graph.
//!
//! `simplify` is bottom-up and idempotent: children are simplified first, then
//! the node itself is rewritten by `simplify_node`. Rules that synthesise new
//! compound nodes re-enter `simplify_node` so the result is always a fixpoint.
//! Division by a (possibly) zero constant is never folded; the claim machinery
//! downstream owns that case.

use crate::expr::{BinOp, Expr, ExprKind, ExprRef, OverflowOp, UnOp, WithKey};
use crate::types::{Type, TypeRef};

/// Simplify an expression bottom-up. Returns the same handle when no rule
/// applies anywhere in the tree.
pub fn simplify(e: &ExprRef) -> ExprRef {
    let with_children = e.map_operands(&mut simplify_rec);
    simplify_node(&with_children)
}

fn simplify_rec(e: &ExprRef) -> ExprRef {
    simplify(e)
}

/// Reduce `v` into the value range of `ty` (modular for unsigned, two's
/// complement wrap for signed). Types without a width pass through.
pub fn normalise(ty: &TypeRef, v: i128) -> i128 {
    let width = match &**ty {
        Type::Unsigned { width } | Type::Signed { width } | Type::Fixedbv { width, .. } => *width,
        _ => return v,
    };
    if width == 0 || width >= 128 {
        return v;
    }
    let mask = (1i128 << width) - 1;
    let wrapped = v & mask;
    if ty.is_signed() || ty.is_fixedbv() {
        let sign_bit = 1i128 << (width - 1);
        if wrapped & sign_bit != 0 {
            wrapped - (1i128 << width)
        } else {
            wrapped
        }
    } else {
        wrapped
    }
}

/// Unsigned view of a value already normalised for `ty`.
fn unsigned_bits(ty: &TypeRef, v: i128) -> i128 {
    match ty.width() {
        Some(width) if width < 128 => v & ((1i128 << width) - 1),
        _ => v,
    }
}

/// Does `v` survive a round-trip through the value range of a `bits`-wide
/// version of `ty`?
fn fits_in(ty: &TypeRef, bits: u32, v: i128) -> bool {
    if bits == 0 || bits >= 128 {
        return true;
    }
    let shrunk = if ty.is_signed() {
        Type::Signed { width: bits }.rc()
    } else {
        Type::Unsigned { width: bits }.rc()
    };
    normalise(&shrunk, v) == v
}

/// One rewriting step at the root, assuming all operands are already
/// simplified.
fn simplify_node(e: &ExprRef) -> ExprRef {
    use ExprKind::*;
    match &e.kind {
        Unary { op, value } => simplify_unary(e, *op, value),
        Binary { op, lhs, rhs } => simplify_binary(e, *op, lhs, rhs),
        Typecast(value) => simplify_typecast(e, value),
        If {
            cond,
            true_value,
            false_value,
        } => simplify_if(e, cond, true_value, false_value),
        Member { base, member } => simplify_member(e, base, member),
        Index { base, index } => simplify_index(e, base, index),
        With { base, key, value } => simplify_with(e, base, key, value),
        Dereference(value) => match &value.kind {
            AddressOf(inner) => inner.clone(),
            _ => e.clone(),
        },
        SameObject { lhs, rhs } => match (&lhs.kind, &rhs.kind) {
            (AddressOf(a), AddressOf(b)) => match (a.as_symbol(), b.as_symbol()) {
                (Some(sa), Some(sb)) => Expr::new(
                    e.ty.clone(),
                    BoolConst(sa.name == sb.name && sa.l1 == sb.l1),
                ),
                _ => e.clone(),
            },
            _ => e.clone(),
        },
        ByteExtract {
            value,
            offset,
            big_endian,
        } => simplify_byte_extract(e, value, offset, *big_endian),
        Overflow { op, lhs, rhs } => simplify_overflow(e, *op, lhs, rhs),
        OverflowCast { value, bits } => match value.as_int_const() {
            Some(v) => Expr::new(e.ty.clone(), BoolConst(!fits_in(&value.ty, *bits, v))),
            None => e.clone(),
        },
        OverflowNeg(value) => match value.as_int_const() {
            Some(v) => {
                let overflows = normalise(&value.ty, -v) != -v || (!value.ty.is_signed() && v != 0);
                Expr::new(e.ty.clone(), BoolConst(overflows))
            }
            None => e.clone(),
        },
        // Fixed-point numbers have no nan/inf representation.
        IsNan(value) | IsInf(value) if value.is_constant() => {
            Expr::new(e.ty.clone(), BoolConst(false))
        }
        IsNormal(value) if value.is_constant() => Expr::new(e.ty.clone(), BoolConst(true)),
        Concat { lhs, rhs } => match (lhs.as_int_const(), rhs.as_int_const(), rhs.ty.width()) {
            (Some(a), Some(b), Some(rhs_width)) if rhs_width < 128 => {
                let bits = (unsigned_bits(&lhs.ty, a) << rhs_width) | unsigned_bits(&rhs.ty, b);
                Expr::new(e.ty.clone(), IntConst(normalise(&e.ty, bits)))
            }
            _ => e.clone(),
        },
        _ => e.clone(),
    }
}

fn simplify_unary(e: &ExprRef, op: UnOp, value: &ExprRef) -> ExprRef {
    use ExprKind::*;
    match (op, &value.kind) {
        (UnOp::Not, BoolConst(b)) => Expr::new(e.ty.clone(), BoolConst(!b)),
        (UnOp::Not, Unary { op: UnOp::Not, value }) => value.clone(),
        (UnOp::Neg, IntConst(v)) => Expr::new(e.ty.clone(), IntConst(normalise(&e.ty, -v))),
        (UnOp::Neg, FixedbvConst(raw)) => {
            Expr::new(e.ty.clone(), FixedbvConst(normalise(&e.ty, -raw)))
        }
        (UnOp::Neg, Unary { op: UnOp::Neg, value }) => value.clone(),
        (UnOp::BitNot, IntConst(v)) => Expr::new(e.ty.clone(), IntConst(normalise(&e.ty, !v))),
        (UnOp::BitNot, Unary { op: UnOp::BitNot, value }) => value.clone(),
        _ => e.clone(),
    }
}

fn simplify_binary(e: &ExprRef, op: BinOp, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
    use ExprKind::*;

    // Constant folding over integers.
    if let (Some(a), Some(b)) = (lhs.as_int_const(), rhs.as_int_const()) {
        if let Some(folded) = fold_int(e, op, &lhs.ty, a, b) {
            return folded;
        }
    }

    // Constant folding over fixed-point values of one type.
    if let (FixedbvConst(a), FixedbvConst(b)) = (&lhs.kind, &rhs.kind) {
        if lhs.ty == rhs.ty {
            if let Some(folded) = fold_fixedbv(e, op, &lhs.ty, *a, *b) {
                return folded;
            }
        }
    }

    // Boolean connectives.
    match op {
        BinOp::And => {
            if lhs.is_false() || rhs.is_false() {
                return Expr::new(e.ty.clone(), BoolConst(false));
            }
            if lhs.is_true() {
                return rhs.clone();
            }
            if rhs.is_true() {
                return lhs.clone();
            }
            if lhs == rhs {
                return lhs.clone();
            }
        }
        BinOp::Or => {
            if lhs.is_true() || rhs.is_true() {
                return Expr::new(e.ty.clone(), BoolConst(true));
            }
            if lhs.is_false() {
                return rhs.clone();
            }
            if rhs.is_false() {
                return lhs.clone();
            }
            if lhs == rhs {
                return lhs.clone();
            }
        }
        BinOp::Implies => {
            if lhs.is_false() || rhs.is_true() {
                return Expr::new(e.ty.clone(), BoolConst(true));
            }
            if lhs.is_true() {
                return rhs.clone();
            }
            if rhs.is_false() {
                return simplify_node(&Expr::not(lhs.clone()));
            }
        }
        BinOp::Xor => {
            if let (BoolConst(a), BoolConst(b)) = (&lhs.kind, &rhs.kind) {
                return Expr::new(e.ty.clone(), BoolConst(a != b));
            }
            if lhs.is_false() {
                return rhs.clone();
            }
            if rhs.is_false() {
                return lhs.clone();
            }
            if lhs.is_true() {
                return simplify_node(&Expr::not(rhs.clone()));
            }
            if rhs.is_true() {
                return simplify_node(&Expr::not(lhs.clone()));
            }
        }
        _ => {}
    }

    // Arithmetic and bitwise identities with one constant side.
    match op {
        BinOp::Add => {
            if rhs.as_int_const() == Some(0) {
                return lhs.clone();
            }
            if lhs.as_int_const() == Some(0) {
                return rhs.clone();
            }
        }
        BinOp::Sub => {
            if rhs.as_int_const() == Some(0) {
                return lhs.clone();
            }
            if lhs == rhs && lhs.ty.is_bv() {
                return Expr::new(e.ty.clone(), IntConst(0));
            }
        }
        BinOp::Mul => {
            if lhs.as_int_const() == Some(0) || rhs.as_int_const() == Some(0) {
                return Expr::new(e.ty.clone(), IntConst(0));
            }
            if rhs.as_int_const() == Some(1) {
                return lhs.clone();
            }
            if lhs.as_int_const() == Some(1) {
                return rhs.clone();
            }
        }
        BinOp::Div => {
            if rhs.as_int_const() == Some(1) {
                return lhs.clone();
            }
        }
        BinOp::BitAnd => {
            if lhs.as_int_const() == Some(0) || rhs.as_int_const() == Some(0) {
                return Expr::new(e.ty.clone(), IntConst(0));
            }
        }
        BinOp::BitOr | BinOp::BitXor => {
            if rhs.as_int_const() == Some(0) {
                return lhs.clone();
            }
            if lhs.as_int_const() == Some(0) {
                return rhs.clone();
            }
        }
        BinOp::Shl | BinOp::LShr | BinOp::AShr => {
            if rhs.as_int_const() == Some(0) {
                return lhs.clone();
            }
        }
        // Reflexive relations on structurally equal pure terms.
        BinOp::Eq | BinOp::Le | BinOp::Ge if lhs == rhs => {
            return Expr::new(e.ty.clone(), BoolConst(true));
        }
        BinOp::Ne | BinOp::Lt | BinOp::Gt if lhs == rhs => {
            return Expr::new(e.ty.clone(), BoolConst(false));
        }
        _ => {}
    }

    e.clone()
}

/// Fold a binary operation over two integer constants. Returns `None` when
/// the operation must stay symbolic (division by zero, oversized shifts).
fn fold_int(e: &ExprRef, op: BinOp, operand_ty: &TypeRef, a: i128, b: i128) -> Option<ExprRef> {
    use ExprKind::IntConst;
    let int = |v: i128| Some(Expr::new(e.ty.clone(), IntConst(normalise(&e.ty, v))));
    let boolean = |v: bool| Some(Expr::new(e.ty.clone(), ExprKind::BoolConst(v)));

    match op {
        BinOp::Add => int(a.wrapping_add(b)),
        BinOp::Sub => int(a.wrapping_sub(b)),
        BinOp::Mul => int(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                None
            } else {
                int(a.wrapping_div(b))
            }
        }
        BinOp::Mod => {
            if b == 0 {
                None
            } else {
                int(a.wrapping_rem(b))
            }
        }
        BinOp::BitAnd => int(unsigned_bits(operand_ty, a) & unsigned_bits(operand_ty, b)),
        BinOp::BitOr => int(unsigned_bits(operand_ty, a) | unsigned_bits(operand_ty, b)),
        BinOp::BitXor => int(unsigned_bits(operand_ty, a) ^ unsigned_bits(operand_ty, b)),
        BinOp::Shl | BinOp::LShr | BinOp::AShr => {
            let width = operand_ty.width()?;
            if b < 0 || b as u32 >= width {
                return None;
            }
            match op {
                BinOp::Shl => int(a << b),
                BinOp::LShr => int(unsigned_bits(operand_ty, a) >> b),
                BinOp::AShr => int(a >> b),
                _ => unreachable!(),
            }
        }
        BinOp::Eq => boolean(a == b),
        BinOp::Ne => boolean(a != b),
        BinOp::Lt => boolean(a < b),
        BinOp::Le => boolean(a <= b),
        BinOp::Gt => boolean(a > b),
        BinOp::Ge => boolean(a >= b),
        // Connectives never apply to integer constants.
        BinOp::And | BinOp::Or | BinOp::Implies | BinOp::Xor => None,
    }
}

/// Fold a binary operation over two fixed-point constants of the same type.
fn fold_fixedbv(e: &ExprRef, op: BinOp, ty: &TypeRef, a: i128, b: i128) -> Option<ExprRef> {
    use ExprKind::FixedbvConst;
    let frac = ty.fraction_bits()?;
    let fixed = |v: i128| Some(Expr::new(e.ty.clone(), FixedbvConst(normalise(&e.ty, v))));
    let boolean = |v: bool| Some(Expr::new(e.ty.clone(), ExprKind::BoolConst(v)));

    match op {
        BinOp::Add => fixed(a.wrapping_add(b)),
        BinOp::Sub => fixed(a.wrapping_sub(b)),
        BinOp::Mul => fixed(a.wrapping_mul(b) >> frac),
        BinOp::Div => {
            if b == 0 {
                None
            } else {
                fixed((a << frac).wrapping_div(b))
            }
        }
        // Same scale, so raw comparison is value comparison.
        BinOp::Eq => boolean(a == b),
        BinOp::Ne => boolean(a != b),
        BinOp::Lt => boolean(a < b),
        BinOp::Le => boolean(a <= b),
        BinOp::Gt => boolean(a > b),
        BinOp::Ge => boolean(a >= b),
        _ => None,
    }
}

fn simplify_typecast(e: &ExprRef, value: &ExprRef) -> ExprRef {
    use ExprKind::*;
    if e.ty == value.ty {
        return value.clone();
    }
    match &value.kind {
        IntConst(v) => match &*e.ty {
            Type::Unsigned { .. } | Type::Signed { .. } => {
                Expr::new(e.ty.clone(), IntConst(normalise(&e.ty, *v)))
            }
            Type::Bool => Expr::new(e.ty.clone(), BoolConst(*v != 0)),
            Type::Fixedbv { .. } => {
                let frac = e.ty.fraction_bits().unwrap_or(0);
                Expr::new(e.ty.clone(), FixedbvConst(normalise(&e.ty, v << frac)))
            }
            _ => e.clone(),
        },
        BoolConst(b) => match &*e.ty {
            Type::Unsigned { .. } | Type::Signed { .. } => {
                Expr::new(e.ty.clone(), IntConst(i128::from(*b)))
            }
            _ => e.clone(),
        },
        FixedbvConst(raw) => {
            let frac = value.ty.fraction_bits().unwrap_or(0);
            match &*e.ty {
                // Truncate toward zero.
                Type::Unsigned { .. } | Type::Signed { .. } => Expr::new(
                    e.ty.clone(),
                    IntConst(normalise(&e.ty, raw / (1i128 << frac))),
                ),
                Type::Bool => Expr::new(e.ty.clone(), BoolConst(*raw != 0)),
                Type::Fixedbv { .. } => {
                    let to_frac = e.ty.fraction_bits().unwrap_or(0);
                    let shifted = if to_frac >= frac {
                        raw << (to_frac - frac)
                    } else {
                        raw >> (frac - to_frac)
                    };
                    Expr::new(e.ty.clone(), FixedbvConst(normalise(&e.ty, shifted)))
                }
                _ => e.clone(),
            }
        }
        _ => e.clone(),
    }
}

fn simplify_if(e: &ExprRef, cond: &ExprRef, true_value: &ExprRef, false_value: &ExprRef) -> ExprRef {
    if cond.is_true() {
        return true_value.clone();
    }
    if cond.is_false() {
        return false_value.clone();
    }
    if true_value == false_value {
        return true_value.clone();
    }
    if true_value.is_true() && false_value.is_false() {
        return cond.clone();
    }
    if true_value.is_false() && false_value.is_true() {
        return simplify_node(&Expr::not(cond.clone()));
    }
    e.clone()
}

fn simplify_member(e: &ExprRef, base: &ExprRef, member: &crate::name::Name) -> ExprRef {
    use ExprKind::*;
    match &base.kind {
        StructConst(fields) => {
            if let Type::Struct { members, .. } = &*base.ty {
                if let Some(pos) = members.iter().position(|m| m.name == *member) {
                    if let Some(field) = fields.get(pos) {
                        return field.clone();
                    }
                }
            }
            e.clone()
        }
        UnionConst { field, value } if field == member => value.clone(),
        With {
            base: inner,
            key: WithKey::Member(updated),
            value,
        } => {
            if updated == member {
                value.clone()
            } else {
                // The update is to a different member, look through it.
                simplify_node(&Expr::new(
                    e.ty.clone(),
                    Member {
                        base: inner.clone(),
                        member: member.clone(),
                    },
                ))
            }
        }
        _ => e.clone(),
    }
}

fn simplify_index(e: &ExprRef, base: &ExprRef, index: &ExprRef) -> ExprRef {
    use ExprKind::*;
    match &base.kind {
        ArrayConst(elements) => match index.as_int_const() {
            Some(i) if i >= 0 && (i as usize) < elements.len() => elements[i as usize].clone(),
            _ => e.clone(),
        },
        ArrayOf(value) => value.clone(),
        With {
            base: inner,
            key: WithKey::Index(updated),
            value,
        } => match (index.as_int_const(), updated.as_int_const()) {
            (Some(i), Some(u)) if i == u => value.clone(),
            (Some(_), Some(_)) => simplify_node(&Expr::new(
                e.ty.clone(),
                Index {
                    base: inner.clone(),
                    index: index.clone(),
                },
            )),
            _ => e.clone(),
        },
        _ => e.clone(),
    }
}

fn simplify_with(e: &ExprRef, base: &ExprRef, key: &WithKey, value: &ExprRef) -> ExprRef {
    use ExprKind::*;
    // Consecutive updates of the same position: the outer one wins.
    if let With {
        base: inner,
        key: inner_key,
        ..
    } = &base.kind
    {
        if inner_key == key {
            return Expr::new(
                e.ty.clone(),
                With {
                    base: inner.clone(),
                    key: key.clone(),
                    value: value.clone(),
                },
            );
        }
    }
    e.clone()
}

fn simplify_byte_extract(
    e: &ExprRef,
    value: &ExprRef,
    offset: &ExprRef,
    big_endian: bool,
) -> ExprRef {
    use ExprKind::IntConst;
    let (Some(v), Some(off)) = (value.as_int_const(), offset.as_int_const()) else {
        return e.clone();
    };
    let (Some(src_width), Some(dst_width)) = (value.ty.width(), e.ty.width()) else {
        return e.clone();
    };
    if dst_width != 8 || src_width % 8 != 0 {
        return e.clone();
    }
    let bytes = src_width / 8;
    if off < 0 || off as u32 >= bytes {
        return e.clone();
    }
    let byte_index = if big_endian {
        bytes - 1 - off as u32
    } else {
        off as u32
    };
    let bits = unsigned_bits(&value.ty, v);
    let byte = (bits >> (8 * byte_index)) & 0xff;
    Expr::new(e.ty.clone(), IntConst(normalise(&e.ty, byte)))
}

fn simplify_overflow(e: &ExprRef, op: OverflowOp, lhs: &ExprRef, rhs: &ExprRef) -> ExprRef {
    let (Some(a), Some(b)) = (lhs.as_int_const(), rhs.as_int_const()) else {
        return e.clone();
    };
    let wide = match op {
        OverflowOp::Add => a.wrapping_add(b),
        OverflowOp::Sub => a.wrapping_sub(b),
        OverflowOp::Mul => a.wrapping_mul(b),
    };
    let overflows = normalise(&lhs.ty, wide) != wide;
    Expr::new(e.ty.clone(), ExprKind::BoolConst(overflows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    fn i32_ty() -> TypeRef {
        Type::Signed { width: 32 }.rc()
    }

    fn u8_ty() -> TypeRef {
        Type::Unsigned { width: 8 }.rc()
    }

    fn int(v: i128) -> ExprRef {
        Expr::int_const(v, i32_ty())
    }

    fn sym(n: &str) -> ExprRef {
        Expr::symbol(Name::new(n), i32_ty())
    }

    #[test]
    fn folds_integer_arithmetic() {
        let e = Expr::binary(BinOp::Add, int(2), Expr::binary(BinOp::Mul, int(3), int(4)));
        assert_eq!(simplify(&e).as_int_const(), Some(14));
    }

    #[test]
    fn arithmetic_is_modular() {
        let max = Expr::int_const(127, Type::Signed { width: 8 }.rc());
        let one = Expr::int_const(1, Type::Signed { width: 8 }.rc());
        let e = Expr::binary(BinOp::Add, max, one);
        assert_eq!(simplify(&e).as_int_const(), Some(-128));

        let e = Expr::binary(
            BinOp::Add,
            Expr::int_const(255, u8_ty()),
            Expr::int_const(1, u8_ty()),
        );
        assert_eq!(simplify(&e).as_int_const(), Some(0));
    }

    #[test]
    fn division_by_zero_stays_symbolic() {
        let e = Expr::binary(BinOp::Div, int(1), int(0));
        assert!(simplify(&e).as_int_const().is_none());
    }

    #[test]
    fn additive_and_multiplicative_identities() {
        let x = sym("x");
        assert_eq!(simplify(&Expr::binary(BinOp::Add, x.clone(), int(0))), x);
        assert_eq!(simplify(&Expr::binary(BinOp::Mul, int(1), x.clone())), x);
        assert_eq!(
            simplify(&Expr::binary(BinOp::Mul, x.clone(), int(0))).as_int_const(),
            Some(0)
        );
        assert_eq!(
            simplify(&Expr::binary(BinOp::Sub, x.clone(), x.clone())).as_int_const(),
            Some(0)
        );
    }

    #[test]
    fn relational_folding_and_reflexivity() {
        let e = Expr::binary(BinOp::Lt, int(1), int(2));
        assert!(simplify(&e).is_true());

        let x = sym("x");
        assert!(simplify(&Expr::binary(BinOp::Eq, x.clone(), x.clone())).is_true());
        assert!(simplify(&Expr::binary(BinOp::Lt, x.clone(), x)).is_false());
    }

    #[test]
    fn boolean_connectives() {
        let t = Expr::bool_const(true);
        let f = Expr::bool_const(false);
        let p = Expr::symbol(Name::new("p"), Type::Bool.rc());

        assert_eq!(simplify(&Expr::and(t.clone(), p.clone())), p);
        assert!(simplify(&Expr::and(f.clone(), p.clone())).is_false());
        assert!(simplify(&Expr::or(t.clone(), p.clone())).is_true());
        assert!(simplify(&Expr::implies(f.clone(), p.clone())).is_true());
        assert_eq!(simplify(&Expr::implies(t, p.clone())), p);
    }

    #[test]
    fn double_negation_cancels() {
        let p = Expr::symbol(Name::new("p"), Type::Bool.rc());
        let e = Expr::not(Expr::not(p.clone()));
        assert_eq!(simplify(&e), p);
    }

    #[test]
    fn typecast_folding() {
        let v = Expr::int_const(300, i32_ty());
        let cast = Expr::typecast(v, u8_ty());
        assert_eq!(simplify(&cast).as_int_const(), Some(44));

        let b = Expr::typecast(Expr::int_const(0, i32_ty()), Type::Bool.rc());
        assert!(simplify(&b).is_false());
    }

    #[test]
    fn ite_simplification() {
        let x = sym("x");
        let y = sym("y");
        let p = Expr::symbol(Name::new("p"), Type::Bool.rc());

        assert_eq!(
            simplify(&Expr::ite(Expr::bool_const(true), x.clone(), y.clone())),
            x
        );
        assert_eq!(simplify(&Expr::ite(p.clone(), x.clone(), x.clone())), x);
        assert_eq!(
            simplify(&Expr::ite(
                p.clone(),
                Expr::bool_const(true),
                Expr::bool_const(false)
            )),
            p
        );
    }

    #[test]
    fn with_then_index_fuses() {
        let arr_ty = Type::Array {
            element: i32_ty(),
            size: Some(int(4)),
            infinite: false,
        }
        .rc();
        let a = Expr::symbol(Name::new("a"), arr_ty);
        let updated = Expr::with(a.clone(), WithKey::Index(int(2)), int(9));

        let hit = Expr::index(updated.clone(), int(2));
        assert_eq!(simplify(&hit).as_int_const(), Some(9));

        // A different constant index looks through the update.
        let miss = Expr::index(updated, int(1));
        let expected = Expr::index(a, int(1));
        assert_eq!(simplify(&miss), expected);
    }

    #[test]
    fn with_then_member_fuses() {
        let s_ty = Type::Struct {
            name: Name::new("pair"),
            members: vec![
                crate::types::Member {
                    name: Name::new("fst"),
                    ty: i32_ty(),
                },
                crate::types::Member {
                    name: Name::new("snd"),
                    ty: i32_ty(),
                },
            ],
        }
        .rc();
        let s = Expr::symbol(Name::new("s"), s_ty);
        let updated = Expr::with(s, WithKey::Member(Name::new("fst")), int(5));
        let read = Expr::member(updated, Name::new("fst"), i32_ty());
        assert_eq!(simplify(&read).as_int_const(), Some(5));
    }

    #[test]
    fn byte_extract_of_constant() {
        let v = Expr::int_const(0x1234_5678, Type::Unsigned { width: 32 }.rc());
        let e = Expr::new(
            u8_ty(),
            ExprKind::ByteExtract {
                value: v,
                offset: Expr::int_const(1, i32_ty()),
                big_endian: false,
            },
        );
        assert_eq!(simplify(&e).as_int_const(), Some(0x56));
    }

    #[test]
    fn overflow_predicates_fold() {
        let i8_ty = Type::Signed { width: 8 }.rc();
        let e = Expr::new(
            Type::Bool.rc(),
            ExprKind::Overflow {
                op: OverflowOp::Add,
                lhs: Expr::int_const(127, i8_ty.clone()),
                rhs: Expr::int_const(1, i8_ty.clone()),
            },
        );
        assert!(simplify(&e).is_true());

        let ok = Expr::new(
            Type::Bool.rc(),
            ExprKind::Overflow {
                op: OverflowOp::Add,
                lhs: Expr::int_const(1, i8_ty.clone()),
                rhs: Expr::int_const(1, i8_ty),
            },
        );
        assert!(simplify(&ok).is_false());
    }

    #[test]
    fn deref_of_address_cancels() {
        let x = sym("x");
        let e = Expr::dereference(Expr::address_of(x.clone()));
        assert_eq!(simplify(&e), x);
    }

    #[test]
    fn simplify_is_idempotent_on_samples() {
        let x = sym("x");
        let samples = vec![
            Expr::binary(BinOp::Add, int(2), int(3)),
            Expr::binary(BinOp::Add, x.clone(), int(0)),
            Expr::ite(
                Expr::binary(BinOp::Lt, x.clone(), int(10)),
                Expr::binary(BinOp::Mul, x.clone(), int(1)),
                int(0),
            ),
            Expr::not(Expr::binary(BinOp::Le, int(3), int(3))),
        ];
        for e in samples {
            let once = simplify(&e);
            let twice = simplify(&once);
            assert_eq!(once, twice, "not idempotent for {}", e);
        }
    }

    #[test]
    fn fixedbv_folding() {
        let fx = Type::Fixedbv {
            width: 32,
            integer_bits: 16,
        }
        .rc();
        // 1.5 and 2.25 at 16 fractional bits.
        let a = Expr::fixedbv_const(3 << 15, fx.clone());
        let b = Expr::fixedbv_const(9 << 14, fx.clone());
        let sum = simplify(&Expr::binary(BinOp::Add, a.clone(), b.clone()));
        match &sum.kind {
            ExprKind::FixedbvConst(raw) => assert_eq!(*raw, (3 << 15) + (9 << 14)),
            other => panic!("expected fixedbv constant, got {:?}", other),
        }

        let prod = simplify(&Expr::binary(BinOp::Mul, a, b));
        match &prod.kind {
            // 1.5 * 2.25 = 3.375 = 27/8.
            ExprKind::FixedbvConst(raw) => assert_eq!(*raw, 27 << 13),
            other => panic!("expected fixedbv constant, got {:?}", other),
        }
    }
}
