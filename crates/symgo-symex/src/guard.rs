//! Path conditions as ordered conjunct lists.
//!
//! A guard is the conjunction of its conjuncts; the empty guard is `true`.
//! Guards forked from one state share a common prefix of conjuncts, which is
//! what `subtract` and `or_with` exploit: the difference of two guards is the
//! tail one adds over the other, and the disjunction only disjoins the tails.

use smallvec::SmallVec;
use symgo_ir::{BinOp, Expr, ExprKind, ExprRef, UnOp};

/// A conjunctive path condition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Guard {
    conjuncts: SmallVec<[ExprRef; 4]>,
}

impl Guard {
    /// The true guard.
    pub fn new() -> Self {
        Guard::default()
    }

    /// Add a conjunct. Conjunctions are flattened, `true` is dropped.
    pub fn add(&mut self, e: ExprRef) {
        match &e.kind {
            ExprKind::Binary {
                op: BinOp::And,
                lhs,
                rhs,
            } => {
                self.add(lhs.clone());
                self.add(rhs.clone());
            }
            ExprKind::BoolConst(true) => {}
            _ => self.conjuncts.push(e),
        }
    }

    /// Route this path to nowhere.
    pub fn make_false(&mut self) {
        self.conjuncts.clear();
        self.conjuncts.push(Expr::bool_const(false));
    }

    pub fn is_true(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// A guard is false iff some conjunct is the constant false.
    pub fn is_false(&self) -> bool {
        self.conjuncts.iter().any(|c| c.is_false())
    }

    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn conjuncts(&self) -> &[ExprRef] {
        &self.conjuncts
    }

    /// Fold the conjuncts into a single boolean term.
    pub fn as_expr(&self) -> ExprRef {
        fold_conjunction(&self.conjuncts)
    }

    /// `guard ⇒ e`; the true guard passes `e` through unchanged.
    pub fn guard_expr(&self, e: ExprRef) -> ExprRef {
        if self.is_true() {
            e
        } else {
            Expr::implies(self.as_expr(), e)
        }
    }

    /// The tail this guard adds over `other`: strips the common prefix of
    /// `other` from the front of `self`.
    pub fn subtract(&self, other: &Guard) -> Guard {
        let common = self
            .conjuncts
            .iter()
            .zip(other.conjuncts.iter())
            .take_while(|(a, b)| a == b)
            .count();
        Guard {
            conjuncts: self.conjuncts[common..].iter().cloned().collect(),
        }
    }

    /// Disjunctive update: `self := self ∨ other`, keeping the common prefix
    /// and disjoining only the tails. Complementary tails cancel to `true`.
    pub fn or_with(&mut self, other: &Guard) {
        if other.is_false() {
            return;
        }
        if self.is_false() {
            self.conjuncts = other.conjuncts.clone();
            return;
        }

        let common = self
            .conjuncts
            .iter()
            .zip(other.conjuncts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let tail_self = fold_conjunction(&self.conjuncts[common..]);
        let tail_other = fold_conjunction(&other.conjuncts[common..]);

        self.conjuncts.truncate(common);

        // (prefix ∧ t) ∨ (prefix ∧ true) = prefix, and t ∨ ¬t = true.
        if tail_self.is_true() || tail_other.is_true() || complementary(&tail_self, &tail_other) {
            return;
        }
        self.add(Expr::or(tail_self, tail_other));
    }
}

/// Fold a slice of boolean terms into their conjunction.
fn fold_conjunction(conjuncts: &[ExprRef]) -> ExprRef {
    match conjuncts.len() {
        0 => Expr::bool_const(true),
        1 => conjuncts[0].clone(),
        _ => {
            let mut iter = conjuncts.iter().cloned();
            let first = iter.next().expect("len checked above");
            iter.fold(first, Expr::and)
        }
    }
}

/// Is one term the boolean negation of the other?
fn complementary(a: &ExprRef, b: &ExprRef) -> bool {
    let negates = |x: &ExprRef, y: &ExprRef| match &x.kind {
        ExprKind::Unary {
            op: UnOp::Not,
            value,
        } => value == y,
        _ => false,
    };
    negates(a, b) || negates(b, a)
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_expr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symgo_ir::{Name, Type};

    fn b(name: &str) -> ExprRef {
        Expr::symbol(Name::new(name), Type::Bool.rc())
    }

    #[test]
    fn empty_guard_is_true() {
        let g = Guard::new();
        assert!(g.is_true());
        assert!(!g.is_false());
        assert!(g.as_expr().is_true());
    }

    #[test]
    fn add_flattens_conjunctions_and_drops_true() {
        let mut g = Guard::new();
        g.add(Expr::bool_const(true));
        assert!(g.is_true());

        g.add(Expr::and(b("p"), Expr::and(b("q"), b("r"))));
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn false_conjunct_makes_guard_false() {
        let mut g = Guard::new();
        g.add(b("p"));
        g.add(Expr::bool_const(false));
        assert!(g.is_false());
    }

    #[test]
    fn guard_expr_builds_implication() {
        let mut g = Guard::new();
        let e = b("e");
        assert_eq!(g.guard_expr(e.clone()), e);

        g.add(b("p"));
        let guarded = g.guard_expr(e.clone());
        assert_eq!(guarded, Expr::implies(b("p"), e));
    }

    #[test]
    fn subtract_strips_common_prefix() {
        let mut g1 = Guard::new();
        g1.add(b("p"));
        g1.add(b("q"));
        g1.add(b("r"));

        let mut g2 = Guard::new();
        g2.add(b("p"));
        g2.add(b("q"));

        let diff = g1.subtract(&g2);
        assert_eq!(diff.conjuncts(), &[b("r")]);

        // Subtracting a guard from itself leaves the true guard.
        assert!(g1.subtract(&g1).is_true());
    }

    #[test]
    fn or_with_self_is_identity() {
        let mut g = Guard::new();
        g.add(b("p"));
        g.add(b("q"));
        let before = g.clone();
        let other = g.clone();
        g.or_with(&other);
        assert_eq!(g, before);
    }

    #[test]
    fn or_with_false_is_identity() {
        let mut g = Guard::new();
        g.add(b("p"));
        let before = g.clone();
        let mut f = Guard::new();
        f.make_false();
        g.or_with(&f);
        assert_eq!(g, before);

        let mut f = Guard::new();
        f.make_false();
        f.or_with(&before);
        assert_eq!(f, before);
    }

    #[test]
    fn or_with_disjoins_tails_over_common_prefix() {
        let mut g1 = Guard::new();
        g1.add(b("p"));
        g1.add(b("q"));

        let mut g2 = Guard::new();
        g2.add(b("p"));
        g2.add(b("r"));

        g1.or_with(&g2);
        assert_eq!(g1.conjuncts()[0], b("p"));
        assert_eq!(g1.conjuncts()[1], Expr::or(b("q"), b("r")));
        assert_eq!(g1.len(), 2);
    }

    #[test]
    fn complementary_tails_cancel() {
        let gamma = b("gamma");

        let mut g1 = Guard::new();
        g1.add(b("p"));
        g1.add(gamma.clone());

        let mut g2 = Guard::new();
        g2.add(b("p"));
        g2.add(Expr::not(gamma));

        g1.or_with(&g2);
        assert_eq!(g1.conjuncts(), &[b("p")]);
    }

    #[test]
    fn prefix_of_other_drops_tail() {
        // g1 = p ∧ q, g2 = p: the disjunction is p.
        let mut g1 = Guard::new();
        g1.add(b("p"));
        g1.add(b("q"));

        let mut g2 = Guard::new();
        g2.add(b("p"));

        g1.or_with(&g2);
        assert_eq!(g1.conjuncts(), &[b("p")]);
    }
}
