//! The equation sink: an append-only log of symbolic steps.
//!
//! The engine talks to the sink only through [`SymexTarget`], so a solver
//! encoding can substitute its own implementation. The record order of the
//! default [`Equation`] is the canonical total order consumed downstream. The
//! sink performs no simplification; all algebraic work happens before
//! insertion.

use std::fmt;
use symgo_goto::Location;
use symgo_ir::{ExprRef, Name};

/// Whether a record was written by the program or introduced by the engine
/// (guard helpers, phi variables). Hidden records need not be shown to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// One record of the equation.
#[derive(Clone, Debug)]
pub enum Step {
    Assignment {
        guard: ExprRef,
        lhs: ExprRef,
        original_lhs: ExprRef,
        rhs: ExprRef,
        location: Location,
        stack_trace: Vec<Name>,
        visibility: Visibility,
    },
    Assumption {
        guard: ExprRef,
        cond: ExprRef,
        location: Location,
    },
    Assertion {
        guard: ExprRef,
        cond: ExprRef,
        message: String,
        location: Location,
        stack_trace: Vec<Name>,
    },
    Output {
        guard: ExprRef,
        arguments: Vec<ExprRef>,
        location: Location,
    },
    AtomicBegin {
        location: Location,
    },
    AtomicEnd {
        location: Location,
    },
}

impl Step {
    pub fn is_hidden(&self) -> bool {
        matches!(
            self,
            Step::Assignment {
                visibility: Visibility::Hidden,
                ..
            }
        )
    }
}

/// Abstract sink the engine appends to.
pub trait SymexTarget {
    #[allow(clippy::too_many_arguments)]
    fn assignment(
        &mut self,
        guard: ExprRef,
        lhs: ExprRef,
        original_lhs: ExprRef,
        rhs: ExprRef,
        location: Location,
        stack_trace: Vec<Name>,
        visibility: Visibility,
    );

    fn assumption(&mut self, guard: ExprRef, cond: ExprRef, location: Location);

    fn assertion(
        &mut self,
        guard: ExprRef,
        cond: ExprRef,
        message: String,
        location: Location,
        stack_trace: Vec<Name>,
    );

    fn output(&mut self, guard: ExprRef, arguments: Vec<ExprRef>, location: Location);

    fn atomic_begin(&mut self, location: Location);

    fn atomic_end(&mut self, location: Location);
}

/// Encoding hints forwarded from the configuration; the engine records them
/// at sink setup and otherwise ignores them.
#[derive(Clone, Copy, Debug, Default)]
pub struct EquationConfig {
    pub tuple_node_flattener: bool,
    pub tuple_sym_flattener: bool,
}

/// The default sink: a growable vector of steps in insertion order.
#[derive(Debug, Default)]
pub struct Equation {
    config: EquationConfig,
    steps: Vec<Step>,
}

impl Equation {
    pub fn new(config: EquationConfig) -> Self {
        Equation {
            config,
            steps: Vec::new(),
        }
    }

    pub fn config(&self) -> &EquationConfig {
        &self.config
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All assertion records, in order.
    pub fn assertions(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Assertion { .. }))
    }

    /// All visible assignment records, in order.
    pub fn visible_assignments(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Assignment { .. }) && !s.is_hidden())
    }
}

impl SymexTarget for Equation {
    fn assignment(
        &mut self,
        guard: ExprRef,
        lhs: ExprRef,
        original_lhs: ExprRef,
        rhs: ExprRef,
        location: Location,
        stack_trace: Vec<Name>,
        visibility: Visibility,
    ) {
        self.steps.push(Step::Assignment {
            guard,
            lhs,
            original_lhs,
            rhs,
            location,
            stack_trace,
            visibility,
        });
    }

    fn assumption(&mut self, guard: ExprRef, cond: ExprRef, location: Location) {
        self.steps.push(Step::Assumption {
            guard,
            cond,
            location,
        });
    }

    fn assertion(
        &mut self,
        guard: ExprRef,
        cond: ExprRef,
        message: String,
        location: Location,
        stack_trace: Vec<Name>,
    ) {
        self.steps.push(Step::Assertion {
            guard,
            cond,
            message,
            location,
            stack_trace,
        });
    }

    fn output(&mut self, guard: ExprRef, arguments: Vec<ExprRef>, location: Location) {
        self.steps.push(Step::Output {
            guard,
            arguments,
            location,
        });
    }

    fn atomic_begin(&mut self, location: Location) {
        self.steps.push(Step::AtomicBegin { location });
    }

    fn atomic_end(&mut self, location: Location) {
        self.steps.push(Step::AtomicEnd { location });
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Assignment {
                guard,
                lhs,
                rhs,
                visibility,
                ..
            } => {
                if *visibility == Visibility::Hidden {
                    write!(f, "(hidden) ")?;
                }
                if !guard.is_true() {
                    write!(f, "[{}] ", guard)?;
                }
                write!(f, "{} := {}", lhs, rhs)
            }
            Step::Assumption { guard, cond, .. } => {
                if !guard.is_true() {
                    write!(f, "[{}] ", guard)?;
                }
                write!(f, "assume {}", cond)
            }
            Step::Assertion {
                guard,
                cond,
                message,
                ..
            } => {
                if !guard.is_true() {
                    write!(f, "[{}] ", guard)?;
                }
                write!(f, "assert {} // {}", cond, message)
            }
            Step::Output { arguments, .. } => {
                write!(f, "output")?;
                for arg in arguments {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            Step::AtomicBegin { .. } => write!(f, "atomic_begin"),
            Step::AtomicEnd { .. } => write!(f, "atomic_end"),
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>4}: {}", i, step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symgo_ir::Expr;

    fn loc() -> Location {
        Location::builtin(Name::new("main"))
    }

    #[test]
    fn records_keep_insertion_order() {
        let mut eq = Equation::new(EquationConfig::default());
        eq.assumption(Expr::bool_const(true), Expr::bool_const(true), loc());
        eq.assertion(
            Expr::bool_const(true),
            Expr::bool_const(false),
            "boom".into(),
            loc(),
            vec![Name::new("main")],
        );
        eq.atomic_begin(loc());

        assert_eq!(eq.len(), 3);
        assert!(matches!(eq.steps()[0], Step::Assumption { .. }));
        assert!(matches!(eq.steps()[1], Step::Assertion { .. }));
        assert!(matches!(eq.steps()[2], Step::AtomicBegin { .. }));
        assert_eq!(eq.assertions().count(), 1);
    }

    #[test]
    fn hidden_assignments_are_filtered() {
        let mut eq = Equation::new(EquationConfig::default());
        let t = Expr::bool_const(true);
        eq.assignment(
            t.clone(),
            t.clone(),
            t.clone(),
            t.clone(),
            loc(),
            vec![],
            Visibility::Hidden,
        );
        eq.assignment(t.clone(), t.clone(), t.clone(), t, loc(), vec![], Visibility::Visible);

        assert_eq!(eq.visible_assignments().count(), 1);
        assert!(eq.steps()[0].is_hidden());
    }
}
