//! Per-path execution state.
//!
//! A path owns its program counter, call stack, renaming maps, value set,
//! guard, unwind counters and depth. Forking a path snapshots only what a
//! merge needs ([`GotoState`]); term handles are shared, so snapshots are
//! cheap and no mutable slot is ever aliased between paths.

use crate::guard::Guard;
use crate::renaming::{Level1, Level2};
use crate::value_set::ValueSet;
use symgo_ir::{Expr, ExprKind, ExprRef, Name, RenameLevel, SymbolExpr, TypeRef};

/// Program counter: a function and an instruction index within it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pc {
    pub function: Name,
    pub index: usize,
}

impl Pc {
    pub fn new(function: Name, index: usize) -> Self {
        Pc { function, index }
    }
}

/// Snapshot of a path taken at a fork, queued until the join point.
///
/// Carries the renaming, value set, guard and depth at the moment of forking;
/// terms stay shared with the originating state.
#[derive(Clone, Debug)]
pub struct GotoState {
    pub level2: Level2,
    pub value_set: ValueSet,
    pub guard: Guard,
    pub depth: u64,
}

impl GotoState {
    pub fn capture(state: &ExecutionState) -> Self {
        GotoState {
            level2: state.level2.clone(),
            value_set: state.value_set.clone(),
            guard: state.guard.clone(),
            depth: state.depth,
        }
    }
}

/// One activation record on the call stack.
#[derive(Clone, Debug)]
pub struct Frame {
    pub function: Name,
    /// The L1 activation number of this call instance.
    pub activation: u32,
    /// Where to resume in the caller, absent for the entry frame.
    pub return_pc: Option<Pc>,
    /// Caller-side receptacle for the return value.
    pub return_lhs: Option<ExprRef>,
    /// The caller's L1 map, restored on return.
    pub saved_level1: Level1,
    /// Pending forked states per join target within this frame.
    pub goto_state_map: ahash::AHashMap<usize, Vec<GotoState>>,
    /// Exception handler groups installed by catch instructions.
    pub catch_stack: Vec<Vec<(Name, usize)>>,
}

impl Frame {
    pub fn new(function: Name, activation: u32, saved_level1: Level1) -> Self {
        Frame {
            function,
            activation,
            return_pc: None,
            return_lhs: None,
            saved_level1,
            goto_state_map: ahash::AHashMap::new(),
            catch_stack: Vec::new(),
        }
    }
}

/// The full mutable state of one symbolic path.
#[derive(Clone, Debug)]
pub struct ExecutionState {
    pub pc: Pc,
    pub call_stack: Vec<Frame>,
    pub level1: Level1,
    pub level2: Level2,
    pub value_set: ValueSet,
    pub guard: Guard,
    /// Per back-edge iteration counters, keyed by (function, pc index).
    pub unwind_map: ahash::AHashMap<(Name, usize), u32>,
    /// Instructions executed along this path; merges keep the minimum.
    pub depth: u64,
    /// Nesting depth of atomic sections.
    pub atomic_depth: u32,
}

impl ExecutionState {
    /// Fresh state at the entry of `function` with the given activation.
    pub fn new(function: Name, activation: u32) -> Self {
        ExecutionState {
            pc: Pc::new(function.clone(), 0),
            call_stack: vec![Frame::new(function, activation, Level1::new())],
            level1: Level1::new(),
            level2: Level2::new(),
            value_set: ValueSet::new(),
            guard: Guard::new(),
            unwind_map: ahash::AHashMap::new(),
            depth: 0,
            atomic_depth: 0,
        }
    }

    pub fn top(&self) -> &Frame {
        self.call_stack.last().expect("call stack is never empty")
    }

    pub fn top_mut(&mut self) -> &mut Frame {
        self.call_stack
            .last_mut()
            .expect("call stack is never empty")
    }

    /// The (identifier, activation) key of a symbol occurrence.
    pub fn l1_key(&self, sym: &SymbolExpr) -> (Name, u32) {
        let activation = if sym.level == RenameLevel::Level0 {
            self.level1.current(&sym.name)
        } else {
            sym.l1
        };
        (sym.name.clone(), activation)
    }

    /// Rewrite every symbol in `e` to its current L2 form (a read).
    pub fn rename(&self, e: &ExprRef) -> ExprRef {
        self.rename_with(e, &self.level2)
    }

    /// Rewrite `e` to the L2 form it had in `goto_state`, used when building
    /// phi assignments.
    pub fn current_name(&self, goto_state: &GotoState, e: &ExprRef) -> ExprRef {
        self.rename_with(e, &goto_state.level2)
    }

    fn rename_with(&self, e: &ExprRef, level2: &Level2) -> ExprRef {
        match &e.kind {
            ExprKind::Symbol(sym) => {
                if sym.level == RenameLevel::Level2 {
                    return e.clone();
                }
                let (name, activation) = self.l1_key(sym);
                let ssa = level2.current(&name, activation);
                Expr::new(
                    e.ty.clone(),
                    ExprKind::Symbol(SymbolExpr {
                        name,
                        level: RenameLevel::Level2,
                        l1: activation,
                        l2: ssa,
                        thread: sym.thread,
                        node: sym.node,
                    }),
                )
            }
            // Address-of takes the object, not its value: only the activation
            // is resolved underneath.
            ExprKind::AddressOf(_) => e.map_operands(&mut |c| self.rename_level1(c)),
            _ => e.map_operands(&mut |c| self.rename_with(c, level2)),
        }
    }

    /// Rewrite symbols to their L1 form only.
    pub fn rename_level1(&self, e: &ExprRef) -> ExprRef {
        match &e.kind {
            ExprKind::Symbol(sym) => {
                if sym.level != RenameLevel::Level0 {
                    return e.clone();
                }
                let (name, activation) = self.l1_key(sym);
                Expr::new(
                    e.ty.clone(),
                    ExprKind::Symbol(SymbolExpr {
                        name,
                        level: RenameLevel::Level1,
                        l1: activation,
                        l2: 0,
                        thread: sym.thread,
                        node: sym.node,
                    }),
                )
            }
            _ => e.map_operands(&mut |c| self.rename_level1(c)),
        }
    }

    /// Bump the SSA number of `(name, activation)` for a write and return the
    /// new L2 symbol together with its L1 original.
    pub fn rename_write(
        &mut self,
        name: &Name,
        activation: u32,
        ty: &TypeRef,
    ) -> (ExprRef, ExprRef) {
        let ssa = self.level2.increase(name.clone(), activation);
        let new_lhs = Expr::new(
            ty.clone(),
            ExprKind::Symbol(SymbolExpr {
                name: name.clone(),
                level: RenameLevel::Level2,
                l1: activation,
                l2: ssa,
                thread: 0,
                node: 0,
            }),
        );
        let original = Expr::new(
            ty.clone(),
            ExprKind::Symbol(SymbolExpr {
                name: name.clone(),
                level: RenameLevel::Level1,
                l1: activation,
                l2: 0,
                thread: 0,
                node: 0,
            }),
        );
        (new_lhs, original)
    }

    /// Current unwind count at a back-edge.
    pub fn unwind_count(&self, key: &(Name, usize)) -> u32 {
        self.unwind_map.get(key).copied().unwrap_or(0)
    }

    pub fn set_unwind(&mut self, key: (Name, usize), count: u32) {
        self.unwind_map.insert(key, count);
    }

    /// Function names of the current call stack, outermost first.
    pub fn stack_trace(&self) -> Vec<Name> {
        self.call_stack.iter().map(|f| f.function.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symgo_ir::{BinOp, Type};

    fn i32_ty() -> TypeRef {
        Type::Signed { width: 32 }.rc()
    }

    fn state() -> ExecutionState {
        let mut s = ExecutionState::new(Name::new("main"), 1);
        s.level1.bind(Name::new("x"), 1);
        s
    }

    #[test]
    fn rename_read_uses_current_ssa_number() {
        let mut s = state();
        let x = Expr::symbol(Name::new("x"), i32_ty());

        let renamed = s.rename(&x);
        let sym = renamed.as_symbol().unwrap();
        assert_eq!(sym.level, RenameLevel::Level2);
        assert_eq!((sym.l1, sym.l2), (1, 0));

        s.level2.increase(Name::new("x"), 1);
        let renamed = s.rename(&x);
        assert_eq!(renamed.as_symbol().unwrap().l2, 1);
    }

    #[test]
    fn rename_descends_into_operands() {
        let mut s = state();
        s.level2.increase(Name::new("x"), 1);
        let x = Expr::symbol(Name::new("x"), i32_ty());
        let e = Expr::binary(BinOp::Add, x.clone(), Expr::int_const(1, i32_ty()));

        let renamed = s.rename(&e);
        match &renamed.kind {
            ExprKind::Binary { lhs, .. } => {
                assert_eq!(lhs.as_symbol().unwrap().l2, 1);
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn address_of_is_renamed_to_level1_only() {
        let mut s = state();
        s.level2.increase(Name::new("x"), 1);
        let x = Expr::symbol(Name::new("x"), i32_ty());
        let e = Expr::address_of(x);

        let renamed = s.rename(&e);
        match &renamed.kind {
            ExprKind::AddressOf(inner) => {
                let sym = inner.as_symbol().unwrap();
                assert_eq!(sym.level, RenameLevel::Level1);
                assert_eq!(sym.l1, 1);
            }
            other => panic!("expected address-of, got {:?}", other),
        }
    }

    #[test]
    fn rename_write_bumps_ssa() {
        let mut s = state();
        let (first, original) = s.rename_write(&Name::new("x"), 1, &i32_ty());
        assert_eq!(first.as_symbol().unwrap().l2, 1);
        assert_eq!(original.as_symbol().unwrap().level, RenameLevel::Level1);
        let (second, _) = s.rename_write(&Name::new("x"), 1, &i32_ty());
        assert_eq!(second.as_symbol().unwrap().l2, 2);
    }

    #[test]
    fn current_name_uses_snapshot_numbers() {
        let mut s = state();
        s.level2.increase(Name::new("x"), 1);
        let snapshot = GotoState::capture(&s);
        s.level2.increase(Name::new("x"), 1);

        let x = Expr::symbol(Name::new("x"), i32_ty());
        assert_eq!(s.rename(&x).as_symbol().unwrap().l2, 2);
        assert_eq!(s.current_name(&snapshot, &x).as_symbol().unwrap().l2, 1);
    }

    #[test]
    fn fork_snapshot_does_not_alias() {
        let mut s = state();
        let snapshot = GotoState::capture(&s);
        s.level2.increase(Name::new("x"), 1);
        s.guard.add(Expr::symbol(Name::new("c"), Type::Bool.rc()));

        assert_eq!(snapshot.level2.current(&Name::new("x"), 1), 0);
        assert!(snapshot.guard.is_true());
    }
}
