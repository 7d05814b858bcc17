//! Branching, merging and loop bounding.
//!
//! A conditional goto forks the current state: the walker always advances to
//! the fall-through side while a snapshot is queued at the other target, so
//! every join point is reached in program order and drains its pending states
//! there. Loop back-edges consult the unwind map and either continue, cut the
//! loop with an assumption, or emit an unwinding claim.

use crate::engine::{Engine, SymexError, SymexResult};
use crate::state::GotoState;
use crate::target::Visibility;
use std::collections::BTreeSet;
use symgo_goto::Instruction;
use symgo_ir::{simplify, Expr, ExprKind, ExprRef, Name, RenameLevel, SymbolExpr, UnOp};
use tracing::{debug, info, warn};

impl<'a> Engine<'a> {
    /// Execute a (conditional) goto; see the module comment for the fork
    /// protocol. Only deterministic single-target gotos are supported.
    pub(crate) fn symex_goto(
        &mut self,
        condition: &ExprRef,
        targets: &[usize],
        instruction: &Instruction,
    ) -> SymexResult<()> {
        let new_guard = self.prepare(condition)?;
        let unwind_key = (self.state.pc.function.clone(), self.state.pc.index);

        if new_guard.is_false() || self.state.guard.is_false() {
            // The branch is not taken on this path; reset the unwind counter
            // so a later visit starts over.
            self.state.unwind_map.remove(&unwind_key);
            self.state.pc.index += 1;
            return Ok(());
        }

        if targets.len() != 1 {
            return Err(SymexError::NondeterministicGoto {
                location: instruction.location.clone(),
            });
        }
        let goto_target = targets[0];
        let forward = (instruction.location_number as usize) < goto_target;

        if !forward {
            if self.options.assume_all_states {
                // Wide assumption at the state vector point, consumed by a
                // k-induction driver.
                self.target.assumption(
                    self.state.guard.as_expr(),
                    self.state.guard.as_expr(),
                    instruction.location.clone(),
                );
            }

            let unwind = self.state.unwind_count(&unwind_key) + 1;
            self.state.set_unwind(unwind_key.clone(), unwind);
            info!(
                loop_id = instruction.loop_number.unwrap_or(0),
                iteration = unwind,
                location = %instruction.location,
                "unwinding loop"
            );

            if self.unwind_exceeded(instruction.loop_number, unwind) {
                self.loop_bound_exceeded(&new_guard, instruction)?;
                self.state.set_unwind(unwind_key, 0);
                self.state.pc.index += 1;
                return Ok(());
            }

            if new_guard.is_true() {
                self.state.pc.index = goto_target;
                return Ok(());
            }
        }

        self.fork(new_guard, goto_target, forward, instruction)
    }

    /// Unconditional jump used by returns and throw dispatch.
    pub(crate) fn jump_to(&mut self, target: usize, instruction: &Instruction) -> SymexResult<()> {
        if self.state.guard.is_false() {
            self.state.pc.index += 1;
            return Ok(());
        }
        if target <= self.state.pc.index {
            self.state.pc.index = target;
            return Ok(());
        }
        self.fork(self.ctx.true_expr.clone(), target, true, instruction)
    }

    /// Jump to the end-of-function instruction.
    pub(crate) fn jump_to_end(&mut self, instruction: &Instruction) -> SymexResult<()> {
        let end = self
            .program
            .function(&self.state.pc.function)
            .map(|f| f.len().saturating_sub(1))
            .unwrap_or(0);
        if self.state.pc.index >= end {
            self.state.pc.index = end;
            return Ok(());
        }
        self.jump_to(end, instruction)
    }

    /// The fork step: advance the walker to one side, queue a snapshot at the
    /// other, and split the guard on a (possibly fresh) boolean symbol.
    fn fork(
        &mut self,
        new_guard: ExprRef,
        goto_target: usize,
        forward: bool,
        instruction: &Instruction,
    ) -> SymexResult<()> {
        let (new_state_pc, state_pc) = if forward {
            (goto_target, self.state.pc.index + 1)
        } else {
            (self.state.pc.index + 1, goto_target)
        };
        self.state.pc.index = state_pc;

        let mut new_state = GotoState::capture(&self.state);

        if new_guard.is_true() {
            // The whole path is routed to the target; the walker continues
            // with a false guard only to drain pending merges in order.
            self.state.guard.make_false();
        } else {
            let guard_expr = if is_symbol_or_negation(&new_guard) {
                new_guard
            } else {
                // Fresh guard helper: γ := ¬c, recorded hidden; the branch
                // condition becomes ¬γ (≡ c).
                let rhs = simplify(&Expr::not(new_guard));
                let helper = Expr::new(
                    self.ctx.bool_type.clone(),
                    ExprKind::Symbol(SymbolExpr::level0(self.guard_name.clone())),
                );
                let new_lhs = self.assign_symbol(
                    &helper,
                    rhs,
                    Visibility::Hidden,
                    &instruction.location,
                    false,
                )?;
                Expr::not(new_lhs)
            };
            let not_guard = simplify(&Expr::not(guard_expr.clone()));

            if forward {
                new_state.guard.add(guard_expr);
                self.state.guard.add(not_guard);
            } else {
                self.state.guard.add(guard_expr);
                new_state.guard.add(not_guard);
            }
        }

        debug!(
            target = new_state_pc,
            fall_through = state_pc,
            "queued goto state"
        );
        self.state
            .top_mut()
            .goto_state_map
            .entry(new_state_pc)
            .or_default()
            .push(new_state);
        Ok(())
    }

    fn unwind_exceeded(&self, loop_number: Option<u32>, unwind: u32) -> bool {
        let bound = self.options.unwind_bound(loop_number);
        bound != 0 && unwind >= bound
    }

    /// Loop-bound treatment per configured mode (see the options table).
    fn loop_bound_exceeded(
        &mut self,
        new_guard: &ExprRef,
        instruction: &Instruction,
    ) -> SymexResult<()> {
        let loop_id = instruction.loop_number.unwrap_or(0);
        let negated = if new_guard.is_true() {
            self.ctx.false_expr.clone()
        } else {
            simplify(&Expr::not(new_guard.clone()))
        };
        let message = format!("unwinding assertion loop {}", loop_id);
        info!(loop_id, location = %instruction.location, "loop bound reached");

        if self.options.base_case {
            self.unwinding_assumption(negated.clone(), instruction);
            self.state.guard.add(negated);
        } else if self.options.forward_condition {
            self.claim(negated.clone(), &message, &instruction.location)?;
            self.state.guard.add(negated);
        } else {
            if self.options.no_unwinding_assertions {
                self.unwinding_assumption(negated.clone(), instruction);
            } else {
                self.claim(negated.clone(), &message, &instruction.location)?;
            }
            if !self.options.partial_loops {
                self.state.guard.add(negated);
            }
        }
        Ok(())
    }

    fn unwinding_assumption(&mut self, negated: ExprRef, instruction: &Instruction) {
        let guarded = self.state.guard.guard_expr(negated);
        self.target.assumption(
            self.state.guard.as_expr(),
            guarded,
            instruction.location.clone(),
        );
    }

    // === Merging ===

    /// Drain the pending states queued at the current pc, in reverse
    /// insertion order: phi assignments, value-set join, guard disjunction,
    /// depth minimum.
    pub(crate) fn merge_gotos(&mut self) -> SymexResult<()> {
        let pc_index = self.state.pc.index;
        let Some(list) = self.state.top_mut().goto_state_map.remove(&pc_index) else {
            return Ok(());
        };
        debug!(count = list.len(), at = pc_index, "merging goto states");

        for goto_state in list.into_iter().rev() {
            self.phi_function(&goto_state)?;

            if self.state.guard.is_false() {
                self.state.value_set = goto_state.value_set;
            } else {
                self.state.value_set.make_union(&goto_state.value_set);
            }

            self.state.guard.or_with(&goto_state.guard);
            self.state.depth = self.state.depth.min(goto_state.depth);
        }
        Ok(())
    }

    /// Synthesise SSA assignments for every identifier whose L2 number
    /// differs between the pending and the current state.
    fn phi_function(&mut self, goto_state: &GotoState) -> SymexResult<()> {
        let mut variables: BTreeSet<(Name, u32)> = BTreeSet::new();
        goto_state.level2.collect_variables(&mut variables);
        self.state.level2.collect_variables(&mut variables);

        let location = self.current_location();

        for (name, activation) in variables {
            if goto_state.level2.current(&name, activation)
                == self.state.level2.current(&name, activation)
            {
                continue; // not changed
            }
            if name == self.guard_name {
                continue; // just a branch guard helper
            }

            let Some(ty) = self.lookup_symbol_type(&name) else {
                // The identifier did not exist in both worlds. Skipping it is
                // the permissive behaviour; strict mode refuses instead.
                if self.options.strict_phi {
                    return Err(SymexError::MissingSymbol { name });
                }
                warn!(symbol = %name, "skipping phi for identifier missing from the symbol table");
                continue;
            };

            let l1_sym = Expr::new(
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

            let rhs = if self.state.guard.is_false() {
                // The walker side is dead: take the pending value outright.
                self.state.current_name(goto_state, &l1_sym)
            } else if goto_state.guard.is_false() {
                self.state.rename(&l1_sym)
            } else {
                let diff = goto_state.guard.subtract(&self.state.guard);
                Expr::ite(
                    diff.as_expr(),
                    self.state.current_name(goto_state, &l1_sym),
                    self.state.rename(&l1_sym),
                )
            };

            self.assign_symbol(&l1_sym, rhs, Visibility::Hidden, &location, false)?;
        }
        Ok(())
    }
}

/// Is this term a boolean symbol or the negation of one? Such conditions are
/// used directly as branch guards instead of introducing a helper.
fn is_symbol_or_negation(e: &ExprRef) -> bool {
    match &e.kind {
        ExprKind::Symbol(_) => true,
        ExprKind::Unary {
            op: UnOp::Not,
            value,
        } => value.is_symbol(),
        _ => false,
    }
}
