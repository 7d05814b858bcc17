//! Dereference expansion.
//!
//! Reads through a pointer become an if-then-else chain over the pointer's
//! points-to set; writes expand into one guarded assignment per candidate
//! object. Either way a validity claim is recorded, so bad dereferences
//! surface in the equation stream rather than as engine errors.

use crate::engine::{Engine, SymexResult};
use crate::target::Visibility;
use crate::value_set::ObjectDescriptor;
use std::collections::BTreeSet;
use symgo_goto::Location;
use symgo_ir::{Expr, ExprKind, ExprRef, Name, RenameLevel, SymbolExpr, TypeRef};
use tracing::warn;

impl<'a> Engine<'a> {
    /// The points-to set of a pointer expression, resolved against the
    /// current L1 map.
    pub(crate) fn points_to(&self, e: &ExprRef) -> BTreeSet<ObjectDescriptor> {
        let level1 = &self.state.level1;
        let resolve = |sym: &SymbolExpr| -> (Name, u32) {
            let activation = if sym.level == RenameLevel::Level0 {
                level1.current(&sym.name)
            } else {
                sym.l1
            };
            (sym.name.clone(), activation)
        };
        self.state.value_set.objects_for(e, &resolve)
    }

    /// Rewrite every dereference in `e` into a case split over its points-to
    /// set, recording validity claims along the way.
    pub(crate) fn expand_deref_reads(&mut self, e: &ExprRef) -> SymexResult<ExprRef> {
        if let ExprKind::Dereference(pointer) = &e.kind {
            let pointer = self.expand_deref_reads(pointer)?;
            return self.deref_value(&pointer, &e.ty);
        }

        let mut first_error = None;
        let out = e.map_operands(&mut |c| match self.expand_deref_reads(c) {
            Ok(expanded) => expanded,
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
                c.clone()
            }
        });
        match first_error {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    /// The value read through `pointer`, as an ite chain over candidates.
    fn deref_value(&mut self, pointer: &ExprRef, ty: &TypeRef) -> SymexResult<ExprRef> {
        let location = self.current_location();
        let objects = self.points_to(pointer);
        self.deref_claim(pointer, &objects, &location)?;

        let mut candidates = Vec::new();
        for object in &objects {
            if let ObjectDescriptor::Object { name, activation } = object {
                let Some(obj_ty) = self.lookup_symbol_type(name) else {
                    warn!(object = %name, "dereference target missing from the symbol table");
                    continue;
                };
                let obj_sym = object_symbol(name, *activation, &obj_ty);
                let value = coerce(obj_sym.clone(), ty);
                candidates.push((self.same_object_cond(pointer, &obj_sym), value));
            }
        }

        let Some((_, last)) = candidates.last().cloned() else {
            // Nothing concrete to read: a fresh unconstrained value. The
            // claim above already records the failure.
            let name = Name::new(&format!("symex::invalid_deref${}", self.nondet_counter));
            self.nondet_counter += 1;
            self.aux_symbols.insert(name.clone(), ty.clone());
            return Ok(Expr::symbol(name, ty.clone()));
        };

        let mut chain = last;
        for (cond, value) in candidates.iter().rev().skip(1) {
            chain = Expr::ite(cond.clone(), value.clone(), chain);
        }
        Ok(chain)
    }

    /// Expand a store through a pointer into guarded assignments to each
    /// candidate object.
    pub(crate) fn symex_deref_write(
        &mut self,
        pointer: &ExprRef,
        rhs: ExprRef,
        location: &Location,
    ) -> SymexResult<()> {
        let pointer = self.expand_deref_reads(pointer)?;
        let objects = self.points_to(&pointer);
        self.deref_claim(&pointer, &objects, location)?;

        let mut targets = Vec::new();
        for object in &objects {
            if let ObjectDescriptor::Object { name, activation } = object {
                match self.lookup_symbol_type(name) {
                    Some(ty) => targets.push((name.clone(), *activation, ty)),
                    None => {
                        warn!(object = %name, "dereference target missing from the symbol table")
                    }
                }
            }
        }

        if targets.is_empty() {
            warn!(pointer = %pointer, "store through pointer with no known target dropped");
            return Ok(());
        }

        let unconditional = targets.len() == 1 && objects.len() == 1;
        for (name, activation, obj_ty) in targets {
            let obj_sym = object_symbol(&name, activation, &obj_ty);
            let value = coerce(rhs.clone(), &obj_ty);
            let value = if unconditional {
                value
            } else {
                Expr::ite(
                    self.same_object_cond(&pointer, &obj_sym),
                    value,
                    obj_sym.clone(),
                )
            };
            self.assign_symbol(&obj_sym, value, Visibility::Visible, location, true)?;
        }
        Ok(())
    }

    /// Claim that the dereference hits one of the known valid objects.
    fn deref_claim(
        &mut self,
        pointer: &ExprRef,
        objects: &BTreeSet<ObjectDescriptor>,
        location: &Location,
    ) -> SymexResult<()> {
        let mut conds = Vec::new();
        for object in objects {
            if let ObjectDescriptor::Object { name, activation } = object {
                if let Some(obj_ty) = self.lookup_symbol_type(name) {
                    let obj_sym = object_symbol(name, *activation, &obj_ty);
                    conds.push(self.same_object_cond(pointer, &obj_sym));
                }
            }
        }

        let cond = match conds.len() {
            0 => self.ctx.false_expr.clone(),
            1 => conds.pop().expect("len checked above"),
            _ => {
                let mut iter = conds.into_iter();
                let first = iter.next().expect("len checked above");
                iter.fold(first, Expr::or)
            }
        };
        self.claim(cond, "dereference failure: invalid pointer", location)
    }

    fn same_object_cond(&self, pointer: &ExprRef, obj_sym: &ExprRef) -> ExprRef {
        Expr::new(
            self.ctx.bool_type.clone(),
            ExprKind::SameObject {
                lhs: pointer.clone(),
                rhs: Expr::address_of(obj_sym.clone()),
            },
        )
    }
}

/// An L1 symbol for a points-to candidate object.
fn object_symbol(name: &Name, activation: u32, ty: &TypeRef) -> ExprRef {
    Expr::new(
        ty.clone(),
        ExprKind::Symbol(SymbolExpr {
            name: name.clone(),
            level: RenameLevel::Level1,
            l1: activation,
            l2: 0,
            thread: 0,
            node: 0,
        }),
    )
}

/// Cast `e` to `ty` when the candidate's type differs from the access type.
fn coerce(e: ExprRef, ty: &TypeRef) -> ExprRef {
    if e.ty == *ty {
        e
    } else {
        Expr::typecast(e, ty.clone())
    }
}
