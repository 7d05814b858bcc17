//! Programmatic construction of goto functions.
//!
//! Used by the parser's lowering step and by tests. Labels are recorded as
//! they appear and goto targets are fixed up in `finish`, which also assigns
//! location numbers and loop ids for backward branches.

use crate::location::Location;
use crate::program::{GotoFunction, Instruction, InstructionKind, Parameter};
use symgo_ir::{simplify, Expr, ExprRef, Name, TypeRef};
use thiserror::Error;

/// Error raised while finishing a function.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("unknown label '{label}' in function '{function}'")]
    UnknownLabel { function: Name, label: Name },

    #[error("duplicate label '{label}' in function '{function}'")]
    DuplicateLabel { function: Name, label: Name },
}

pub type BuildResult<T> = Result<T, BuildError>;

/// Builder for one goto function.
pub struct FunctionBuilder {
    name: Name,
    file: Name,
    parameters: Vec<Parameter>,
    return_type: TypeRef,
    body: Vec<(InstructionKind, u32)>,
    labels: Vec<(Name, usize)>,
    /// (instruction index, label) pairs waiting for resolution.
    goto_fixups: Vec<(usize, Name)>,
    catch_fixups: Vec<(usize, Vec<(Name, Name)>)>,
    current_line: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<Name>, return_type: TypeRef) -> Self {
        FunctionBuilder {
            name: name.into(),
            file: Name::new("<builder>"),
            parameters: Vec::new(),
            return_type,
            body: Vec::new(),
            labels: Vec::new(),
            goto_fixups: Vec::new(),
            catch_fixups: Vec::new(),
            current_line: 0,
        }
    }

    /// Set the file name recorded in instruction locations.
    pub fn file(mut self, file: impl Into<Name>) -> Self {
        self.file = file.into();
        self
    }

    pub fn parameter(&mut self, name: impl Into<Name>, ty: TypeRef) -> &mut Self {
        self.parameters.push(Parameter {
            name: name.into(),
            ty,
        });
        self
    }

    /// Set the source line for subsequently pushed instructions.
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.current_line = line;
        self
    }

    /// Attach a label to the next instruction pushed.
    pub fn label(&mut self, name: impl Into<Name>) -> &mut Self {
        self.labels.push((name.into(), self.body.len()));
        self
    }

    fn push(&mut self, kind: InstructionKind) -> usize {
        let index = self.body.len();
        self.body.push((kind, self.current_line));
        index
    }

    pub fn skip(&mut self) -> &mut Self {
        self.push(InstructionKind::Skip);
        self
    }

    pub fn decl(&mut self, symbol: impl Into<Name>, ty: TypeRef) -> &mut Self {
        self.push(InstructionKind::Decl {
            symbol: symbol.into(),
            ty,
        });
        self
    }

    pub fn assign(&mut self, lhs: ExprRef, rhs: ExprRef) -> &mut Self {
        self.push(InstructionKind::Assign { lhs, rhs });
        self
    }

    pub fn call(
        &mut self,
        lhs: Option<ExprRef>,
        function: impl Into<Name>,
        arguments: Vec<ExprRef>,
    ) -> &mut Self {
        self.push(InstructionKind::FunctionCall {
            lhs,
            function: function.into(),
            arguments,
        });
        self
    }

    pub fn ret(&mut self, value: Option<ExprRef>) -> &mut Self {
        self.push(InstructionKind::Return { value });
        self
    }

    /// Unconditional jump to a label.
    pub fn goto(&mut self, label: impl Into<Name>) -> &mut Self {
        self.goto_if(Expr::bool_const(true), label)
    }

    /// Conditional jump to a label.
    pub fn goto_if(&mut self, condition: ExprRef, label: impl Into<Name>) -> &mut Self {
        let index = self.push(InstructionKind::Goto {
            condition,
            targets: Vec::new(),
        });
        self.goto_fixups.push((index, label.into()));
        self
    }

    pub fn assume(&mut self, condition: ExprRef) -> &mut Self {
        self.push(InstructionKind::Assume { condition });
        self
    }

    pub fn assert(&mut self, condition: ExprRef, message: impl Into<String>) -> &mut Self {
        self.push(InstructionKind::Assert {
            condition,
            message: message.into(),
        });
        self
    }

    pub fn atomic_begin(&mut self) -> &mut Self {
        self.push(InstructionKind::AtomicBegin);
        self
    }

    pub fn atomic_end(&mut self) -> &mut Self {
        self.push(InstructionKind::AtomicEnd);
        self
    }

    pub fn throw(&mut self, exception: impl Into<Name>, value: Option<ExprRef>) -> &mut Self {
        self.push(InstructionKind::Throw {
            exception: exception.into(),
            value,
        });
        self
    }

    /// Install handlers given as (exception tag, label) pairs.
    pub fn catch(&mut self, handlers: Vec<(Name, Name)>) -> &mut Self {
        let index = self.push(InstructionKind::Catch {
            handlers: Vec::new(),
        });
        self.catch_fixups.push((index, handlers));
        self
    }

    pub fn output(&mut self, arguments: Vec<ExprRef>) -> &mut Self {
        self.push(InstructionKind::Output { arguments });
        self
    }

    /// Resolve labels, number instructions and assign loop ids.
    pub fn finish(mut self) -> BuildResult<GotoFunction> {
        // Terminate the body so the engine always reaches an explicit end.
        if !matches!(
            self.body.last(),
            Some((InstructionKind::EndFunction, _))
        ) {
            self.push(InstructionKind::EndFunction);
        }

        let mut label_map: ahash::AHashMap<Name, usize> = ahash::AHashMap::new();
        for (label, index) in &self.labels {
            if label_map.insert(label.clone(), *index).is_some() {
                return Err(BuildError::DuplicateLabel {
                    function: self.name.clone(),
                    label: label.clone(),
                });
            }
        }

        let resolve = |function: &Name, label: &Name| -> BuildResult<usize> {
            label_map
                .get(label)
                .copied()
                .ok_or_else(|| BuildError::UnknownLabel {
                    function: function.clone(),
                    label: label.clone(),
                })
        };

        for (index, label) in &self.goto_fixups {
            let target = resolve(&self.name, label)?;
            if let (InstructionKind::Goto { targets, .. }, _) = &mut self.body[*index] {
                targets.push(target);
            }
        }
        for (index, handlers) in &self.catch_fixups {
            let mut resolved = Vec::with_capacity(handlers.len());
            for (tag, label) in handlers {
                resolved.push((tag.clone(), resolve(&self.name, label)?));
            }
            if let (InstructionKind::Catch { handlers }, _) = &mut self.body[*index] {
                *handlers = resolved;
            }
        }

        // Number instructions and give each backward branch a loop id.
        let mut loop_counter = 0u32;
        let body = self
            .body
            .into_iter()
            .enumerate()
            .map(|(index, (kind, line))| {
                let is_back_edge = matches!(
                    &kind,
                    InstructionKind::Goto { targets, .. } if targets.iter().any(|t| *t <= index)
                );
                let loop_number = if is_back_edge {
                    loop_counter += 1;
                    Some(loop_counter - 1)
                } else {
                    None
                };
                // Keep branch conditions pre-simplified.
                let kind = match kind {
                    InstructionKind::Goto { condition, targets } => InstructionKind::Goto {
                        condition: simplify(&condition),
                        targets,
                    },
                    other => other,
                };
                Instruction {
                    kind,
                    location: Location::new(self.file.clone(), line, self.name.clone()),
                    location_number: index as u32,
                    loop_number,
                }
            })
            .collect();

        Ok(GotoFunction {
            name: self.name,
            parameters: self.parameters,
            return_type: self.return_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symgo_ir::{BinOp, Type};

    fn i32_ty() -> TypeRef {
        Type::Signed { width: 32 }.rc()
    }

    #[test]
    fn labels_resolve_to_indices() {
        let mut b = FunctionBuilder::new("main", Type::Empty.rc());
        let x = Expr::symbol(Name::new("x"), i32_ty());
        b.decl("x", i32_ty());
        b.assign(x.clone(), Expr::int_const(0, i32_ty()));
        b.label("done");
        b.skip();
        b.goto("done");
        let f = b.finish().unwrap();

        assert_eq!(f.body[3].targets(), &[2]);
        assert!(matches!(f.body.last().unwrap().kind, InstructionKind::EndFunction));
    }

    #[test]
    fn backward_gotos_get_loop_numbers() {
        let mut b = FunctionBuilder::new("main", Type::Empty.rc());
        let x = Expr::symbol(Name::new("x"), i32_ty());
        b.label("head");
        b.assign(x.clone(), Expr::binary(BinOp::Add, x.clone(), Expr::int_const(1, i32_ty())));
        b.goto("head");
        let f = b.finish().unwrap();

        assert_eq!(f.body[1].loop_number, Some(0));
        assert_eq!(f.body[0].loop_number, None);
    }

    #[test]
    fn unknown_label_is_an_error() {
        let mut b = FunctionBuilder::new("main", Type::Empty.rc());
        b.goto("nowhere");
        assert!(matches!(
            b.finish(),
            Err(BuildError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut b = FunctionBuilder::new("main", Type::Empty.rc());
        b.label("l");
        b.skip();
        b.label("l");
        b.skip();
        assert!(matches!(b.finish(), Err(BuildError::DuplicateLabel { .. })));
    }
}
