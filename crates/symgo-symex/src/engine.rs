//! The symbolic execution loop.
//!
//! One path is active at a time; branching clones state into the goto-state
//! queue and merging drains it (see `branch`). The engine talks to the
//! equation sink only through [`SymexTarget`] and reports fatal conditions as
//! [`SymexError`]; everything non-fatal becomes a claim in the stream.

use crate::options::{OptionsError, SymexOptions};
use crate::state::{ExecutionState, Frame, Pc};
use crate::target::{SymexTarget, Visibility};
use symgo_goto::{GotoProgram, Instruction, InstructionKind, Location};
use symgo_ir::{
    simplify, Context, Expr, ExprKind, ExprRef, Name, SideEffectKind, SymbolExpr, Type, TypeRef,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal engine error. Everything here unwinds the run and surfaces to the
/// caller with the offending location.
#[derive(Debug, Error)]
pub enum SymexError {
    #[error("no function body for '{function}' at {location}")]
    MissingFunction { function: Name, location: Location },

    #[error("no support for non-deterministic gotos at {location}")]
    NondeterministicGoto { location: Location },

    #[error("unsupported assignment target at {location}: {lhs}")]
    UnsupportedLhs { lhs: String, location: Location },

    #[error("ill-typed term after renaming at {location}: {message}")]
    IllTyped { message: String, location: Location },

    #[error("unbalanced atomic section at {location}")]
    UnbalancedAtomic { location: Location },

    #[error("symbol '{name}' missing from the symbol table during phi")]
    MissingSymbol { name: Name },

    #[error("program counter escaped function '{function}'")]
    PcOutOfRange { function: Name },

    #[error(transparent)]
    Options(#[from] OptionsError),
}

pub type SymexResult<T> = Result<T, SymexError>;

/// What a finished (or aborted) run did.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Instructions executed across all paths.
    pub steps: u64,
    /// Claims considered (including ones simplified away).
    pub claims: usize,
    /// True when the run was cut short by the abort predicate.
    pub aborted: bool,
}

/// The symbolic executor for one goto-program.
pub struct Engine<'a> {
    pub(crate) program: &'a GotoProgram,
    pub(crate) ctx: &'a Context,
    pub(crate) options: &'a SymexOptions,
    pub(crate) target: &'a mut dyn SymexTarget,
    pub(crate) state: ExecutionState,
    /// Source of fresh L1 activation numbers.
    pub(crate) activation_counter: u32,
    /// Source of fresh nondet/dynamic symbol names.
    pub(crate) nondet_counter: u32,
    /// The reserved identifier for branch guard helpers; phi skips it.
    pub(crate) guard_name: Name,
    /// Types of engine-introduced symbols (return receptacles and the like).
    pub(crate) aux_symbols: ahash::AHashMap<Name, TypeRef>,
    pub(crate) total_claims: usize,
    pub(crate) steps_executed: u64,
    should_abort: Option<Box<dyn Fn() -> bool + 'a>>,
}

impl<'a> Engine<'a> {
    pub fn new(
        program: &'a GotoProgram,
        ctx: &'a Context,
        options: &'a SymexOptions,
        target: &'a mut dyn SymexTarget,
    ) -> Self {
        Engine {
            program,
            ctx,
            options,
            target,
            state: ExecutionState::new(Name::new("<idle>"), 0),
            activation_counter: 0,
            nondet_counter: 0,
            guard_name: Name::new("symex::guard"),
            aux_symbols: ahash::AHashMap::new(),
            total_claims: 0,
            steps_executed: 0,
            should_abort: None,
        }
    }

    /// Install the abort predicate, checked before each instruction.
    pub fn with_abort(mut self, predicate: impl Fn() -> bool + 'a) -> Self {
        self.should_abort = Some(Box::new(predicate));
        self
    }

    /// Symbolically execute the program from `entry` until the entry frame
    /// finishes, the abort predicate fires, or a fatal error surfaces.
    pub fn run(&mut self, entry: &Name) -> SymexResult<RunSummary> {
        self.options.validate()?;

        let program = self.program;
        let entry_fn = program
            .function(entry)
            .ok_or_else(|| SymexError::MissingFunction {
                function: entry.clone(),
                location: Location::builtin(entry.clone()),
            })?;

        self.activation_counter = 1;
        self.state = ExecutionState::new(entry.clone(), 1);
        for p in &entry_fn.parameters {
            // Entry parameters are unconstrained inputs.
            self.state.level1.bind(p.name.clone(), 1);
            self.state.level2.touch(p.name.clone(), 1);
        }
        self.bind_return_symbol(entry, 1, &entry_fn.return_type);

        info!(entry = %entry, "starting symbolic execution");

        loop {
            if let Some(abort) = &self.should_abort {
                if abort() {
                    warn!("abort requested, tearing down in-flight states");
                    return Ok(self.summary(true));
                }
            }

            self.merge_gotos()?;

            let function = program.function(&self.state.pc.function).ok_or_else(|| {
                SymexError::MissingFunction {
                    function: self.state.pc.function.clone(),
                    location: Location::builtin(self.state.pc.function.clone()),
                }
            })?;
            let Some(instruction) = function.instruction(self.state.pc.index) else {
                return Err(SymexError::PcOutOfRange {
                    function: self.state.pc.function.clone(),
                });
            };

            self.state.depth += 1;
            self.steps_executed += 1;

            match &instruction.kind {
                InstructionKind::Skip => {
                    self.state.pc.index += 1;
                }
                InstructionKind::Decl { symbol, ty } => {
                    let activation = self.state.top().activation;
                    self.state.level1.bind(symbol.clone(), activation);
                    self.state.level2.touch(symbol.clone(), activation);
                    let _ = ty;
                    self.state.pc.index += 1;
                }
                InstructionKind::Assign { lhs, rhs } => {
                    self.symex_assign(lhs, rhs.clone(), &instruction.location)?;
                    self.state.pc.index += 1;
                }
                InstructionKind::FunctionCall {
                    lhs,
                    function,
                    arguments,
                } => {
                    self.symex_function_call(lhs.clone(), function, arguments, instruction)?;
                }
                InstructionKind::Return { value } => {
                    self.symex_return(value.clone(), instruction)?;
                }
                InstructionKind::Goto { condition, targets } => {
                    self.symex_goto(condition, targets, instruction)?;
                }
                InstructionKind::Assume { condition } => {
                    self.symex_assume(condition, instruction)?;
                    self.state.pc.index += 1;
                }
                InstructionKind::Assert { condition, message } => {
                    self.claim(condition.clone(), message, &instruction.location)?;
                    self.state.pc.index += 1;
                }
                InstructionKind::AtomicBegin => {
                    self.state.atomic_depth += 1;
                    self.target.atomic_begin(instruction.location.clone());
                    self.state.pc.index += 1;
                }
                InstructionKind::AtomicEnd => {
                    if self.state.atomic_depth == 0 {
                        return Err(SymexError::UnbalancedAtomic {
                            location: instruction.location.clone(),
                        });
                    }
                    self.state.atomic_depth -= 1;
                    self.target.atomic_end(instruction.location.clone());
                    self.state.pc.index += 1;
                }
                InstructionKind::Throw { exception, value } => {
                    self.symex_throw(exception, value.clone(), instruction)?;
                }
                InstructionKind::Catch { handlers } => {
                    self.state.top_mut().catch_stack.push(handlers.clone());
                    self.state.pc.index += 1;
                }
                InstructionKind::Output { arguments } => {
                    self.symex_output(arguments, instruction)?;
                    self.state.pc.index += 1;
                }
                InstructionKind::EndFunction => {
                    if self.state.call_stack.len() == 1 {
                        break;
                    }
                    self.symex_end_of_function(instruction)?;
                }
            }
        }

        info!(
            steps = self.steps_executed,
            claims = self.total_claims,
            "symbolic execution finished"
        );
        Ok(self.summary(false))
    }

    fn summary(&self, aborted: bool) -> RunSummary {
        RunSummary {
            steps: self.steps_executed,
            claims: self.total_claims,
            aborted,
        }
    }

    pub(crate) fn current_location(&self) -> Location {
        self.program
            .function(&self.state.pc.function)
            .and_then(|f| f.instruction(self.state.pc.index))
            .map(|i| i.location.clone())
            .unwrap_or_else(|| Location::builtin(self.state.pc.function.clone()))
    }

    /// Type of an identifier: the program's symbol table first, then the
    /// engine's auxiliary symbols. Symbolic forward references resolve
    /// through the table.
    pub(crate) fn lookup_symbol_type(&self, name: &Name) -> Option<TypeRef> {
        self.program
            .symbols
            .lookup(name)
            .cloned()
            .or_else(|| self.aux_symbols.get(name).cloned())
            .and_then(|ty| self.program.symbols.resolve(&ty))
    }

    // === Expression preparation ===

    /// Resolve side effects and dereferences, then rename to L2 and simplify.
    pub(crate) fn prepare(&mut self, e: &ExprRef) -> SymexResult<ExprRef> {
        let e = self.replace_side_effects(e);
        let e = self.expand_deref_reads(&e)?;
        Ok(simplify(&self.state.rename(&e)))
    }

    /// Replace nondet and allocation side effects with fresh symbols.
    fn replace_side_effects(&mut self, e: &ExprRef) -> ExprRef {
        if let ExprKind::SideEffect { kind, .. } = &e.kind {
            let prefix = match kind {
                SideEffectKind::Nondet => "symex::nondet",
                SideEffectKind::Heap
                | SideEffectKind::Stack
                | SideEffectKind::New
                | SideEffectKind::NewArray => "symex::dynamic",
                // Calls in expression position are lowered by the producer.
                SideEffectKind::Call => return e.clone(),
            };
            let name = Name::new(&format!("{}${}", prefix, self.nondet_counter));
            self.nondet_counter += 1;
            self.aux_symbols.insert(name.clone(), e.ty.clone());
            return Expr::symbol(name, e.ty.clone());
        }
        e.map_operands(&mut |c| self.replace_side_effects(c))
    }

    // === Claims, assumptions, output ===

    /// Record a claim. Renames and simplifies the condition; trivially true
    /// claims and claims on dead paths are not recorded. Never mutates the
    /// state guard.
    pub(crate) fn claim(
        &mut self,
        cond: ExprRef,
        message: &str,
        location: &Location,
    ) -> SymexResult<()> {
        self.total_claims += 1;
        let cond = self.prepare(&cond)?;
        if cond.is_true() || self.state.guard.is_false() {
            return Ok(());
        }
        debug!(claim = %cond, message, "recording claim");
        let guarded = self.state.guard.guard_expr(cond);
        self.target.assertion(
            self.state.guard.as_expr(),
            guarded,
            message.to_string(),
            location.clone(),
            self.state.stack_trace(),
        );
        Ok(())
    }

    fn symex_assume(&mut self, condition: &ExprRef, instruction: &Instruction) -> SymexResult<()> {
        let cond = self.prepare(condition)?;
        if self.state.guard.is_false() {
            return Ok(());
        }
        if cond.is_false() {
            debug!(location = %instruction.location, "assumption is false, path dies");
            self.state.guard.make_false();
            return Ok(());
        }
        if cond.is_true() {
            return Ok(());
        }
        self.target
            .assumption(self.state.guard.as_expr(), cond, instruction.location.clone());
        Ok(())
    }

    fn symex_output(&mut self, arguments: &[ExprRef], instruction: &Instruction) -> SymexResult<()> {
        if self.state.guard.is_false() {
            return Ok(());
        }
        let mut prepared = Vec::with_capacity(arguments.len());
        for arg in arguments {
            prepared.push(self.prepare(arg)?);
        }
        self.target.output(
            self.state.guard.as_expr(),
            prepared,
            instruction.location.clone(),
        );
        Ok(())
    }

    // === Assignment ===

    /// Execute `lhs := rhs`. Composite left-hand sides are rewritten into a
    /// functional update of their root variable, so every store yields one
    /// SSA successor of the root.
    pub(crate) fn symex_assign(
        &mut self,
        lhs: &ExprRef,
        rhs: ExprRef,
        location: &Location,
    ) -> SymexResult<()> {
        let (root, full_rhs) = self.flatten_lhs(lhs, rhs, location)?;
        match &root.kind {
            ExprKind::Symbol(_) => {
                self.assign_symbol(&root, full_rhs, Visibility::Visible, location, true)?;
                Ok(())
            }
            ExprKind::Dereference(pointer) => {
                let pointer = pointer.clone();
                self.symex_deref_write(&pointer, full_rhs, location)
            }
            _ => Err(SymexError::UnsupportedLhs {
                lhs: root.to_string(),
                location: location.clone(),
            }),
        }
    }

    /// Rewrite a composite left-hand side to its root, folding the access
    /// path into the right-hand side.
    fn flatten_lhs(
        &self,
        lhs: &ExprRef,
        rhs: ExprRef,
        location: &Location,
    ) -> SymexResult<(ExprRef, ExprRef)> {
        match &lhs.kind {
            ExprKind::Symbol(_) | ExprKind::Dereference(_) => Ok((lhs.clone(), rhs)),
            ExprKind::Typecast(inner) => {
                let rhs = Expr::typecast(rhs, inner.ty.clone());
                self.flatten_lhs(inner, rhs, location)
            }
            ExprKind::Index { base, index } => {
                let rhs = Expr::with(
                    base.clone(),
                    symgo_ir::WithKey::Index(index.clone()),
                    rhs,
                );
                self.flatten_lhs(base, rhs, location)
            }
            ExprKind::Member { base, member } => {
                let rhs = Expr::with(
                    base.clone(),
                    symgo_ir::WithKey::Member(member.clone()),
                    rhs,
                );
                self.flatten_lhs(base, rhs, location)
            }
            ExprKind::ByteExtract {
                value,
                offset,
                big_endian,
            } => {
                let rhs = Expr::new(
                    value.ty.clone(),
                    ExprKind::ByteUpdate {
                        value: value.clone(),
                        offset: offset.clone(),
                        update: rhs,
                        big_endian: *big_endian,
                    },
                );
                self.flatten_lhs(value, rhs, location)
            }
            _ => Err(SymexError::UnsupportedLhs {
                lhs: lhs.to_string(),
                location: location.clone(),
            }),
        }
    }

    /// Low-level assignment to a symbol: prepare the right-hand side, bump the
    /// SSA number and append to the sink. Returns the new L2 left-hand side.
    pub(crate) fn assign_symbol(
        &mut self,
        lhs: &ExprRef,
        rhs: ExprRef,
        visibility: Visibility,
        location: &Location,
        use_state_guard: bool,
    ) -> SymexResult<ExprRef> {
        let Some(sym) = lhs.as_symbol().cloned() else {
            return Err(SymexError::UnsupportedLhs {
                lhs: lhs.to_string(),
                location: location.clone(),
            });
        };
        let rhs = self.prepare(&rhs)?;
        if rhs.ty != lhs.ty {
            return Err(SymexError::IllTyped {
                message: format!(
                    "assignment of {} value to {} symbol '{}'",
                    rhs.ty, lhs.ty, sym.name
                ),
                location: location.clone(),
            });
        }

        let (name, activation) = self.state.l1_key(&sym);

        if lhs.ty.is_pointer() {
            let objects = self.points_to(&rhs);
            self.state
                .value_set
                .assign((name.clone(), activation), objects);
        }

        let (new_lhs, original) = self.state.rename_write(&name, activation, &lhs.ty);
        let guard = if use_state_guard {
            self.state.guard.as_expr()
        } else {
            self.ctx.true_expr.clone()
        };
        self.target.assignment(
            guard,
            new_lhs.clone(),
            original,
            rhs,
            location.clone(),
            self.state.stack_trace(),
            visibility,
        );
        Ok(new_lhs)
    }

    // === Calls and returns ===

    fn return_symbol_name(function: &Name) -> Name {
        Name::new(&format!("{}::#return_value", function))
    }

    fn bind_return_symbol(&mut self, function: &Name, activation: u32, return_type: &TypeRef) {
        if matches!(&**return_type, Type::Empty) {
            return;
        }
        let name = Self::return_symbol_name(function);
        self.state.level1.bind(name.clone(), activation);
        self.state.level2.touch(name.clone(), activation);
        self.aux_symbols.insert(name, return_type.clone());
    }

    fn symex_function_call(
        &mut self,
        lhs: Option<ExprRef>,
        function: &Name,
        arguments: &[ExprRef],
        instruction: &Instruction,
    ) -> SymexResult<()> {
        let program = self.program;
        let callee = program
            .function(function)
            .ok_or_else(|| SymexError::MissingFunction {
                function: function.clone(),
                location: instruction.location.clone(),
            })?;

        if callee.parameters.len() != arguments.len() {
            return Err(SymexError::IllTyped {
                message: format!(
                    "'{}' called with {} arguments, expects {}",
                    function,
                    arguments.len(),
                    callee.parameters.len()
                ),
                location: instruction.location.clone(),
            });
        }

        // Recursion is bounded like loops: at the limit the receptacle is
        // havocked, the unwinding condition is recorded, and the path dies.
        let recursion_depth = self
            .state
            .call_stack
            .iter()
            .filter(|f| &f.function == function)
            .count() as u32;
        if self.options.max_unwind != 0 && recursion_depth >= self.options.max_unwind {
            info!(function = %function, depth = recursion_depth, "recursion bound reached");
            if let Some(lhs) = &lhs {
                if !matches!(&*callee.return_type, Type::Empty) {
                    let havoc = Expr::nondet(callee.return_type.clone());
                    self.symex_assign(lhs, havoc, &instruction.location)?;
                }
            }
            if self.options.no_unwinding_assertions || self.options.base_case {
                let guarded = self.state.guard.guard_expr(self.ctx.false_expr.clone());
                self.target.assumption(
                    self.state.guard.as_expr(),
                    guarded,
                    instruction.location.clone(),
                );
            } else {
                self.claim(
                    self.ctx.false_expr.clone(),
                    &format!("recursion unwinding assertion {}", function),
                    &instruction.location,
                )?;
            }
            self.state.guard.make_false();
            self.state.pc.index += 1;
            return Ok(());
        }

        // Arguments are renamed in the caller's context, before any binding.
        let mut renamed_args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            renamed_args.push(self.prepare(arg)?);
        }

        self.activation_counter += 1;
        let activation = self.activation_counter;
        debug!(function = %function, activation, "entering function");

        let mut frame = Frame::new(function.clone(), activation, self.state.level1.clone());
        frame.return_pc = Some(Pc::new(
            self.state.pc.function.clone(),
            self.state.pc.index + 1,
        ));
        frame.return_lhs = lhs;
        self.state.call_stack.push(frame);

        for (p, arg) in callee.parameters.iter().zip(renamed_args) {
            self.state.level1.bind(p.name.clone(), activation);
            let param = Expr::symbol(p.name.clone(), p.ty.clone());
            self.assign_symbol(&param, arg, Visibility::Visible, &instruction.location, true)?;
        }
        self.bind_return_symbol(function, activation, &callee.return_type);

        self.state.pc = Pc::new(function.clone(), 0);
        Ok(())
    }

    fn symex_return(
        &mut self,
        value: Option<ExprRef>,
        instruction: &Instruction,
    ) -> SymexResult<()> {
        if let Some(value) = value {
            let function = self.state.pc.function.clone();
            let name = Self::return_symbol_name(&function);
            let Some(ty) = self.aux_symbols.get(&name).cloned() else {
                return Err(SymexError::IllTyped {
                    message: format!("return with a value from void function '{}'", function),
                    location: instruction.location.clone(),
                });
            };
            let receptacle = Expr::symbol(name, ty);
            self.assign_symbol(
                &receptacle,
                value,
                Visibility::Visible,
                &instruction.location,
                true,
            )?;
        }
        // A return behaves like an unconditional goto to the end of the
        // function, so pending merges on the way are still drained.
        self.jump_to_end(instruction)
    }

    pub(crate) fn symex_end_of_function(&mut self, instruction: &Instruction) -> SymexResult<()> {
        let frame = self
            .state
            .call_stack
            .pop()
            .expect("call stack is never empty");
        debug!(function = %frame.function, "leaving function");

        self.state.level1 = frame.saved_level1;
        self.state.pc = frame.return_pc.ok_or_else(|| SymexError::PcOutOfRange {
            function: frame.function.clone(),
        })?;

        if let Some(receptacle) = frame.return_lhs {
            let callee = self
                .program
                .function(&frame.function)
                .expect("frame function exists");
            if matches!(&*callee.return_type, Type::Empty) {
                return Err(SymexError::IllTyped {
                    message: format!(
                        "call result of void function '{}' assigned to {}",
                        frame.function, receptacle
                    ),
                    location: instruction.location.clone(),
                });
            }
            // Read the callee's return receptacle in its (just popped)
            // activation and assign under the caller's guard.
            let value = Expr::new(
                callee.return_type.clone(),
                ExprKind::Symbol(SymbolExpr {
                    name: Self::return_symbol_name(&frame.function),
                    level: symgo_ir::RenameLevel::Level1,
                    l1: frame.activation,
                    l2: 0,
                    thread: 0,
                    node: 0,
                }),
            );
            self.symex_assign(&receptacle, value, &instruction.location)?;
        }
        Ok(())
    }

    // === Exceptions ===

    fn symex_throw(
        &mut self,
        exception: &Name,
        value: Option<ExprRef>,
        instruction: &Instruction,
    ) -> SymexResult<()> {
        if self.state.guard.is_false() {
            self.state.pc.index += 1;
            return Ok(());
        }
        if let Some(value) = value {
            // Record the thrown value; handlers observe it as an ordinary
            // symbol in the SSA stream.
            let carrier = Expr::symbol(Name::new("symex::exception"), value.ty.clone());
            self.aux_symbols
                .insert(Name::new("symex::exception"), value.ty.clone());
            self.assign_symbol(
                &carrier,
                value,
                Visibility::Hidden,
                &instruction.location,
                true,
            )?;
        }

        let handler = self
            .state
            .top()
            .catch_stack
            .iter()
            .rev()
            .find_map(|group| {
                group
                    .iter()
                    .find(|(tag, _)| tag == exception)
                    .map(|(_, target)| *target)
            });

        match handler {
            Some(target) => {
                debug!(exception = %exception, target, "throw dispatches to handler");
                self.jump_to(target, instruction)
            }
            None => {
                self.claim(
                    self.ctx.false_expr.clone(),
                    &format!("unhandled exception {}", exception),
                    &instruction.location,
                )?;
                self.state.guard.make_false();
                self.state.pc.index += 1;
                Ok(())
            }
        }
    }
}
