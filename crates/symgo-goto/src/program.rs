//! Goto-programs: functions as ordered instruction lists.
//!
//! This is the input representation the symbolic executor consumes. Structured
//! control flow has already been lowered by the producer; what remains is a
//! flat list per function with (conditional) gotos referring to instruction
//! indices.

use crate::location::Location;
use std::collections::BTreeMap;
use std::fmt;
use symgo_ir::{ExprRef, Name, Type, TypeRef};

/// The kind (and operands) of one goto instruction.
#[derive(Clone, Debug)]
pub enum InstructionKind {
    Skip,
    /// Introduce a local symbol.
    Decl { symbol: Name, ty: TypeRef },
    Assign { lhs: ExprRef, rhs: ExprRef },
    FunctionCall {
        lhs: Option<ExprRef>,
        function: Name,
        arguments: Vec<ExprRef>,
    },
    Return { value: Option<ExprRef> },
    /// Jump to `targets` when `condition` holds. The engine supports exactly
    /// one target; producers lower switches to if-chains.
    Goto {
        condition: ExprRef,
        targets: Vec<usize>,
    },
    Assume { condition: ExprRef },
    Assert { condition: ExprRef, message: String },
    AtomicBegin,
    AtomicEnd,
    /// Raise an exception tag, optionally carrying a value.
    Throw {
        exception: Name,
        value: Option<ExprRef>,
    },
    /// Install handlers (exception tag → instruction index) for the rest of
    /// the enclosing activation.
    Catch { handlers: Vec<(Name, usize)> },
    /// Observable output (printf-like).
    Output { arguments: Vec<ExprRef> },
    EndFunction,
}

/// One instruction of a goto-program.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub location: Location,
    /// Position used for the forward/backward branch test.
    pub location_number: u32,
    /// Loop id for unwind bookkeeping; set on loop back-edges.
    pub loop_number: Option<u32>,
}

impl Instruction {
    /// Targets of this instruction, if it is a goto.
    pub fn targets(&self) -> &[usize] {
        match &self.kind {
            InstructionKind::Goto { targets, .. } => targets,
            _ => &[],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstructionKind::*;
        match &self.kind {
            Skip => write!(f, "skip"),
            Decl { symbol, ty } => write!(f, "decl {} : {}", symbol, ty),
            Assign { lhs, rhs } => write!(f, "{} := {}", lhs, rhs),
            FunctionCall {
                lhs,
                function,
                arguments,
            } => {
                write!(f, "call ")?;
                if let Some(lhs) = lhs {
                    write!(f, "{} := ", lhs)?;
                }
                write!(f, "{}(", function)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Return { value: Some(value) } => write!(f, "return {}", value),
            Return { value: None } => write!(f, "return"),
            Goto { condition, targets } => {
                write!(f, "goto")?;
                for t in targets {
                    write!(f, " {}", t)?;
                }
                if !condition.is_true() {
                    write!(f, " if {}", condition)?;
                }
                Ok(())
            }
            Assume { condition } => write!(f, "assume {}", condition),
            Assert { condition, message } => {
                write!(f, "assert {}, {:?}", condition, message)
            }
            AtomicBegin => write!(f, "atomic_begin"),
            AtomicEnd => write!(f, "atomic_end"),
            Throw { exception, value } => {
                write!(f, "throw {}", exception)?;
                if let Some(value) = value {
                    write!(f, " {}", value)?;
                }
                Ok(())
            }
            Catch { handlers } => {
                write!(f, "catch")?;
                for (tag, target) in handlers {
                    write!(f, " {} -> {}", tag, target)?;
                }
                Ok(())
            }
            Output { arguments } => {
                write!(f, "output")?;
                for arg in arguments {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            EndFunction => write!(f, "end_function"),
        }
    }
}

/// A named parameter of a goto function.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: Name,
    pub ty: TypeRef,
}

/// One function of a goto-program.
#[derive(Clone, Debug)]
pub struct GotoFunction {
    pub name: Name,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeRef,
    pub body: Vec<Instruction>,
}

impl GotoFunction {
    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.body.get(index)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for GotoFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} : {}", p.name, p.ty)?;
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        for (i, instruction) in self.body.iter().enumerate() {
            writeln!(f, "  {:>3}: {}", i, instruction)?;
        }
        writeln!(f, "}}")
    }
}

/// Identifier → type mapping for the whole program. Consulted when phi
/// functions look up the declared type of a changed identifier, and to
/// resolve symbolic (forward-referenced) types lazily.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    types: ahash::AHashMap<Name, TypeRef>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, name: Name, ty: TypeRef) {
        self.types.insert(name, ty);
    }

    pub fn lookup(&self, name: &Name) -> Option<&TypeRef> {
        self.types.get(name)
    }

    /// Resolve one level of symbolic type indirection.
    pub fn resolve(&self, ty: &TypeRef) -> Option<TypeRef> {
        match &**ty {
            Type::Symbolic { name } => self.lookup(name).cloned(),
            _ => Some(ty.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// A complete goto-program: its functions plus the symbol table.
#[derive(Clone, Debug, Default)]
pub struct GotoProgram {
    pub functions: BTreeMap<Name, GotoFunction>,
    pub symbols: SymbolTable,
}

impl GotoProgram {
    pub fn new() -> Self {
        GotoProgram::default()
    }

    pub fn add_function(&mut self, function: GotoFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &Name) -> Option<&GotoFunction> {
        self.functions.get(name)
    }
}

impl fmt::Display for GotoProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in self.functions.values() {
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
