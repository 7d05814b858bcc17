//! Goto-program representation consumed by the symgo engine.

pub mod builder;
pub mod location;
pub mod program;

pub use builder::{BuildError, BuildResult, FunctionBuilder};
pub use location::Location;
pub use program::{
    GotoFunction, GotoProgram, Instruction, InstructionKind, Parameter, SymbolTable,
};
