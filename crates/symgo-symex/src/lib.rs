//! Symbolic execution core for the symgo bounded model checker.
//!
//! The engine walks a goto-program, maintains per-path symbolic state with
//! SSA renaming, forks and merges paths at control-flow joins, bounds loops,
//! and emits an equation stream of assignments, assumptions and assertions
//! to a downstream sink.

mod branch;
mod deref;
pub mod engine;
pub mod guard;
pub mod options;
pub mod renaming;
pub mod state;
pub mod target;
pub mod value_set;

pub use engine::{Engine, RunSummary, SymexError, SymexResult};
pub use guard::Guard;
pub use options::{OptionsError, SymexOptions};
pub use renaming::{Level1, Level2};
pub use state::{ExecutionState, Frame, GotoState, Pc};
pub use target::{Equation, EquationConfig, Step, SymexTarget, Visibility};
pub use value_set::{ObjectDescriptor, ValueSet};
