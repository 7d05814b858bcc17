//! Term graph for the symgo bounded model checker.
//!
//! Types and expressions are immutable, reference-counted nodes with cached
//! structural hashes and copy-on-write handles. The crate also carries the
//! local algebraic simplifier and the shared [`Context`] of canonical terms.

pub mod context;
pub mod expr;
pub mod name;
pub mod simplify;
pub mod types;

pub use context::Context;
pub use expr::{
    BinOp, Expr, ExprKind, ExprRef, OverflowOp, RenameLevel, SideEffectKind, SymbolExpr, UnOp,
    WithKey,
};
pub use name::Name;
pub use simplify::{normalise, simplify};
pub use types::{Member, Type, TypeRef};
