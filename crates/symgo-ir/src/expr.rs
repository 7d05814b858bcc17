//! Expression terms: the expression half of the term graph.
//!
//! Every expression is an immutable node carrying its type, behind a
//! reference-counted [`ExprRef`] handle. Structural equality, total ordering
//! and hashing walk the child tuple of each tag; the hash is cached per node
//! and dropped on copy-on-write mutation. Generic traversal is provided once
//! ([`Expr::each_operand`], [`ExprRef::map_operands`]) and everything else
//! (renaming, simplification, free-symbol scans) is built on top of it.

use crate::name::Name;
use crate::types::{Type, TypeRef};
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

/// Renaming level of a symbol.
///
/// Which of the numbers in a [`SymbolExpr`] are meaningful depends on the
/// level: L0 carries none, L1 carries the activation number, L2 carries both
/// the activation and the SSA number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenameLevel {
    /// Source-level identifier.
    Level0,
    /// Per-activation renaming applied.
    Level1,
    /// Full SSA renaming applied.
    Level2,
}

/// A (possibly renamed) symbol.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolExpr {
    /// The source identifier.
    pub name: Name,
    /// How far this occurrence has been renamed.
    pub level: RenameLevel,
    /// Activation number (meaningful at L1 and L2).
    pub l1: u32,
    /// SSA number (meaningful at L2 only).
    pub l2: u32,
    /// Owning thread id.
    pub thread: u32,
    /// Per-thread node id.
    pub node: u32,
}

impl SymbolExpr {
    /// A plain source-level symbol.
    pub fn level0(name: Name) -> Self {
        SymbolExpr {
            name,
            level: RenameLevel::Level0,
            l1: 0,
            l2: 0,
            thread: 0,
            node: 0,
        }
    }
}

impl fmt::Display for SymbolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.level >= RenameLevel::Level1 {
            write!(f, "@{}", self.l1)?;
        }
        if self.level == RenameLevel::Level2 {
            write!(f, "#{}", self.l2)?;
        }
        if self.thread != 0 {
            write!(f, "!{}", self.thread)?;
        }
        Ok(())
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnOp {
    /// Boolean negation.
    Not,
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    BitNot,
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    // Shifts
    Shl,
    LShr,
    AShr,
    // Relational (produce bool)
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Boolean connectives (operate on bool)
    And,
    Or,
    Implies,
    Xor,
}

impl BinOp {
    /// Does this operator produce a boolean from non-boolean operands?
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// Is this a boolean connective?
    pub fn is_connective(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Implies | BinOp::Xor)
    }

    /// Surface syntax for diagnostics and printing.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::LShr => ">>>",
            BinOp::AShr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "=>",
            BinOp::Xor => "xor",
        }
    }
}

/// Arithmetic operations covered by the overflow predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverflowOp {
    Add,
    Sub,
    Mul,
}

/// Kinds of side-effect expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SideEffectKind {
    /// Heap allocation.
    Heap,
    /// Stack allocation.
    Stack,
    /// C++ `new`.
    New,
    /// C++ `new[]`.
    NewArray,
    /// Nondeterministic value.
    Nondet,
    /// Function call in expression position.
    Call,
}

/// Update position of a `with` expression: a struct member or an array index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WithKey {
    Member(Name),
    Index(ExprRef),
}

/// The closed enumeration of expression tags.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExprKind {
    // === Constants ===
    /// Integer constant, stored in the value range of the node's type.
    IntConst(i128),
    /// Fixed-point constant as raw scaled bits; scale comes from the type.
    FixedbvConst(i128),
    BoolConst(bool),
    StringConst(Name),
    StructConst(Vec<ExprRef>),
    UnionConst { field: Name, value: ExprRef },
    ArrayConst(Vec<ExprRef>),
    /// Array with every element equal to the operand.
    ArrayOf(ExprRef),

    // === Symbols ===
    Symbol(SymbolExpr),

    // === Operators ===
    Unary { op: UnOp, value: ExprRef },
    Binary { op: BinOp, lhs: ExprRef, rhs: ExprRef },
    /// Conversion to the node's type.
    Typecast(ExprRef),
    If { cond: ExprRef, true_value: ExprRef, false_value: ExprRef },

    // === Pointers ===
    AddressOf(ExprRef),
    PointerOffset(ExprRef),
    PointerObject(ExprRef),
    SameObject { lhs: ExprRef, rhs: ExprRef },
    Dereference(ExprRef),
    DynamicObject { instance: ExprRef },
    InvalidPointer(ExprRef),
    NullObject,

    // === Byte-level access ===
    ByteExtract { value: ExprRef, offset: ExprRef, big_endian: bool },
    ByteUpdate { value: ExprRef, offset: ExprRef, update: ExprRef, big_endian: bool },

    // === Composite access and update ===
    /// Functional update of a struct member or array element.
    With { base: ExprRef, key: WithKey, value: ExprRef },
    Member { base: ExprRef, member: Name },
    Index { base: ExprRef, index: ExprRef },

    // === Predicates ===
    Overflow { op: OverflowOp, lhs: ExprRef, rhs: ExprRef },
    OverflowCast { value: ExprRef, bits: u32 },
    OverflowNeg(ExprRef),
    IsNan(ExprRef),
    IsInf(ExprRef),
    IsNormal(ExprRef),
    Concat { lhs: ExprRef, rhs: ExprRef },

    // === Side effects ===
    SideEffect {
        kind: SideEffectKind,
        size: Option<ExprRef>,
        function: Option<ExprRef>,
        arguments: Vec<ExprRef>,
    },

    // === Statement sub-language (used inside the goto IR) ===
    CodeBlock(Vec<ExprRef>),
    CodeAssign { lhs: ExprRef, rhs: ExprRef },
    CodeInit { lhs: ExprRef, rhs: ExprRef },
    CodeDecl(Name),
    CodePrintf(Vec<ExprRef>),
    CodeReturn(Option<ExprRef>),
    CodeSkip,
    CodeFree(ExprRef),
    CodeGoto(Name),
    CodeFunctionCall {
        lhs: Option<ExprRef>,
        function: ExprRef,
        arguments: Vec<ExprRef>,
    },
    CodeThrowDecl(Vec<Name>),
    CodeCatchDecl(Vec<Name>),
}

/// An expression node: a tag plus the type the expression carries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expr {
    pub ty: TypeRef,
    pub kind: ExprKind,
}

#[derive(Clone, Debug)]
struct ExprCell {
    expr: Expr,
    hash: Cell<u32>,
}

impl ExprCell {
    /// The cached structural hash: tag and child hashes folded with a
    /// non-cryptographic hasher, forced nonzero, computed on first use.
    fn hash32(&self) -> u32 {
        let cached = self.hash.get();
        if cached != 0 {
            return cached;
        }
        let mut hasher = ahash::AHasher::default();
        self.expr.ty.hash(&mut hasher);
        self.expr.kind.hash(&mut hasher);
        let full = hasher.finish();
        let mut h = (full as u32) ^ ((full >> 32) as u32);
        if h == 0 {
            h = 0x9e37_79b9;
        }
        self.hash.set(h);
        h
    }
}

/// Reference-counted handle to an expression term.
#[derive(Clone)]
pub struct ExprRef(Rc<ExprCell>);

impl ExprRef {
    /// Copy-on-write access. Unshares the node if needed and invalidates the
    /// cached hash before handing out the mutable interior.
    pub fn make_mut(&mut self) -> &mut Expr {
        let cell = Rc::make_mut(&mut self.0);
        cell.hash.set(0);
        &mut cell.expr
    }

    /// Do the two handles point at the same node?
    pub fn same(a: &ExprRef, b: &ExprRef) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// The cached structural hash, computing it on first use.
    pub fn structural_hash(&self) -> u32 {
        self.0.hash32()
    }

    /// Rebuild this expression with every direct operand passed through `f`.
    /// Returns the original handle when nothing changed, so unchanged subtrees
    /// stay shared.
    pub fn map_operands(&self, f: &mut dyn FnMut(&ExprRef) -> ExprRef) -> ExprRef {
        use ExprKind::*;

        let mut changed = false;
        let mut app = |e: &ExprRef| -> ExprRef {
            let mapped = f(e);
            if !ExprRef::same(&mapped, e) {
                changed = true;
            }
            mapped
        };

        let kind = match &self.kind {
            IntConst(_) | FixedbvConst(_) | BoolConst(_) | StringConst(_) | Symbol(_)
            | NullObject | CodeDecl(_) | CodeSkip | CodeGoto(_) | CodeThrowDecl(_)
            | CodeCatchDecl(_) | CodeReturn(None) => return self.clone(),

            StructConst(fields) => StructConst(fields.iter().map(&mut app).collect()),
            UnionConst { field, value } => UnionConst {
                field: field.clone(),
                value: app(value),
            },
            ArrayConst(elements) => ArrayConst(elements.iter().map(&mut app).collect()),
            ArrayOf(value) => ArrayOf(app(value)),
            Unary { op, value } => Unary {
                op: *op,
                value: app(value),
            },
            Binary { op, lhs, rhs } => Binary {
                op: *op,
                lhs: app(lhs),
                rhs: app(rhs),
            },
            Typecast(value) => Typecast(app(value)),
            If {
                cond,
                true_value,
                false_value,
            } => If {
                cond: app(cond),
                true_value: app(true_value),
                false_value: app(false_value),
            },
            AddressOf(value) => AddressOf(app(value)),
            PointerOffset(value) => PointerOffset(app(value)),
            PointerObject(value) => PointerObject(app(value)),
            SameObject { lhs, rhs } => SameObject {
                lhs: app(lhs),
                rhs: app(rhs),
            },
            Dereference(value) => Dereference(app(value)),
            DynamicObject { instance } => DynamicObject {
                instance: app(instance),
            },
            InvalidPointer(value) => InvalidPointer(app(value)),
            ByteExtract {
                value,
                offset,
                big_endian,
            } => ByteExtract {
                value: app(value),
                offset: app(offset),
                big_endian: *big_endian,
            },
            ByteUpdate {
                value,
                offset,
                update,
                big_endian,
            } => ByteUpdate {
                value: app(value),
                offset: app(offset),
                update: app(update),
                big_endian: *big_endian,
            },
            With { base, key, value } => With {
                base: app(base),
                key: match key {
                    WithKey::Member(name) => WithKey::Member(name.clone()),
                    WithKey::Index(index) => WithKey::Index(app(index)),
                },
                value: app(value),
            },
            Member { base, member } => Member {
                base: app(base),
                member: member.clone(),
            },
            Index { base, index } => Index {
                base: app(base),
                index: app(index),
            },
            Overflow { op, lhs, rhs } => Overflow {
                op: *op,
                lhs: app(lhs),
                rhs: app(rhs),
            },
            OverflowCast { value, bits } => OverflowCast {
                value: app(value),
                bits: *bits,
            },
            OverflowNeg(value) => OverflowNeg(app(value)),
            IsNan(value) => IsNan(app(value)),
            IsInf(value) => IsInf(app(value)),
            IsNormal(value) => IsNormal(app(value)),
            Concat { lhs, rhs } => Concat {
                lhs: app(lhs),
                rhs: app(rhs),
            },
            SideEffect {
                kind,
                size,
                function,
                arguments,
            } => SideEffect {
                kind: *kind,
                size: size.as_ref().map(&mut app),
                function: function.as_ref().map(&mut app),
                arguments: arguments.iter().map(&mut app).collect(),
            },
            CodeBlock(stmts) => CodeBlock(stmts.iter().map(&mut app).collect()),
            CodeAssign { lhs, rhs } => CodeAssign {
                lhs: app(lhs),
                rhs: app(rhs),
            },
            CodeInit { lhs, rhs } => CodeInit {
                lhs: app(lhs),
                rhs: app(rhs),
            },
            CodePrintf(args) => CodePrintf(args.iter().map(&mut app).collect()),
            CodeReturn(Some(value)) => CodeReturn(Some(app(value))),
            CodeFree(value) => CodeFree(app(value)),
            CodeFunctionCall {
                lhs,
                function,
                arguments,
            } => CodeFunctionCall {
                lhs: lhs.as_ref().map(&mut app),
                function: app(function),
                arguments: arguments.iter().map(&mut app).collect(),
            },
        };

        if changed {
            Expr::new(self.ty.clone(), kind)
        } else {
            self.clone()
        }
    }
}

impl Deref for ExprRef {
    type Target = Expr;

    fn deref(&self) -> &Expr {
        &self.0.expr
    }
}

impl PartialEq for ExprRef {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        let (h1, h2) = (self.0.hash.get(), other.0.hash.get());
        if h1 != 0 && h2 != 0 && h1 != h2 {
            return false;
        }
        self.0.expr == other.0.expr
    }
}

impl Eq for ExprRef {}

impl PartialOrd for ExprRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExprRef {
    fn cmp(&self, other: &Self) -> Ordering {
        if Rc::ptr_eq(&self.0, &other.0) {
            return Ordering::Equal;
        }
        self.0.expr.cmp(&other.0.expr)
    }
}

impl Hash for ExprRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.0.hash32());
    }
}

impl fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0.expr, f)
    }
}

impl Expr {
    /// Wrap a node in a fresh handle.
    pub fn new(ty: TypeRef, kind: ExprKind) -> ExprRef {
        ExprRef(Rc::new(ExprCell {
            expr: Expr { ty, kind },
            hash: Cell::new(0),
        }))
    }

    // === Constructors ===

    pub fn int_const(value: i128, ty: TypeRef) -> ExprRef {
        Expr::new(ty, ExprKind::IntConst(value))
    }

    pub fn fixedbv_const(raw: i128, ty: TypeRef) -> ExprRef {
        Expr::new(ty, ExprKind::FixedbvConst(raw))
    }

    pub fn bool_const(value: bool) -> ExprRef {
        Expr::new(Type::Bool.rc(), ExprKind::BoolConst(value))
    }

    /// A source-level (L0) symbol.
    pub fn symbol(name: Name, ty: TypeRef) -> ExprRef {
        Expr::new(ty, ExprKind::Symbol(SymbolExpr::level0(name)))
    }

    pub fn unary(op: UnOp, value: ExprRef) -> ExprRef {
        let ty = value.ty.clone();
        Expr::new(ty, ExprKind::Unary { op, value })
    }

    pub fn not(value: ExprRef) -> ExprRef {
        debug_assert!(value.ty.is_bool(), "negation of a non-boolean term");
        Expr::unary(UnOp::Not, value)
    }

    pub fn neg(value: ExprRef) -> ExprRef {
        Expr::unary(UnOp::Neg, value)
    }

    /// Binary operation. Relational operators and connectives produce bool;
    /// everything else carries the left operand's type.
    pub fn binary(op: BinOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        let ty = if op.is_relational() || op.is_connective() {
            Type::Bool.rc()
        } else {
            debug_assert!(
                lhs.ty == rhs.ty,
                "operand type mismatch for {}: {} vs {}",
                op.symbol(),
                lhs.ty,
                rhs.ty
            );
            lhs.ty.clone()
        };
        Expr::new(ty, ExprKind::Binary { op, lhs, rhs })
    }

    pub fn and(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Expr::binary(BinOp::And, lhs, rhs)
    }

    pub fn or(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Expr::binary(BinOp::Or, lhs, rhs)
    }

    pub fn implies(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Expr::binary(BinOp::Implies, lhs, rhs)
    }

    pub fn eq(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Expr::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn typecast(value: ExprRef, ty: TypeRef) -> ExprRef {
        Expr::new(ty, ExprKind::Typecast(value))
    }

    pub fn ite(cond: ExprRef, true_value: ExprRef, false_value: ExprRef) -> ExprRef {
        debug_assert!(cond.ty.is_bool(), "if-then-else condition must be boolean");
        let ty = true_value.ty.clone();
        Expr::new(
            ty,
            ExprKind::If {
                cond,
                true_value,
                false_value,
            },
        )
    }

    pub fn address_of(value: ExprRef) -> ExprRef {
        let ty = Type::Pointer {
            pointee: value.ty.clone(),
        }
        .rc();
        Expr::new(ty, ExprKind::AddressOf(value))
    }

    /// Dereference a pointer; the result carries the pointee type.
    pub fn dereference(value: ExprRef) -> ExprRef {
        let ty = match &*value.ty {
            Type::Pointer { pointee } => pointee.clone(),
            other => panic!("dereference of non-pointer type {:?}", other),
        };
        Expr::new(ty, ExprKind::Dereference(value))
    }

    pub fn member(base: ExprRef, member: Name, ty: TypeRef) -> ExprRef {
        Expr::new(ty, ExprKind::Member { base, member })
    }

    pub fn index(base: ExprRef, index: ExprRef) -> ExprRef {
        let ty = match &*base.ty {
            Type::Array { element, .. } => element.clone(),
            other => panic!("index into non-array type {:?}", other),
        };
        Expr::new(ty, ExprKind::Index { base, index })
    }

    /// Functional update: the result has the base's type.
    pub fn with(base: ExprRef, key: WithKey, value: ExprRef) -> ExprRef {
        let ty = base.ty.clone();
        Expr::new(ty, ExprKind::With { base, key, value })
    }

    /// Nondeterministic value of the given type.
    pub fn nondet(ty: TypeRef) -> ExprRef {
        Expr::new(
            ty,
            ExprKind::SideEffect {
                kind: SideEffectKind::Nondet,
                size: None,
                function: None,
                arguments: Vec::new(),
            },
        )
    }

    // === Queries ===

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::BoolConst(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind, ExprKind::BoolConst(false))
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::IntConst(_)
                | ExprKind::FixedbvConst(_)
                | ExprKind::BoolConst(_)
                | ExprKind::StringConst(_)
        )
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.kind, ExprKind::Symbol(_))
    }

    pub fn as_symbol(&self) -> Option<&SymbolExpr> {
        match &self.kind {
            ExprKind::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    pub fn as_int_const(&self) -> Option<i128> {
        match self.kind {
            ExprKind::IntConst(v) => Some(v),
            _ => None,
        }
    }

    /// Visit every direct operand of this node.
    pub fn each_operand(&self, f: &mut dyn FnMut(&ExprRef)) {
        use ExprKind::*;
        match &self.kind {
            IntConst(_) | FixedbvConst(_) | BoolConst(_) | StringConst(_) | Symbol(_)
            | NullObject | CodeDecl(_) | CodeSkip | CodeGoto(_) | CodeThrowDecl(_)
            | CodeCatchDecl(_) => {}
            StructConst(fields) => fields.iter().for_each(|e| f(e)),
            UnionConst { value, .. } => f(value),
            ArrayConst(elements) => elements.iter().for_each(|e| f(e)),
            ArrayOf(value) => f(value),
            Unary { value, .. } => f(value),
            Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Typecast(value) => f(value),
            If {
                cond,
                true_value,
                false_value,
            } => {
                f(cond);
                f(true_value);
                f(false_value);
            }
            AddressOf(value)
            | PointerOffset(value)
            | PointerObject(value)
            | Dereference(value)
            | InvalidPointer(value) => f(value),
            SameObject { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            DynamicObject { instance } => f(instance),
            ByteExtract { value, offset, .. } => {
                f(value);
                f(offset);
            }
            ByteUpdate {
                value,
                offset,
                update,
                ..
            } => {
                f(value);
                f(offset);
                f(update);
            }
            With { base, key, value } => {
                f(base);
                if let WithKey::Index(index) = key {
                    f(index);
                }
                f(value);
            }
            Member { base, .. } => f(base),
            Index { base, index } => {
                f(base);
                f(index);
            }
            Overflow { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            OverflowCast { value, .. } => f(value),
            OverflowNeg(value) | IsNan(value) | IsInf(value) | IsNormal(value) => f(value),
            Concat { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            SideEffect {
                size,
                function,
                arguments,
                ..
            } => {
                if let Some(size) = size {
                    f(size);
                }
                if let Some(function) = function {
                    f(function);
                }
                arguments.iter().for_each(|e| f(e));
            }
            CodeBlock(stmts) => stmts.iter().for_each(|e| f(e)),
            CodeAssign { lhs, rhs } | CodeInit { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            CodePrintf(args) => args.iter().for_each(|e| f(e)),
            CodeReturn(value) => {
                if let Some(value) = value {
                    f(value);
                }
            }
            CodeFree(value) => f(value),
            CodeFunctionCall {
                lhs,
                function,
                arguments,
            } => {
                if let Some(lhs) = lhs {
                    f(lhs);
                }
                f(function);
                arguments.iter().for_each(|e| f(e));
            }
        }
    }

    /// Visit every symbol in this expression tree.
    pub fn each_symbol(&self, f: &mut dyn FnMut(&SymbolExpr)) {
        if let ExprKind::Symbol(sym) = &self.kind {
            f(sym);
        }
        self.each_operand(&mut |operand| operand.each_symbol(&mut *f));
    }
}

impl fmt::Display for ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExprKind::*;
        match &self.kind {
            IntConst(v) => write!(f, "{}", v),
            FixedbvConst(raw) => match self.ty.fraction_bits() {
                Some(frac) if frac > 0 => {
                    let scale = (1i128 << frac) as f64;
                    write!(f, "{}", (*raw as f64) / scale)
                }
                _ => write!(f, "{}", raw),
            },
            BoolConst(b) => write!(f, "{}", b),
            StringConst(s) => write!(f, "{:?}", s.as_str()),
            StructConst(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
            UnionConst { field, value } => write!(f, "{{.{} = {}}}", field, value),
            ArrayConst(elements) => {
                write!(f, "[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            ArrayOf(value) => write!(f, "array_of({})", value),
            Symbol(sym) => write!(f, "{}", sym),
            Unary { op, value } => {
                let sigil = match op {
                    UnOp::Not => "!",
                    UnOp::Neg => "-",
                    UnOp::BitNot => "~",
                };
                write!(f, "{}{}", sigil, paren(value))
            }
            Binary { op, lhs, rhs } => {
                write!(f, "{} {} {}", paren(lhs), op.symbol(), paren(rhs))
            }
            Typecast(value) => write!(f, "({} as {})", value, self.ty),
            If {
                cond,
                true_value,
                false_value,
            } => write!(f, "({} ? {} : {})", cond, true_value, false_value),
            AddressOf(value) => write!(f, "&{}", paren(value)),
            PointerOffset(value) => write!(f, "pointer_offset({})", value),
            PointerObject(value) => write!(f, "pointer_object({})", value),
            SameObject { lhs, rhs } => write!(f, "same_object({}, {})", lhs, rhs),
            Dereference(value) => write!(f, "*{}", paren(value)),
            DynamicObject { instance } => write!(f, "dynamic_object({})", instance),
            InvalidPointer(value) => write!(f, "invalid_pointer({})", value),
            NullObject => write!(f, "null_object"),
            ByteExtract { value, offset, .. } => {
                write!(f, "byte_extract({}, {})", value, offset)
            }
            ByteUpdate {
                value,
                offset,
                update,
                ..
            } => write!(f, "byte_update({}, {}, {})", value, offset, update),
            With { base, key, value } => match key {
                WithKey::Member(name) => write!(f, "({} with .{} := {})", base, name, value),
                WithKey::Index(index) => write!(f, "({} with [{}] := {})", base, index, value),
            },
            Member { base, member } => write!(f, "{}.{}", paren(base), member),
            Index { base, index } => write!(f, "{}[{}]", paren(base), index),
            Overflow { op, lhs, rhs } => {
                let name = match op {
                    OverflowOp::Add => "add",
                    OverflowOp::Sub => "sub",
                    OverflowOp::Mul => "mul",
                };
                write!(f, "overflow_{}({}, {})", name, lhs, rhs)
            }
            OverflowCast { value, bits } => write!(f, "overflow_cast({}, {})", value, bits),
            OverflowNeg(value) => write!(f, "overflow_neg({})", value),
            IsNan(value) => write!(f, "isnan({})", value),
            IsInf(value) => write!(f, "isinf({})", value),
            IsNormal(value) => write!(f, "isnormal({})", value),
            Concat { lhs, rhs } => write!(f, "concat({}, {})", lhs, rhs),
            SideEffect { kind, .. } => match kind {
                SideEffectKind::Nondet => write!(f, "nondet({})", self.ty),
                SideEffectKind::Heap => write!(f, "heap_alloc({})", self.ty),
                SideEffectKind::Stack => write!(f, "stack_alloc({})", self.ty),
                SideEffectKind::New => write!(f, "new({})", self.ty),
                SideEffectKind::NewArray => write!(f, "new[]({})", self.ty),
                SideEffectKind::Call => write!(f, "call_effect"),
            },
            CodeBlock(_) => write!(f, "<block>"),
            CodeAssign { lhs, rhs } => write!(f, "{} := {}", lhs, rhs),
            CodeInit { lhs, rhs } => write!(f, "{} := init {}", lhs, rhs),
            CodeDecl(name) => write!(f, "decl {}", name),
            CodePrintf(_) => write!(f, "<printf>"),
            CodeReturn(Some(value)) => write!(f, "return {}", value),
            CodeReturn(None) => write!(f, "return"),
            CodeSkip => write!(f, "skip"),
            CodeFree(value) => write!(f, "free({})", value),
            CodeGoto(label) => write!(f, "goto {}", label),
            CodeFunctionCall { function, .. } => write!(f, "call {}", function),
            CodeThrowDecl(_) => write!(f, "<throw-decl>"),
            CodeCatchDecl(_) => write!(f, "<catch-decl>"),
        }
    }
}

/// Wrap compound operands in parentheses so printed terms re-parse sanely.
fn paren(e: &ExprRef) -> String {
    match &e.kind {
        ExprKind::Binary { .. } | ExprKind::With { .. } => format!("({})", e),
        _ => format!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_ty() -> TypeRef {
        Type::Signed { width: 32 }.rc()
    }

    #[test]
    fn structural_equality_ignores_sharing() {
        let a = Expr::binary(
            BinOp::Add,
            Expr::int_const(1, i32_ty()),
            Expr::int_const(2, i32_ty()),
        );
        let b = Expr::binary(
            BinOp::Add,
            Expr::int_const(1, i32_ty()),
            Expr::int_const(2, i32_ty()),
        );
        assert!(!ExprRef::same(&a, &b));
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn relational_operators_produce_bool() {
        let e = Expr::binary(
            BinOp::Lt,
            Expr::int_const(1, i32_ty()),
            Expr::int_const(2, i32_ty()),
        );
        assert!(e.ty.is_bool());
    }

    #[test]
    fn make_mut_invalidates_hash_and_unshares() {
        let a = Expr::int_const(7, i32_ty());
        let mut b = a.clone();
        assert!(ExprRef::same(&a, &b));
        let before = b.structural_hash();

        if let ExprKind::IntConst(v) = &mut b.make_mut().kind {
            *v = 8;
        }
        assert!(!ExprRef::same(&a, &b));
        assert_ne!(a, b);
        assert_ne!(b.structural_hash(), before);
        assert_eq!(a.as_int_const(), Some(7));
    }

    #[test]
    fn map_operands_preserves_unchanged_handles() {
        let x = Expr::symbol(Name::new("x"), i32_ty());
        let e = Expr::binary(BinOp::Add, x.clone(), Expr::int_const(0, i32_ty()));
        let same = e.map_operands(&mut |c| c.clone());
        assert!(ExprRef::same(&e, &same));

        let swapped = e.map_operands(&mut |c| {
            if c.as_int_const() == Some(0) {
                Expr::int_const(1, i32_ty())
            } else {
                c.clone()
            }
        });
        assert!(!ExprRef::same(&e, &swapped));
        assert_ne!(e, swapped);
    }

    #[test]
    fn each_symbol_finds_nested_symbols() {
        let x = Expr::symbol(Name::new("x"), i32_ty());
        let y = Expr::symbol(Name::new("y"), i32_ty());
        let e = Expr::binary(BinOp::Add, x, Expr::binary(BinOp::Mul, y, Expr::int_const(2, i32_ty())));

        let mut seen = Vec::new();
        e.each_symbol(&mut |sym| seen.push(sym.name.clone()));
        assert_eq!(seen, vec![Name::new("x"), Name::new("y")]);
    }

    #[test]
    fn symbol_display_tracks_levels() {
        let mut sym = SymbolExpr::level0(Name::new("x"));
        assert_eq!(sym.to_string(), "x");
        sym.level = RenameLevel::Level1;
        sym.l1 = 2;
        assert_eq!(sym.to_string(), "x@2");
        sym.level = RenameLevel::Level2;
        sym.l2 = 5;
        assert_eq!(sym.to_string(), "x@2#5");
    }

    #[test]
    fn ordering_is_total_and_consistent() {
        let a = Expr::int_const(1, i32_ty());
        let b = Expr::int_const(2, i32_ty());
        let c = Expr::bool_const(true);
        let mut v = vec![b.clone(), c.clone(), a.clone()];
        v.sort();
        // Sorting is deterministic and equal elements compare equal.
        assert_eq!(v.iter().filter(|e| **e == a).count(), 1);
        assert!(v.windows(2).all(|w| w[0] <= w[1]));
    }
}
