//! May-points-to abstraction.
//!
//! Maps pointer-valued identifiers (at L1) to sets of abstract objects. The
//! engine consults it when dereferencing and updates it on pointer
//! assignments; at control-flow joins the sets of the merged paths are
//! unioned. Everything else about pointer analysis stays behind this
//! interface.

use std::collections::BTreeSet;
use symgo_ir::{ExprKind, ExprRef, Name, SymbolExpr};

/// An abstract object a pointer may refer to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectDescriptor {
    /// A named program object in a particular activation.
    Object { name: Name, activation: u32 },
    /// A dynamically allocated object.
    Dynamic { id: u32 },
    /// The null object.
    Null,
    /// A provably invalid pointer (e.g. freed).
    Invalid,
    /// No information.
    Unknown,
}

/// The points-to map of one path.
#[derive(Clone, Debug, Default)]
pub struct ValueSet {
    map: ahash::AHashMap<(Name, u32), BTreeSet<ObjectDescriptor>>,
}

impl ValueSet {
    pub fn new() -> Self {
        ValueSet::default()
    }

    /// Strong update: the pointer now refers exactly to `objects`.
    pub fn assign(&mut self, pointer: (Name, u32), objects: BTreeSet<ObjectDescriptor>) {
        self.map.insert(pointer, objects);
    }

    /// Current points-to set of a pointer, if any is known.
    pub fn get(&self, pointer: &(Name, u32)) -> Option<&BTreeSet<ObjectDescriptor>> {
        self.map.get(pointer)
    }

    /// Join with the value set of another path: pointwise union.
    pub fn make_union(&mut self, other: &ValueSet) {
        for (pointer, objects) in &other.map {
            self.map
                .entry(pointer.clone())
                .or_default()
                .extend(objects.iter().cloned());
        }
    }

    /// Derive the points-to set of a pointer-valued expression. `resolve`
    /// maps a symbol occurrence to its (identifier, activation) key.
    pub fn objects_for(
        &self,
        e: &ExprRef,
        resolve: &dyn Fn(&SymbolExpr) -> (Name, u32),
    ) -> BTreeSet<ObjectDescriptor> {
        let mut out = BTreeSet::new();
        self.collect_objects(e, resolve, &mut out);
        out
    }

    fn collect_objects(
        &self,
        e: &ExprRef,
        resolve: &dyn Fn(&SymbolExpr) -> (Name, u32),
        out: &mut BTreeSet<ObjectDescriptor>,
    ) {
        match &e.kind {
            ExprKind::AddressOf(target) => match target.as_symbol() {
                Some(sym) => {
                    let (name, activation) = resolve(sym);
                    out.insert(ObjectDescriptor::Object { name, activation });
                }
                None => {
                    out.insert(ObjectDescriptor::Unknown);
                }
            },
            ExprKind::Symbol(sym) => {
                let key = resolve(sym);
                match self.map.get(&key) {
                    Some(objects) => out.extend(objects.iter().cloned()),
                    None => {
                        out.insert(ObjectDescriptor::Unknown);
                    }
                }
            }
            ExprKind::NullObject => {
                out.insert(ObjectDescriptor::Null);
            }
            ExprKind::IntConst(0) => {
                out.insert(ObjectDescriptor::Null);
            }
            ExprKind::Typecast(value) => self.collect_objects(value, resolve, out),
            ExprKind::If {
                true_value,
                false_value,
                ..
            } => {
                self.collect_objects(true_value, resolve, out);
                self.collect_objects(false_value, resolve, out);
            }
            ExprKind::SideEffect { .. } => {
                out.insert(ObjectDescriptor::Unknown);
            }
            _ => {
                out.insert(ObjectDescriptor::Unknown);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symgo_ir::{Expr, Type};

    fn ptr_i32() -> symgo_ir::TypeRef {
        Type::Pointer {
            pointee: Type::Signed { width: 32 }.rc(),
        }
        .rc()
    }

    fn obj(name: &str) -> ObjectDescriptor {
        ObjectDescriptor::Object {
            name: Name::new(name),
            activation: 1,
        }
    }

    fn resolve(sym: &SymbolExpr) -> (Name, u32) {
        (sym.name.clone(), 1)
    }

    #[test]
    fn address_of_symbol_points_to_object() {
        let vs = ValueSet::new();
        let a = Expr::symbol(Name::new("a"), Type::Signed { width: 32 }.rc());
        let objects = vs.objects_for(&Expr::address_of(a), &resolve);
        assert_eq!(objects.into_iter().collect::<Vec<_>>(), vec![obj("a")]);
    }

    #[test]
    fn pointer_symbol_reads_the_map() {
        let mut vs = ValueSet::new();
        vs.assign((Name::new("p"), 1), BTreeSet::from([obj("a"), obj("b")]));
        let p = Expr::symbol(Name::new("p"), ptr_i32());
        let objects = vs.objects_for(&p, &resolve);
        assert_eq!(objects.len(), 2);
        assert!(objects.contains(&obj("a")));
        assert!(objects.contains(&obj("b")));
    }

    #[test]
    fn unknown_pointer_yields_unknown() {
        let vs = ValueSet::new();
        let p = Expr::symbol(Name::new("p"), ptr_i32());
        let objects = vs.objects_for(&p, &resolve);
        assert!(objects.contains(&ObjectDescriptor::Unknown));
    }

    #[test]
    fn ite_unions_both_arms() {
        let vs = ValueSet::new();
        let a = Expr::symbol(Name::new("a"), Type::Signed { width: 32 }.rc());
        let b = Expr::symbol(Name::new("b"), Type::Signed { width: 32 }.rc());
        let cond = Expr::symbol(Name::new("c"), Type::Bool.rc());
        let e = Expr::ite(cond, Expr::address_of(a), Expr::address_of(b));
        let objects = vs.objects_for(&e, &resolve);
        assert!(objects.contains(&obj("a")));
        assert!(objects.contains(&obj("b")));
    }

    #[test]
    fn union_is_pointwise() {
        let mut vs1 = ValueSet::new();
        vs1.assign((Name::new("p"), 1), BTreeSet::from([obj("a")]));
        let mut vs2 = ValueSet::new();
        vs2.assign((Name::new("p"), 1), BTreeSet::from([obj("b")]));
        vs2.assign((Name::new("q"), 1), BTreeSet::from([ObjectDescriptor::Null]));

        vs1.make_union(&vs2);
        assert_eq!(vs1.get(&(Name::new("p"), 1)).unwrap().len(), 2);
        assert!(vs1
            .get(&(Name::new("q"), 1))
            .unwrap()
            .contains(&ObjectDescriptor::Null));
    }
}
