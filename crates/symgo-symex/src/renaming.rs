//! The two renaming maps behind SSA construction.
//!
//! L1 maps an identifier to the activation number of the frame that owns it;
//! L2 maps an (identifier, activation) pair to its current SSA number. A
//! symbol's L1 number always equals the activation number of some frame on
//! the call stack, and its L2 number is the most recent assigned in that
//! activation.

use std::collections::BTreeMap;
use symgo_ir::Name;

/// Activation-level renaming: identifier → activation number.
#[derive(Clone, Debug, Default)]
pub struct Level1 {
    map: ahash::AHashMap<Name, u32>,
}

impl Level1 {
    pub fn new() -> Self {
        Level1::default()
    }

    /// The current activation for an identifier (0 before any binding).
    pub fn current(&self, name: &Name) -> u32 {
        self.map.get(name).copied().unwrap_or(0)
    }

    /// Bind an identifier to an activation on function entry.
    pub fn bind(&mut self, name: Name, activation: u32) {
        self.map.insert(name, activation);
    }
}

/// SSA-level renaming: (identifier, activation) → SSA number, plus the set of
/// identifiers seen so far. Keyed per activation so recursion does not alias.
///
/// The map is ordered so iteration (and hence phi synthesis) is
/// deterministic.
#[derive(Clone, Debug, Default)]
pub struct Level2 {
    map: BTreeMap<(Name, u32), u32>,
}

impl Level2 {
    pub fn new() -> Self {
        Level2::default()
    }

    /// The current SSA number (0 before the first assignment).
    pub fn current(&self, name: &Name, activation: u32) -> u32 {
        self.map
            .get(&(name.clone(), activation))
            .copied()
            .unwrap_or(0)
    }

    /// Bump the SSA number for a write and return the new number.
    pub fn increase(&mut self, name: Name, activation: u32) -> u32 {
        let counter = self.map.entry((name, activation)).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Record an identifier as live without assigning (declarations).
    pub fn touch(&mut self, name: Name, activation: u32) {
        self.map.entry((name, activation)).or_insert(0);
    }

    /// Collect every identifier this map has seen into `out`.
    pub fn collect_variables(&self, out: &mut std::collections::BTreeSet<(Name, u32)>) {
        out.extend(self.map.keys().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level1_defaults_to_zero() {
        let mut l1 = Level1::new();
        let x = Name::new("x");
        assert_eq!(l1.current(&x), 0);
        l1.bind(x.clone(), 3);
        assert_eq!(l1.current(&x), 3);
    }

    #[test]
    fn level2_counts_per_activation() {
        let mut l2 = Level2::new();
        let x = Name::new("x");
        assert_eq!(l2.current(&x, 1), 0);
        assert_eq!(l2.increase(x.clone(), 1), 1);
        assert_eq!(l2.increase(x.clone(), 1), 2);
        // A different activation of the same identifier counts separately.
        assert_eq!(l2.increase(x.clone(), 2), 1);
        assert_eq!(l2.current(&x, 1), 2);
    }

    #[test]
    fn collect_variables_is_deterministic() {
        let mut l2 = Level2::new();
        l2.increase(Name::new("b"), 1);
        l2.increase(Name::new("a"), 1);
        l2.touch(Name::new("c"), 2);

        let mut vars = std::collections::BTreeSet::new();
        l2.collect_variables(&mut vars);
        let names: Vec<_> = vars.iter().map(|(n, a)| (n.as_str().to_string(), *a)).collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("c".to_string(), 2)
            ]
        );
    }
}
