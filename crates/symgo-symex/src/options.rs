//! Engine configuration.

use crate::target::EquationConfig;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("options '{first}' and '{second}' are mutually exclusive")]
    ConflictingModes {
        first: &'static str,
        second: &'static str,
    },

    #[error("invalid unwindset entry '{entry}', expected <loop-id>=<bound>")]
    InvalidUnwindSet { entry: String },
}

/// Options steering loop bounding and claim emission.
#[derive(Clone, Debug, Default)]
pub struct SymexOptions {
    /// Global maximum iterations per loop (0 = unlimited).
    pub max_unwind: u32,
    /// Per-loop overrides, keyed by loop id.
    pub unwind_set: ahash::AHashMap<u32, u32>,
    /// Suppress unwinding claims.
    pub no_unwinding_assertions: bool,
    /// Do not constrain the path guard at the loop bound.
    pub partial_loops: bool,
    /// Replace unwinding claims with assumptions (k-induction base step).
    pub base_case: bool,
    /// Emit unwinding claims only (k-induction forward step).
    pub forward_condition: bool,
    /// Emit a wide assumption at each state vector point (loop back-edge).
    pub assume_all_states: bool,
    /// Abort instead of skipping when a phi lookup misses the symbol table.
    pub strict_phi: bool,
    /// Downstream encoding hints, forwarded to the sink configuration.
    pub tuple_node_flattener: bool,
    pub tuple_sym_flattener: bool,
}

impl SymexOptions {
    /// Reject inconsistent mode combinations. The three k-induction-related
    /// modes are mutually exclusive.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let modes = [
            ("base-case", self.base_case),
            ("forward-condition", self.forward_condition),
            ("assume-all-states", self.assume_all_states),
        ];
        let mut enabled = modes.iter().filter(|(_, on)| *on);
        if let (Some(first), Some(second)) = (enabled.next(), enabled.next()) {
            return Err(OptionsError::ConflictingModes {
                first: first.0,
                second: second.0,
            });
        }
        Ok(())
    }

    /// Parse an `unwindset` string of the form `id=N,id=N,...`.
    pub fn parse_unwind_set(s: &str) -> Result<ahash::AHashMap<u32, u32>, OptionsError> {
        let mut map = ahash::AHashMap::new();
        for entry in s.split(',').filter(|e| !e.is_empty()) {
            let invalid = || OptionsError::InvalidUnwindSet {
                entry: entry.to_string(),
            };
            let (id, bound) = entry.split_once('=').ok_or_else(invalid)?;
            let id: u32 = id.trim().parse().map_err(|_| invalid())?;
            let bound: u32 = bound.trim().parse().map_err(|_| invalid())?;
            map.insert(id, bound);
        }
        Ok(map)
    }

    /// The bound for a given loop: its override, else the global maximum.
    pub fn unwind_bound(&self, loop_id: Option<u32>) -> u32 {
        loop_id
            .and_then(|id| self.unwind_set.get(&id))
            .copied()
            .unwrap_or(self.max_unwind)
    }

    /// The sink configuration these options imply.
    pub fn equation_config(&self) -> EquationConfig {
        EquationConfig {
            tuple_node_flattener: self.tuple_node_flattener,
            tuple_sym_flattener: self.tuple_sym_flattener,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(SymexOptions::default().validate().is_ok());
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        let opts = SymexOptions {
            base_case: true,
            forward_condition: true,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(OptionsError::ConflictingModes { .. })
        ));

        let opts = SymexOptions {
            forward_condition: true,
            assume_all_states: true,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn unwind_set_parsing() {
        let map = SymexOptions::parse_unwind_set("0=3, 2=10").unwrap();
        assert_eq!(map.get(&0), Some(&3));
        assert_eq!(map.get(&2), Some(&10));

        assert!(SymexOptions::parse_unwind_set("a=b").is_err());
        assert!(SymexOptions::parse_unwind_set("7").is_err());
        assert!(SymexOptions::parse_unwind_set("").unwrap().is_empty());
    }

    #[test]
    fn unwind_bound_prefers_override() {
        let mut opts = SymexOptions {
            max_unwind: 5,
            ..Default::default()
        };
        opts.unwind_set.insert(1, 2);
        assert_eq!(opts.unwind_bound(Some(1)), 2);
        assert_eq!(opts.unwind_bound(Some(0)), 5);
        assert_eq!(opts.unwind_bound(None), 5);
    }
}
