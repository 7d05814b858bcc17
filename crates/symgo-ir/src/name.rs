//! Interned-ish identifier type shared across the IR.

use std::fmt;
use std::sync::Arc;

/// An identifier (symbol name, member name, function name).
///
/// Backed by a shared `Arc<str>` so cloning a name is a refcount bump, not an
/// allocation. Names are compared and ordered by their text.
#[derive(Clone)]
pub struct Name(Arc<str>);

impl Name {
    /// Create a name from a string slice.
    pub fn new(s: &str) -> Self {
        Name(Arc::from(s))
    }

    /// Get the underlying text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name(Arc::from(s.as_str()))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &*self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_equality_and_order() {
        let a = Name::new("alpha");
        let b = Name::new("alpha");
        let c = Name::new("beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn clone_is_shared() {
        let a = Name::new("x");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.as_str(), "x");
    }
}
