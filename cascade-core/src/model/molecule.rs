//! Molecules
//!
//! A molecule names a quantity stored on a node. The name is shared behind an
//! `Arc<str>` so that tokens, conditions and node contents can all hold it
//! without copying the string.

use std::fmt;
use std::sync::Arc;

/// The name of a quantity carried by nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Molecule(Arc<str>);

impl Molecule {
    /// Create a molecule with the given name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Get the molecule's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Molecule {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
