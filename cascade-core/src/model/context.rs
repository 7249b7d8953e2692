//! Contexts and Dependency Tokens
//!
//! Every condition and action declares two things about itself:
//!
//! - a **context**: how far from its own node it reads or writes
//!   (`Local` < `Neighborhood` < `Global`);
//! - a set of **dependency tokens**: which quantities it reads or writes.
//!
//! The dependency graph combines both to decide which reactions must be
//! rescheduled after another one fires. Wildcard tokens trade precision for
//! safety: `EveryMolecule` matches any molecule token, and `Everything`
//! couples a reaction to every other reaction regardless of location.

use smallvec::SmallVec;

use super::molecule::Molecule;

/// How far a reaction's reads or writes extend.
///
/// The ordering is meaningful: a reaction's context is the *maximum* over its
/// conditions (input) or actions (output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Context {
    /// Only the reaction's own node.
    Local,

    /// The reaction's node and its current neighbors.
    Neighborhood,

    /// Any node in the environment.
    Global,
}

impl Context {
    /// The least strict of two contexts.
    pub fn widest(self, other: Context) -> Context {
        self.max(other)
    }
}

/// A token describing something a reaction reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// A specific molecule.
    Molecule(Molecule),

    /// Any molecule. Matches every `Molecule` token.
    EveryMolecule,

    /// Anything at all, including positions and topology. Couples
    /// unconditionally.
    Everything,
}

impl Dependency {
    /// Whether two tokens may refer to the same state.
    pub fn overlaps(&self, other: &Dependency) -> bool {
        match (self, other) {
            (Dependency::Everything, _) | (_, Dependency::Everything) => true,
            (Dependency::EveryMolecule, _) | (_, Dependency::EveryMolecule) => true,
            (Dependency::Molecule(a), Dependency::Molecule(b)) => a == b,
        }
    }

    /// Whether this is the unconditional wildcard.
    pub fn is_everything(&self) -> bool {
        matches!(self, Dependency::Everything)
    }
}

impl From<Molecule> for Dependency {
    fn from(molecule: Molecule) -> Self {
        Dependency::Molecule(molecule)
    }
}

/// The dependency tokens declared by a condition, action or reaction.
pub type Dependencies = SmallVec<[Dependency; 4]>;

/// Whether any token of `writes` may touch state read through `reads`.
pub fn intersects(writes: &[Dependency], reads: &[Dependency]) -> bool {
    writes
        .iter()
        .any(|w| reads.iter().any(|r| w.overlaps(r)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn context_ordering() {
        assert!(Context::Local < Context::Neighborhood);
        assert!(Context::Neighborhood < Context::Global);
        assert_eq!(Context::Local.widest(Context::Global), Context::Global);
    }

    #[test]
    fn molecule_tokens_match_by_name() {
        let a = Dependency::from(Molecule::new("a"));
        let b = Dependency::from(Molecule::new("b"));
        assert!(a.overlaps(&a.clone()));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Dependency::EveryMolecule));
        assert!(Dependency::Everything.overlaps(&b));
    }

    #[test]
    fn token_sets_intersect() {
        let writes: Dependencies = smallvec![Dependency::from(Molecule::new("a"))];
        let reads: Dependencies = smallvec![
            Dependency::from(Molecule::new("b")),
            Dependency::from(Molecule::new("a")),
        ];
        assert!(intersects(&writes, &reads));
        assert!(!intersects(&writes, &[]));
    }
}
