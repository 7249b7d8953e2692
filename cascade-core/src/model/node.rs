//! Nodes
//!
//! A node is a container of molecule concentrations plus the reactions that
//! live on it. Nodes are owned by the environment, which stores them in an
//! arena keyed by [`NodeId`]; everything else refers to them by id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::molecule::Molecule;
use super::reaction::{ReactionId, SharedReaction};

/// Unique identifier for a node in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A container of quantities and the reactions attached to it.
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// Concentration of each molecule, in insertion order.
    contents: IndexMap<Molecule, f64>,

    /// Reactions living on this node, keyed by id so lookups never lock.
    reactions: IndexMap<ReactionId, SharedReaction>,
}

impl Node {
    /// Create an empty node with a fresh id.
    pub fn new() -> Self {
        Self::with_id(NodeId::new())
    }

    /// Create an empty node with the given id.
    pub fn with_id(id: NodeId) -> Self {
        Self {
            id,
            contents: IndexMap::new(),
            reactions: IndexMap::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Concentration of `molecule`, zero when absent.
    pub fn concentration(&self, molecule: &Molecule) -> f64 {
        self.contents.get(molecule).copied().unwrap_or(0.0)
    }

    /// Whether the node carries `molecule` at all.
    pub fn contains(&self, molecule: &Molecule) -> bool {
        self.contents.contains_key(molecule)
    }

    /// Set the concentration of `molecule`.
    pub fn set_concentration(&mut self, molecule: Molecule, value: f64) {
        self.contents.insert(molecule, value);
    }

    /// Add `delta` to the concentration of `molecule`.
    pub fn change_concentration(&mut self, molecule: &Molecule, delta: f64) {
        *self.contents.entry(molecule.clone()).or_insert(0.0) += delta;
    }

    /// All molecules and their concentrations.
    pub fn contents(&self) -> &IndexMap<Molecule, f64> {
        &self.contents
    }

    /// Attach a reaction.
    pub fn add_reaction(&mut self, reaction: SharedReaction) {
        let id = reaction.lock().id();
        self.reactions.insert(id, reaction);
    }

    /// Detach a reaction, returning it if it was present.
    pub fn remove_reaction(&mut self, id: ReactionId) -> Option<SharedReaction> {
        self.reactions.shift_remove(&id)
    }

    /// Reactions living on this node, in attachment order.
    pub fn reactions(&self) -> impl ExactSizeIterator<Item = &SharedReaction> {
        self.reactions.values()
    }

    /// IDs of the reactions living on this node.
    pub fn reaction_ids(&self) -> impl ExactSizeIterator<Item = ReactionId> + '_ {
        self.reactions.keys().copied()
    }

    /// Whether a reaction is attached to this node.
    pub fn contains_reaction(&self, id: ReactionId) -> bool {
        self.reactions.contains_key(&id)
    }

    /// Number of attached reactions.
    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("contents", &self.contents)
            .field("reactions", &self.reactions.len())
            .finish()
    }
}
