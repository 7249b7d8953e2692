//! Dependency Handles
//!
//! One handle per live reaction. It caches what the dependency graph needs to
//! know about the reaction (node, contexts, tokens), so linking never has to
//! lock the reaction, and it stores the edges in both directions.

use indexmap::IndexSet;

use crate::model::{Context, Dependencies, NodeId, ReactionId, SharedReaction};

/// Bookkeeping for one reaction in the dependency graph.
pub struct DependencyHandle {
    /// The reaction itself.
    reaction: SharedReaction,

    id: ReactionId,
    node: NodeId,
    input: Context,
    output: Context,
    inbound: Dependencies,
    outbound: Dependencies,

    /// Reactions that must be rescheduled after this one fires.
    influences: IndexSet<ReactionId>,

    /// Reactions whose firing reschedules this one.
    influenced_by: IndexSet<ReactionId>,
}

impl DependencyHandle {
    /// Capture the declared scope of `reaction`.
    pub fn new(reaction: SharedReaction) -> Self {
        let (id, node, input, output, inbound, outbound) = {
            let r = reaction.lock();
            (
                r.id(),
                r.node(),
                r.input_context(),
                r.output_context(),
                r.inbound_dependencies(),
                r.outbound_dependencies(),
            )
        };
        Self {
            reaction,
            id,
            node,
            input,
            output,
            inbound,
            outbound,
            influences: IndexSet::new(),
            influenced_by: IndexSet::new(),
        }
    }

    /// Get the reaction's ID.
    pub fn id(&self) -> ReactionId {
        self.id
    }

    /// The node the reaction lives on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The shared reaction.
    pub fn reaction(&self) -> &SharedReaction {
        &self.reaction
    }

    /// Context read by the conditions.
    pub fn input_context(&self) -> Context {
        self.input
    }

    /// Context written by the actions.
    pub fn output_context(&self) -> Context {
        self.output
    }

    /// Tokens read.
    pub fn inbound_dependencies(&self) -> &Dependencies {
        &self.inbound
    }

    /// Tokens written.
    pub fn outbound_dependencies(&self) -> &Dependencies {
        &self.outbound
    }

    /// Whether the reaction reads through the `Everything` wildcard.
    pub fn reads_everything(&self) -> bool {
        self.inbound.iter().any(|d| d.is_everything())
    }

    /// Whether the reaction writes through the `Everything` wildcard.
    pub fn writes_everything(&self) -> bool {
        self.outbound.iter().any(|d| d.is_everything())
    }

    /// Whether either side of the reaction depends on the current
    /// neighborhood of its node.
    pub fn uses_neighborhood(&self) -> bool {
        self.input == Context::Neighborhood || self.output == Context::Neighborhood
    }

    /// Whether the reaction must be a candidate target for every source.
    pub fn reads_globally(&self) -> bool {
        self.input == Context::Global || self.reads_everything()
    }

    /// Whether the reaction must be a candidate source for every target.
    pub fn writes_globally(&self) -> bool {
        self.output == Context::Global || self.writes_everything()
    }

    /// Reactions this one influences.
    pub fn influences(&self) -> &IndexSet<ReactionId> {
        &self.influences
    }

    /// Reactions influencing this one.
    pub fn influenced_by(&self) -> &IndexSet<ReactionId> {
        &self.influenced_by
    }

    pub(crate) fn add_influence(&mut self, id: ReactionId) {
        self.influences.insert(id);
    }

    pub(crate) fn remove_influence(&mut self, id: ReactionId) {
        self.influences.shift_remove(&id);
    }

    pub(crate) fn add_influencer(&mut self, id: ReactionId) {
        self.influenced_by.insert(id);
    }

    pub(crate) fn remove_influencer(&mut self, id: ReactionId) {
        self.influenced_by.shift_remove(&id);
    }
}

impl std::fmt::Debug for DependencyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyHandle")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("influences", &self.influences)
            .field("influenced_by", &self.influenced_by)
            .finish()
    }
}
