//! Dependency Graph
//!
//! The graph answers one question for the engine: after reaction `r` fires,
//! which other reactions may now have a stale `tau`?
//!
//! # Influence
//!
//! Reaction `s` influences reaction `t` (with `s != t`) when either
//!
//! - `s` writes `Everything` or `t` reads `Everything`, or
//! - the tokens `s` writes overlap the tokens `t` reads, **and** the region
//!   `s` writes can reach the region `t` reads.
//!
//! Regions come from contexts. A `Local` context covers the reaction's own
//! node, `Neighborhood` covers the node and its current neighbors, `Global`
//! covers everything. Two regions intersect when either is global or when
//! they share at least one node.
//!
//! # Candidate search
//!
//! Linking never scans the whole graph unless a global reaction forces it.
//! A source writing a `Local` region can only reach targets on its node or
//! one hop away; a `Neighborhood` source reaches two hops out. Reactions that
//! read or write globally are tracked in two side sets and always join the
//! candidate list.
//!
//! # Maintenance
//!
//! Neighborhood changes only affect reactions whose contexts mention the
//! neighborhood. Those handles drop all their edges and are linked again from
//! scratch; everything else is left alone.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use super::handle::DependencyHandle;
use crate::environment::Environment;
use crate::error::IndexError;
use crate::model::{intersects, Context, NodeId, ReactionId, SharedReaction};

/// Directed graph of "firing X may change the rate of Y" relations.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// All handles, indexed by reaction ID.
    handles: IndexMap<ReactionId, DependencyHandle>,

    /// Reactions living on each node.
    by_node: HashMap<NodeId, IndexSet<ReactionId>>,

    /// Reactions that read globally or read `Everything`.
    global_readers: IndexSet<ReactionId>,

    /// Reactions that write globally or write `Everything`.
    global_writers: IndexSet<ReactionId>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered reactions.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no reaction is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ReactionId) -> bool {
        self.handles.contains_key(&id)
    }

    /// Get the handle of a reaction.
    pub fn handle(&self, id: ReactionId) -> Option<&DependencyHandle> {
        self.handles.get(&id)
    }

    /// Get a registered reaction.
    pub fn reaction(&self, id: ReactionId) -> Option<&SharedReaction> {
        self.handles.get(&id).map(|h| h.reaction())
    }

    /// IDs of every registered reaction, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ReactionId> + '_ {
        self.handles.keys().copied()
    }

    /// Reactions registered on `node`.
    pub fn reactions_on(&self, node: NodeId) -> impl Iterator<Item = ReactionId> + '_ {
        self.by_node.get(&node).into_iter().flatten().copied()
    }

    /// Reactions to reschedule after `id` fires, in edge insertion order.
    ///
    /// Never contains `id` itself.
    pub fn influenced(&self, id: ReactionId) -> Vec<ReactionId> {
        self.handles
            .get(&id)
            .map(|h| h.influences().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Register a reaction and link it against every reaction already present.
    pub fn create_dependencies(
        &mut self,
        reaction: SharedReaction,
        env: &Environment,
    ) -> Result<ReactionId, IndexError> {
        let handle = DependencyHandle::new(reaction);
        let id = handle.id();
        if self.handles.contains_key(&id) {
            return Err(IndexError::Duplicate { id });
        }

        self.by_node.entry(handle.node()).or_default().insert(id);
        if handle.reads_globally() {
            self.global_readers.insert(id);
        }
        if handle.writes_globally() {
            self.global_writers.insert(id);
        }
        self.handles.insert(id, handle);

        self.link(id, env);
        debug!(
            reaction = %id,
            influences = self.handles[&id].influences().len(),
            influenced_by = self.handles[&id].influenced_by().len(),
            "Created dependencies"
        );
        Ok(id)
    }

    /// Unregister a reaction, dropping every edge it takes part in.
    pub fn remove_dependencies(&mut self, id: ReactionId) -> Option<DependencyHandle> {
        self.unlink(id);
        let handle = self.handles.shift_remove(&id)?;

        if let Some(on_node) = self.by_node.get_mut(&handle.node()) {
            on_node.shift_remove(&id);
            if on_node.is_empty() {
                self.by_node.remove(&handle.node());
            }
        }
        self.global_readers.shift_remove(&id);
        self.global_writers.shift_remove(&id);
        debug!(reaction = %id, "Removed dependencies");
        Some(handle)
    }

    /// `a` and `b` just became neighbors.
    pub fn add_neighbor(&mut self, env: &Environment, a: NodeId, b: NodeId) {
        self.relink_node(env, a);
        self.relink_node(env, b);
    }

    /// `a` and `b` are no longer neighbors.
    pub fn remove_neighbor(&mut self, env: &Environment, a: NodeId, b: NodeId) {
        self.relink_node(env, a);
        self.relink_node(env, b);
    }

    /// Recompute the edges of every neighborhood-scoped reaction on `node`.
    pub fn relink_node(&mut self, env: &Environment, node: NodeId) {
        let scoped: Vec<ReactionId> = self
            .reactions_on(node)
            .filter(|id| self.handles[id].uses_neighborhood())
            .collect();
        for id in scoped {
            self.unlink(id);
            self.link(id, env);
        }
        trace!(%node, "Relinked neighborhood-scoped reactions");
    }

    /// Add an edge: `source` influences `target`.
    fn add_edge(&mut self, source: ReactionId, target: ReactionId) {
        if let Some(handle) = self.handles.get_mut(&source) {
            handle.add_influence(target);
        }
        if let Some(handle) = self.handles.get_mut(&target) {
            handle.add_influencer(source);
        }
    }

    /// Remove an edge.
    fn remove_edge(&mut self, source: ReactionId, target: ReactionId) {
        if let Some(handle) = self.handles.get_mut(&source) {
            handle.remove_influence(target);
        }
        if let Some(handle) = self.handles.get_mut(&target) {
            handle.remove_influencer(source);
        }
    }

    /// Drop every edge touching `id`, in both directions.
    fn unlink(&mut self, id: ReactionId) {
        let Some(handle) = self.handles.get(&id) else {
            return;
        };
        let targets: Vec<ReactionId> = handle.influences().iter().copied().collect();
        let sources: Vec<ReactionId> = handle.influenced_by().iter().copied().collect();
        for target in targets {
            self.remove_edge(id, target);
        }
        for source in sources {
            self.remove_edge(source, id);
        }
    }

    /// Compute the edges of `id` in both directions.
    fn link(&mut self, id: ReactionId, env: &Environment) {
        let targets: Vec<ReactionId> = self
            .target_candidates(id, env)
            .into_iter()
            .filter(|&t| t != id && self.influences(id, t, env))
            .collect();
        let sources: Vec<ReactionId> = self
            .source_candidates(id, env)
            .into_iter()
            .filter(|&s| s != id && self.influences(s, id, env))
            .collect();

        for target in targets {
            self.add_edge(id, target);
        }
        for source in sources {
            self.add_edge(source, id);
        }
    }

    /// Reactions that `id` could possibly influence.
    fn target_candidates(&self, id: ReactionId, env: &Environment) -> IndexSet<ReactionId> {
        let handle = &self.handles[&id];
        if handle.writes_globally() {
            return self.handles.keys().copied().collect();
        }
        let mut candidates = self.reactions_near(env, handle.node(), hops(handle.output_context()));
        candidates.extend(self.global_readers.iter().copied());
        candidates
    }

    /// Reactions that could possibly influence `id`.
    fn source_candidates(&self, id: ReactionId, env: &Environment) -> IndexSet<ReactionId> {
        let handle = &self.handles[&id];
        if handle.reads_globally() {
            return self.handles.keys().copied().collect();
        }
        let mut candidates = self.reactions_near(env, handle.node(), hops(handle.input_context()));
        candidates.extend(self.global_writers.iter().copied());
        candidates
    }

    /// Reactions on nodes at most `hops` neighborhood links from `center`.
    fn reactions_near(&self, env: &Environment, center: NodeId, hops: usize) -> IndexSet<ReactionId> {
        let mut visited = HashSet::from([center]);
        let mut queue = VecDeque::from([(center, 0)]);
        let mut found = IndexSet::new();

        while let Some((node, depth)) = queue.pop_front() {
            found.extend(self.reactions_on(node));
            if depth == hops {
                continue;
            }
            let Ok(neighborhood) = env.neighborhood(node) else {
                continue;
            };
            for neighbor in neighborhood.iter() {
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }
        found
    }

    /// Whether firing `source` may change the rate of `target`.
    fn influences(&self, source: ReactionId, target: ReactionId, env: &Environment) -> bool {
        let (Some(s), Some(t)) = (self.handles.get(&source), self.handles.get(&target)) else {
            return false;
        };
        if s.writes_everything() || t.reads_everything() {
            return true;
        }
        if !intersects(s.outbound_dependencies(), t.inbound_dependencies()) {
            return false;
        }
        regions_intersect(env, s.node(), s.output_context(), t.node(), t.input_context())
    }
}

/// How many neighborhood links a context reaches past its own node, as seen
/// from the other end of a potential edge.
fn hops(context: Context) -> usize {
    match context {
        Context::Local => 1,
        Context::Neighborhood | Context::Global => 2,
    }
}

fn linked(env: &Environment, a: NodeId, b: NodeId) -> bool {
    let one_way = |x: NodeId, y: NodeId| env.neighborhood(x).map_or(false, |n| n.contains(y));
    one_way(a, b) || one_way(b, a)
}

/// Whether the region `a` covers under `ac` meets the region `b` covers
/// under `bc`.
fn regions_intersect(env: &Environment, a: NodeId, ac: Context, b: NodeId, bc: Context) -> bool {
    if ac == Context::Global || bc == Context::Global || a == b {
        return true;
    }
    match (ac, bc) {
        (Context::Local, Context::Local) => false,
        (Context::Local, _) | (_, Context::Local) => linked(env, a, b),
        _ => {
            if linked(env, a, b) {
                return true;
            }
            let (Ok(na), Ok(nb)) = (env.neighborhood(a), env.neighborhood(b)) else {
                return false;
            };
            na.iter().any(|n| nb.contains(n))
        }
    }
}
