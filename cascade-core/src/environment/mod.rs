//! Spatial Environment
//!
//! The environment owns the nodes, their positions and their neighborhoods.
//! It answers range queries and keeps every neighborhood consistent with the
//! active [`LinkingRule`] as nodes appear, move and disappear.
//!
//! # Structure
//!
//! - Nodes live in an arena keyed by [`NodeId`].
//! - Positions are authoritative; a [`GridIndex`] mirrors them for range
//!   queries.
//! - Neighborhoods are id sets, kept symmetric by explicit add/remove
//!   propagation.
//! - Range query results are memoised in a small LRU that is cleared on any
//!   position change. A generation counter lets linking rules cache their
//!   own derived data the same way.
//!
//! # Neighborhood maintenance
//!
//! When a node moves (or is inserted), two strategies exist:
//!
//! 1. **Locally consistent rule**: recompute the moved node's neighborhood,
//!    then remove it from the neighbors it lost and add it to the ones it
//!    found. Nothing else is touched.
//!
//! 2. **Other rules**: run a worklist fixed point. Recomputing a node yields
//!    "discovered" and "lost" edge operations; applying an operation to its
//!    destination makes the destination agree with the origin, after which the
//!    destination itself is recomputed. A visited set of operations and a set
//!    of already-recomputed nodes bound the iteration.
//!
//! # Scheduler coupling
//!
//! The engine attaches itself with [`Environment::attach_scheduler`]. From
//! then on every structural change is queued as an [`EnvironmentEvent`] and
//! the engine drains the queue after each reaction fires.

mod position;
mod spatial;
mod neighborhood;
mod placement;
mod cache;
mod event;

pub use position::Position;
pub use spatial::GridIndex;
pub use neighborhood::{ClosestN, ConnectWithinDistance, LinkingRule, Neighborhood, NoLinks};
pub use placement::{BoundingBox, Placement, Unbounded};
pub use event::EnvironmentEvent;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::{debug, trace};

use cache::{RangeCache, RangeKey};
use crate::config::EnvironmentConfig;
use crate::error::{ConfigError, EnvironmentError, EnvironmentResult};
use crate::model::{Node, NodeId, ReactionId, SharedReaction};

/// A neighborhood edge change travelling through the fixed-point worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LinkChange {
    /// `to` must gain `from` as a neighbor.
    Discovered { from: NodeId, to: NodeId },

    /// `to` must lose `from` as a neighbor.
    Lost { from: NodeId, to: NodeId },
}

impl LinkChange {
    fn destination(&self) -> NodeId {
        match *self {
            LinkChange::Discovered { to, .. } | LinkChange::Lost { to, .. } => to,
        }
    }
}

/// The spatial world the reactions live in.
pub struct Environment {
    config: EnvironmentConfig,
    nodes: IndexMap<NodeId, Node>,
    positions: HashMap<NodeId, Position>,
    neighborhoods: HashMap<NodeId, Neighborhood>,
    spatial: GridIndex,
    linking_rule: Box<dyn LinkingRule>,
    placement: Box<dyn Placement>,
    range_cache: Mutex<RangeCache>,
    generation: u64,
    events: Vec<EnvironmentEvent>,
    scheduler_attached: bool,
}

/// Builder for [`Environment`].
pub struct EnvironmentBuilder {
    config: EnvironmentConfig,
    linking_rule: Box<dyn LinkingRule>,
    placement: Box<dyn Placement>,
}

impl EnvironmentBuilder {
    /// Use the given configuration.
    pub fn config(mut self, config: EnvironmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of coordinates of every position.
    pub fn dimensions(mut self, dimensions: usize) -> Self {
        self.config.dimensions = dimensions;
        self
    }

    /// Use the given linking rule.
    pub fn linking_rule(mut self, rule: impl LinkingRule + 'static) -> Self {
        self.linking_rule = Box::new(rule);
        self
    }

    /// Use the given placement policy.
    pub fn placement(mut self, placement: impl Placement + 'static) -> Self {
        self.placement = Box::new(placement);
        self
    }

    /// Validate the configuration and build the environment.
    pub fn build(self) -> Result<Environment, ConfigError> {
        self.config.validate()?;
        Ok(Environment::assemble(self.config, self.linking_rule, self.placement))
    }
}

impl Environment {
    /// Start building an environment. Defaults: two dimensions, no links,
    /// unbounded placement.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder {
            config: EnvironmentConfig::default(),
            linking_rule: Box::new(NoLinks),
            placement: Box::new(Unbounded),
        }
    }

    fn assemble(
        config: EnvironmentConfig,
        linking_rule: Box<dyn LinkingRule>,
        placement: Box<dyn Placement>,
    ) -> Self {
        Self {
            spatial: GridIndex::new(config.grid_cell_size),
            range_cache: Mutex::new(RangeCache::new(config.range_cache_capacity)),
            config,
            nodes: IndexMap::new(),
            positions: HashMap::new(),
            neighborhoods: HashMap::new(),
            linking_rule,
            placement,
            generation: 0,
            events: Vec::new(),
            scheduler_attached: false,
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Number of coordinates of every position.
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `id` is in the environment.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get a node.
    pub fn node(&self, id: NodeId) -> EnvironmentResult<&Node> {
        self.nodes.get(&id).ok_or(EnvironmentError::UnknownNode { id })
    }

    /// Get a node mutably.
    pub fn node_mut(&mut self, id: NodeId) -> EnvironmentResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or(EnvironmentError::UnknownNode { id })
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All node ids, in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Position of a node.
    pub fn position(&self, id: NodeId) -> EnvironmentResult<&Position> {
        if !self.nodes.contains_key(&id) {
            return Err(EnvironmentError::UnknownNode { id });
        }
        self.positions
            .get(&id)
            .ok_or(EnvironmentError::MissingPosition { id })
    }

    /// Every recorded position.
    pub fn positions(&self) -> impl Iterator<Item = (NodeId, &Position)> {
        self.positions.iter().map(|(id, p)| (*id, p))
    }

    /// Neighborhood of a node.
    pub fn neighborhood(&self, id: NodeId) -> EnvironmentResult<&Neighborhood> {
        if !self.nodes.contains_key(&id) {
            return Err(EnvironmentError::UnknownNode { id });
        }
        self.neighborhoods
            .get(&id)
            .ok_or(EnvironmentError::MissingPosition { id })
    }

    /// Distance between two nodes.
    pub fn distance_between(&self, a: NodeId, b: NodeId) -> EnvironmentResult<f64> {
        Ok(self.position(a)?.distance_to(self.position(b)?))
    }

    /// Counter bumped by every insertion, removal and move. Two equal
    /// values mean the positions did not change in between.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The active linking rule.
    pub fn linking_rule(&self) -> &dyn LinkingRule {
        self.linking_rule.as_ref()
    }

    // ------------------------------------------------------------------
    // Range queries
    // ------------------------------------------------------------------

    /// Nodes within `range` of `center`, sorted by id.
    pub fn nodes_within_range(
        &self,
        center: &Position,
        range: f64,
    ) -> EnvironmentResult<Vec<NodeId>> {
        if !(range.is_finite() && range > 0.0) {
            return Err(EnvironmentError::InvalidRange { range });
        }
        self.check_position(center)?;

        let key = RangeKey::new(center, range);
        if let Some(hit) = self.range_cache.lock().get(&key) {
            return Ok(hit.to_vec());
        }

        let mut found: Vec<NodeId> = self
            .spatial
            .candidates(center, range)
            .into_iter()
            .filter(|id| {
                self.positions
                    .get(id)
                    .is_some_and(|p| p.distance_to(center) <= range)
            })
            .collect();
        found.sort();

        self.range_cache.lock().insert(key, Arc::from(found.as_slice()));
        Ok(found)
    }

    /// Nodes within `range` of node `id`, excluding `id` itself.
    pub fn nodes_within_range_of(&self, id: NodeId, range: f64) -> EnvironmentResult<Vec<NodeId>> {
        let center = self.position(id)?.clone();
        let mut found = self.nodes_within_range(&center, range)?;
        found.retain(|n| *n != id);
        Ok(found)
    }

    fn positions_changed(&mut self) {
        self.generation += 1;
        self.range_cache.get_mut().invalidate();
    }

    // ------------------------------------------------------------------
    // Structural changes
    // ------------------------------------------------------------------

    /// Insert a node at `position`.
    ///
    /// Returns `Ok(false)` when the placement policy refuses the position.
    /// Fails if the id is already present, the position has the wrong
    /// dimensionality or a non-finite coordinate, or one of the node's
    /// reactions declares another node.
    pub fn add_node(&mut self, node: Node, position: impl Into<Position>) -> EnvironmentResult<bool> {
        let id = node.id();
        let position = position.into();
        if self.nodes.contains_key(&id) {
            return Err(EnvironmentError::DuplicateNode { id });
        }
        self.check_position(&position)?;
        for reaction in node.reactions() {
            let reaction = reaction.lock();
            if reaction.node() != id {
                return Err(EnvironmentError::ReactionNodeMismatch {
                    reaction: reaction.id(),
                    declared: reaction.node(),
                    node: id,
                });
            }
        }
        if !self.placement.admit(&position) {
            debug!(node = %id, %position, "placement refused node");
            return Ok(false);
        }
        let position = self.placement.place(position);

        self.positions_changed();
        self.spatial.insert(id, &position);
        self.positions.insert(id, position);
        self.nodes.insert(id, node);
        self.neighborhoods.insert(id, Neighborhood::new(id));
        self.emit(EnvironmentEvent::NodeAdded { node: id });
        self.update_neighborhood(id)?;

        debug!(node = %id, neighbors = self.neighborhoods[&id].len(), "node added");
        Ok(true)
    }

    /// Remove a node and return it.
    pub fn remove_node(&mut self, id: NodeId) -> EnvironmentResult<Node> {
        if !self.nodes.contains_key(&id) {
            return Err(EnvironmentError::UnknownNode { id });
        }
        if !self.positions.contains_key(&id) {
            return Err(EnvironmentError::MissingPosition { id });
        }

        self.positions_changed();
        self.positions.remove(&id);
        self.spatial.remove(id)?;
        let former = self
            .neighborhoods
            .remove(&id)
            .map(|hood| hood.iter().collect::<Vec<_>>())
            .unwrap_or_default();
        for neighbor in &former {
            if let Some(hood) = self.neighborhoods.get_mut(neighbor) {
                hood.remove(id);
            }
        }
        let node = self
            .nodes
            .shift_remove(&id)
            .ok_or(EnvironmentError::UnknownNode { id })?;

        let reactions = node.reaction_ids().collect();
        self.emit(EnvironmentEvent::NodeRemoved {
            node: id,
            reactions,
            former_neighbors: former.clone(),
        });

        if !self.linking_rule.is_locally_consistent() {
            self.propagate_links(&former)?;
        }

        debug!(node = %id, former_neighbors = former.len(), "node removed");
        Ok(node)
    }

    /// Displace a node by `delta`.
    pub fn move_node(&mut self, id: NodeId, delta: &Position) -> EnvironmentResult<bool> {
        let target = self.position(id)?.translated(delta);
        self.move_node_to(id, target)
    }

    /// Move a node to `position`.
    ///
    /// Returns `Ok(false)` when the placement policy refuses the target; the
    /// node then stays where it is.
    pub fn move_node_to(&mut self, id: NodeId, position: impl Into<Position>) -> EnvironmentResult<bool> {
        let position = position.into();
        if !self.nodes.contains_key(&id) {
            return Err(EnvironmentError::UnknownNode { id });
        }
        if !self.spatial.contains(id) {
            return Err(EnvironmentError::NotIndexed { id });
        }
        self.check_position(&position)?;
        if !self.placement.admit(&position) {
            return Ok(false);
        }
        let position = self.placement.place(position);

        self.positions_changed();
        self.spatial.relocate(id, &position)?;
        trace!(node = %id, %position, "node moved");
        self.positions.insert(id, position);
        self.emit(EnvironmentEvent::NodeMoved { node: id });
        self.update_neighborhood(id)?;
        Ok(true)
    }

    /// Attach a reaction to an existing node.
    pub fn add_reaction(&mut self, node: NodeId, reaction: SharedReaction) -> EnvironmentResult<()> {
        let (id, declared) = {
            let r = reaction.lock();
            (r.id(), r.node())
        };
        if declared != node {
            return Err(EnvironmentError::ReactionNodeMismatch {
                reaction: id,
                declared,
                node,
            });
        }
        self.node_mut(node)?.add_reaction(Arc::clone(&reaction));
        self.emit(EnvironmentEvent::ReactionAdded { reaction });
        Ok(())
    }

    /// Detach a reaction from a node.
    pub fn remove_reaction(&mut self, node: NodeId, reaction: ReactionId) -> EnvironmentResult<SharedReaction> {
        let removed = self
            .node_mut(node)?
            .remove_reaction(reaction)
            .ok_or(EnvironmentError::UnknownReaction { reaction, node })?;
        self.emit(EnvironmentEvent::ReactionRemoved { reaction });
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Scheduler coupling
    // ------------------------------------------------------------------

    /// Start queueing structural events for a scheduler.
    pub fn attach_scheduler(&mut self) {
        self.scheduler_attached = true;
    }

    /// Whether a scheduler is attached.
    pub fn is_scheduler_attached(&self) -> bool {
        self.scheduler_attached
    }

    /// Take every queued structural event.
    pub fn drain_events(&mut self) -> Vec<EnvironmentEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: EnvironmentEvent) {
        if self.scheduler_attached {
            self.events.push(event);
        }
    }

    // ------------------------------------------------------------------
    // Neighborhood maintenance
    // ------------------------------------------------------------------

    fn check_position(&self, position: &Position) -> EnvironmentResult<()> {
        if position.dimensions() != self.config.dimensions {
            return Err(EnvironmentError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: position.dimensions(),
            });
        }
        if !position.is_finite() {
            return Err(EnvironmentError::InvalidPosition {
                position: position.clone(),
            });
        }
        Ok(())
    }

    fn update_neighborhood(&mut self, id: NodeId) -> EnvironmentResult<()> {
        if !self.linking_rule.is_locally_consistent() {
            return self.propagate_links(&[id]);
        }

        let fresh = self.linking_rule.compute_neighborhood(id, self)?;
        let stale = self
            .neighborhoods
            .insert(id, fresh.clone())
            .unwrap_or_else(|| Neighborhood::new(id));

        for lost in stale.iter().filter(|n| !fresh.contains(*n)) {
            if let Some(hood) = self.neighborhoods.get_mut(&lost) {
                hood.remove(id);
            }
            self.emit(EnvironmentEvent::NeighborRemoved { node: id, neighbor: lost });
        }
        for found in fresh.iter().filter(|n| !stale.contains(*n)) {
            if let Some(hood) = self.neighborhoods.get_mut(&found) {
                hood.insert(id);
            }
            self.emit(EnvironmentEvent::NeighborAdded { node: id, neighbor: found });
        }
        Ok(())
    }

    /// Recompute `id` from scratch and report the edge changes its former
    /// and new neighbors must apply.
    fn recompute_links(&mut self, id: NodeId) -> EnvironmentResult<Vec<LinkChange>> {
        let fresh = self.linking_rule.compute_neighborhood(id, self)?;
        let stale = self
            .neighborhoods
            .insert(id, fresh.clone())
            .unwrap_or_else(|| Neighborhood::new(id));

        let mut changes = Vec::new();
        for lost in stale.iter().filter(|n| !fresh.contains(*n)) {
            self.emit(EnvironmentEvent::NeighborRemoved { node: id, neighbor: lost });
            changes.push(LinkChange::Lost { from: id, to: lost });
        }
        for found in fresh.iter().filter(|n| !stale.contains(*n)) {
            self.emit(EnvironmentEvent::NeighborAdded { node: id, neighbor: found });
            changes.push(LinkChange::Discovered { from: id, to: found });
        }
        Ok(changes)
    }

    fn apply_link_change(&mut self, change: LinkChange) {
        match change {
            LinkChange::Discovered { from, to } => {
                let added = self
                    .neighborhoods
                    .get_mut(&to)
                    .is_some_and(|hood| hood.insert(from));
                if added {
                    self.emit(EnvironmentEvent::NeighborAdded { node: to, neighbor: from });
                }
            }
            LinkChange::Lost { from, to } => {
                let removed = self
                    .neighborhoods
                    .get_mut(&to)
                    .is_some_and(|hood| hood.remove(from));
                if removed {
                    self.emit(EnvironmentEvent::NeighborRemoved { node: to, neighbor: from });
                }
            }
        }
    }

    fn propagate_links(&mut self, origins: &[NodeId]) -> EnvironmentResult<()> {
        let mut queue: VecDeque<LinkChange> = VecDeque::new();
        let mut visited: HashSet<LinkChange> = HashSet::new();
        let mut recomputed: IndexSet<NodeId> = IndexSet::new();

        for &origin in origins {
            if self.nodes.contains_key(&origin) && recomputed.insert(origin) {
                queue.extend(self.recompute_links(origin)?);
            }
        }

        while let Some(change) = queue.pop_front() {
            if !visited.insert(change) {
                continue;
            }
            let destination = change.destination();
            if !self.nodes.contains_key(&destination) {
                continue;
            }
            self.apply_link_change(change);
            if recomputed.insert(destination) {
                queue.extend(self.recompute_links(destination)?);
            }
        }

        trace!(recomputed = recomputed.len(), operations = visited.len(), "links propagated");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn cached_queries(&self) -> usize {
        self.range_cache.lock().len()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::assemble(
            EnvironmentConfig::default(),
            Box::new(NoLinks),
            Box::new(Unbounded),
        )
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("dimensions", &self.config.dimensions)
            .field("nodes", &self.nodes.len())
            .field("scheduler_attached", &self.scheduler_attached)
            .finish()
    }
}
