//! Neighborhoods and Linking Rules
//!
//! A neighborhood is the set of nodes connected to a centre node. It is
//! stored as a set of ids, never as references, so nodes and their cached
//! neighbors form no cycles.
//!
//! Which nodes are connected is decided by a pluggable [`LinkingRule`]. A rule
//! is *locally consistent* when the neighborhood of a node can be recomputed
//! on its own (fixed-radius proximity, for instance). Rules that are not
//! (k-nearest, triangulations) force the environment to propagate a change
//! through the nodes it affects.

use std::collections::HashMap;

use indexmap::IndexSet;
use parking_lot::Mutex;

use super::Environment;
use crate::error::EnvironmentResult;
use crate::model::NodeId;

/// The nodes connected to a given node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighborhood {
    center: NodeId,
    neighbors: IndexSet<NodeId>,
}

impl Neighborhood {
    /// An empty neighborhood around `center`.
    pub fn new(center: NodeId) -> Self {
        Self {
            center,
            neighbors: IndexSet::new(),
        }
    }

    /// A neighborhood around `center` with the given neighbors. The centre
    /// itself is never its own neighbor.
    pub fn with_neighbors(center: NodeId, neighbors: impl IntoIterator<Item = NodeId>) -> Self {
        let neighbors = neighbors.into_iter().filter(|n| *n != center).collect();
        Self { center, neighbors }
    }

    /// The node this neighborhood belongs to.
    pub fn center(&self) -> NodeId {
        self.center
    }

    /// Whether `node` is a neighbor.
    pub fn contains(&self, node: NodeId) -> bool {
        self.neighbors.contains(&node)
    }

    /// Iterate over the neighbors.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.iter().copied()
    }

    /// Number of neighbors.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether there are no neighbors.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub(crate) fn insert(&mut self, node: NodeId) -> bool {
        node != self.center && self.neighbors.insert(node)
    }

    pub(crate) fn remove(&mut self, node: NodeId) -> bool {
        self.neighbors.shift_remove(&node)
    }
}

/// Policy computing a node's neighborhood from the environment.
pub trait LinkingRule: Send + Sync {
    /// Compute the neighborhood of `center` in the current environment.
    fn compute_neighborhood(
        &self,
        center: NodeId,
        env: &Environment,
    ) -> EnvironmentResult<Neighborhood>;

    /// Whether a node's neighborhood depends only on that node and nodes
    /// within bounded distance.
    fn is_locally_consistent(&self) -> bool {
        false
    }
}

/// Nobody is connected to anybody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLinks;

impl LinkingRule for NoLinks {
    fn compute_neighborhood(
        &self,
        center: NodeId,
        _env: &Environment,
    ) -> EnvironmentResult<Neighborhood> {
        Ok(Neighborhood::new(center))
    }

    fn is_locally_consistent(&self) -> bool {
        true
    }
}

/// Connects every pair of nodes closer than a fixed range.
#[derive(Debug, Clone, Copy)]
pub struct ConnectWithinDistance {
    range: f64,
}

impl ConnectWithinDistance {
    pub fn new(range: f64) -> Self {
        Self { range }
    }

    pub fn range(&self) -> f64 {
        self.range
    }
}

impl LinkingRule for ConnectWithinDistance {
    fn compute_neighborhood(
        &self,
        center: NodeId,
        env: &Environment,
    ) -> EnvironmentResult<Neighborhood> {
        let near = env.nodes_within_range_of(center, self.range)?;
        Ok(Neighborhood::with_neighbors(center, near))
    }

    fn is_locally_consistent(&self) -> bool {
        true
    }
}

/// Connects each node to its `n` closest nodes, symmetrically: two nodes are
/// linked when either is among the other's `n` closest.
///
/// Whether a distant node links to this one depends on everything around it,
/// so the rule is not locally consistent. The `n` closest of every node are
/// computed once per environment generation (O(N² log N)) and shared by all
/// the recomputations of a maintenance pass, each of which then costs O(n)
/// plus the number of nodes choosing the centre.
#[derive(Debug)]
pub struct ClosestN {
    n: usize,
    cache: Mutex<Option<Closest>>,
}

/// The `n` closest nodes of every node, and the reverse relation.
#[derive(Debug)]
struct Closest {
    generation: u64,
    chosen: HashMap<NodeId, Vec<NodeId>>,
    chosen_by: HashMap<NodeId, Vec<NodeId>>,
}

impl ClosestN {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            cache: Mutex::new(None),
        }
    }

    fn closest(&self, center: NodeId, env: &Environment) -> EnvironmentResult<Vec<NodeId>> {
        let origin = env.position(center)?;
        let mut others: Vec<(f64, NodeId)> = env
            .positions()
            .filter(|(id, _)| *id != center)
            .map(|(id, p)| (origin.distance_to(p), id))
            .collect();
        others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(others.into_iter().take(self.n).map(|(_, id)| id).collect())
    }

    fn compute_all(&self, env: &Environment) -> EnvironmentResult<Closest> {
        let mut chosen = HashMap::new();
        let mut chosen_by: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for id in env.node_ids() {
            let closest = self.closest(id, env)?;
            for &other in &closest {
                chosen_by.entry(other).or_default().push(id);
            }
            chosen.insert(id, closest);
        }
        Ok(Closest {
            generation: env.generation(),
            chosen,
            chosen_by,
        })
    }

    #[cfg(test)]
    fn cached_generation(&self) -> Option<u64> {
        self.cache.lock().as_ref().map(|c| c.generation)
    }
}

impl Clone for ClosestN {
    fn clone(&self) -> Self {
        Self::new(self.n)
    }
}

impl LinkingRule for ClosestN {
    fn compute_neighborhood(
        &self,
        center: NodeId,
        env: &Environment,
    ) -> EnvironmentResult<Neighborhood> {
        let mut cache = self.cache.lock();
        let stale = cache
            .as_ref()
            .map_or(true, |c| c.generation != env.generation());
        if stale {
            *cache = Some(self.compute_all(env)?);
        }
        let Some(closest) = cache.as_ref() else {
            return Ok(Neighborhood::new(center));
        };

        let mut neighbors: IndexSet<NodeId> = IndexSet::new();
        if let Some(own) = closest.chosen.get(&center) {
            neighbors.extend(own.iter().copied());
        }
        if let Some(choosers) = closest.chosen_by.get(&center) {
            neighbors.extend(choosers.iter().copied());
        }
        Ok(Neighborhood::with_neighbors(center, neighbors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_never_its_own_neighbor() {
        let center = NodeId::new();
        let other = NodeId::new();
        let mut hood = Neighborhood::with_neighbors(center, [center, other]);
        assert_eq!(hood.len(), 1);
        assert!(!hood.insert(center));
        assert!(hood.remove(other));
        assert!(hood.is_empty());
    }

    #[test]
    fn rules_declare_locality() {
        assert!(NoLinks.is_locally_consistent());
        assert!(ConnectWithinDistance::new(1.0).is_locally_consistent());
        assert!(!ClosestN::new(2).is_locally_consistent());
    }

    #[test]
    fn closest_sets_are_computed_once_per_generation() {
        let mut env = Environment::default();
        let ids: Vec<NodeId> = (0..4)
            .map(|i| {
                let node = crate::model::Node::new();
                let id = node.id();
                env.add_node(node, [i as f64 * 2.0, 0.0]).unwrap();
                id
            })
            .collect();

        let rule = ClosestN::new(1);
        assert_eq!(rule.cached_generation(), None);
        let first = rule.compute_neighborhood(ids[0], &env).unwrap();
        let generation = env.generation();
        assert_eq!(rule.cached_generation(), Some(generation));
        assert_eq!(first.iter().collect::<Vec<_>>(), vec![ids[1]]);

        // ids[1] is chosen by ids[0] and ids[2]; it chooses ids[0].
        let second = rule.compute_neighborhood(ids[1], &env).unwrap();
        assert_eq!(rule.cached_generation(), Some(generation));
        assert_eq!(second.len(), 2);
        assert!(second.contains(ids[0]) && second.contains(ids[2]));

        env.move_node_to(ids[3], [-1.0, 0.0]).unwrap();
        assert!(env.generation() > generation);
        let moved = rule.compute_neighborhood(ids[0], &env).unwrap();
        assert_eq!(rule.cached_generation(), Some(env.generation()));
        assert!(moved.contains(ids[3]));
    }
}
