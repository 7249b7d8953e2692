//! Range-query cache.
//!
//! Many reactions ask the same question ("who is within `r` of here?")
//! between two position changes. Answers are memoised in a small LRU keyed by
//! the exact query geometry and dropped wholesale whenever any position
//! changes.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::position::Position;
use crate::model::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RangeKey {
    center: SmallVec<[u64; 3]>,
    range: u64,
}

impl RangeKey {
    pub(crate) fn new(center: &Position, range: f64) -> Self {
        Self {
            center: center.bits(),
            range: range.to_bits(),
        }
    }
}

/// Bounded least-recently-used cache of range query results.
#[derive(Debug)]
pub(crate) struct RangeCache {
    capacity: usize,
    entries: IndexMap<RangeKey, Arc<[NodeId]>>,
}

impl RangeCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Look up a query, marking it as most recently used.
    pub(crate) fn get(&mut self, key: &RangeKey) -> Option<Arc<[NodeId]>> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, v)| Arc::clone(v))
    }

    /// Store a result, evicting the least recently used entry when full.
    pub(crate) fn insert(&mut self, key: RangeKey, result: Arc<[NodeId]>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, result);
    }

    /// Drop every entry.
    pub(crate) fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: f64) -> RangeKey {
        RangeKey::new(&Position::from([x, 0.0]), 1.0)
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = RangeCache::new(2);
        let id = NodeId::new();
        cache.insert(key(0.0), Arc::from(vec![id]));
        cache.insert(key(1.0), Arc::from(vec![]));

        // Touch the first entry so the second becomes the oldest.
        assert_eq!(cache.get(&key(0.0)).unwrap().as_ref(), &[id]);
        cache.insert(key(2.0), Arc::from(vec![]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0.0)).is_some());
        assert!(cache.get(&key(1.0)).is_none());
        assert!(cache.get(&key(2.0)).is_some());
    }

    #[test]
    fn invalidation_is_wholesale() {
        let mut cache = RangeCache::new(4);
        cache.insert(key(0.0), Arc::from(vec![]));
        cache.insert(key(1.0), Arc::from(vec![]));
        cache.invalidate();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = RangeCache::new(0);
        cache.insert(key(0.0), Arc::from(vec![]));
        assert!(cache.get(&key(0.0)).is_none());
    }
}
