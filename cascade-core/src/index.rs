//! Reaction Index
//!
//! The time-ordered priority structure the engine pulls the next event from.
//!
//! # Algorithm
//!
//! An indexed binary min-heap: a `Vec` holding the heap and a map from
//! reaction id to its slot in that `Vec`. The map turns "the tau of this
//! reaction changed" into an O(log n) sift from a known slot instead of a
//! linear search.
//!
//! - `peek`: O(1), the root.
//! - `insert`: push at the end, sift up.
//! - `update`: overwrite tau in place, sift up or down.
//! - `remove`: swap with the last slot, pop, sift the moved entry.
//!
//! # Ordering
//!
//! Entries are ordered by `(tau, sequence)` where `sequence` is assigned at
//! insertion and kept across updates. Simultaneous reactions therefore come
//! out in insertion order, which keeps runs reproducible. Entries at `+∞` are
//! kept like any other and simply sort last.

use std::collections::HashMap;

use crate::error::IndexError;
use crate::model::ReactionId;
use crate::time::Time;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: ReactionId,
    tau: Time,
    sequence: u64,
}

impl Entry {
    fn key(&self) -> (Time, u64) {
        (self.tau, self.sequence)
    }
}

/// Indexed min-heap of reactions keyed by their next firing time.
#[derive(Debug, Default)]
pub struct ReactionIndex {
    heap: Vec<Entry>,
    slots: HashMap<ReactionId, usize>,
    next_sequence: u64,
}

impl ReactionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed reactions.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: ReactionId) -> bool {
        self.slots.contains_key(&id)
    }

    /// The scheduled time of `id`.
    pub fn tau_of(&self, id: ReactionId) -> Option<Time> {
        self.slots.get(&id).map(|&slot| self.heap[slot].tau)
    }

    /// The reaction with the smallest tau, ties broken by insertion order.
    pub fn peek(&self) -> Option<(ReactionId, Time)> {
        self.heap.first().map(|e| (e.id, e.tau))
    }

    /// Add a reaction.
    pub fn insert(&mut self, id: ReactionId, tau: Time) -> Result<(), IndexError> {
        if self.slots.contains_key(&id) {
            return Err(IndexError::Duplicate { id });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let slot = self.heap.len();
        self.heap.push(Entry { id, tau, sequence });
        self.slots.insert(id, slot);
        self.sift_up(slot);
        Ok(())
    }

    /// Move a reaction to a new tau.
    pub fn update(&mut self, id: ReactionId, tau: Time) -> Result<(), IndexError> {
        let slot = *self.slots.get(&id).ok_or(IndexError::Unknown { id })?;
        let previous = self.heap[slot].tau;
        self.heap[slot].tau = tau;
        if tau < previous {
            self.sift_up(slot);
        } else {
            self.sift_down(slot);
        }
        Ok(())
    }

    /// Drop a reaction, returning its last tau.
    pub fn remove(&mut self, id: ReactionId) -> Result<Time, IndexError> {
        let slot = self.slots.remove(&id).ok_or(IndexError::Unknown { id })?;
        let last = self.heap.len() - 1;
        self.heap.swap(slot, last);
        let removed = self.heap.pop().map(|e| e.tau).unwrap_or(Time::INFINITY);

        if slot < self.heap.len() {
            let moved = self.heap[slot].id;
            self.slots.insert(moved, slot);
            // The moved entry may belong above or below its new slot.
            self.sift_up(slot);
            let settled = self.slots[&moved];
            self.sift_down(settled);
        }
        Ok(removed)
    }

    /// Every indexed reaction and its tau, in heap order.
    pub fn iter(&self) -> impl Iterator<Item = (ReactionId, Time)> + '_ {
        self.heap.iter().map(|e| (e.id, e.tau))
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.slots.insert(self.heap[a].id, a);
        self.slots.insert(self.heap[b].id, b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.heap[slot].key() < self.heap[parent].key() {
                self.swap(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < len && self.heap[left].key() < self.heap[smallest].key() {
                smallest = left;
            }
            if right < len && self.heap[right].key() < self.heap[smallest].key() {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    #[cfg(test)]
    fn is_heap(&self) -> bool {
        (1..self.heap.len()).all(|i| self.heap[(i - 1) / 2].key() <= self.heap[i].key())
            && self.slots.iter().all(|(id, &slot)| self.heap[slot].id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<ReactionId> {
        (0..n).map(|_| ReactionId::new()).collect()
    }

    #[test]
    fn peek_returns_minimum() {
        let mut index = ReactionIndex::new();
        let r = ids(3);
        index.insert(r[0], Time::new(3.0)).unwrap();
        index.insert(r[1], Time::new(1.0)).unwrap();
        index.insert(r[2], Time::new(2.0)).unwrap();

        assert_eq!(index.peek(), Some((r[1], Time::new(1.0))));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn ties_follow_insertion_order() {
        let mut index = ReactionIndex::new();
        let r = ids(3);
        for id in &r {
            index.insert(*id, Time::new(1.0)).unwrap();
        }
        assert_eq!(index.peek().unwrap().0, r[0]);

        // Updating keeps the original sequence number.
        index.update(r[0], Time::new(2.0)).unwrap();
        assert_eq!(index.peek().unwrap().0, r[1]);
        index.update(r[0], Time::new(1.0)).unwrap();
        assert_eq!(index.peek().unwrap().0, r[0]);
    }

    #[test]
    fn update_and_remove() {
        let mut index = ReactionIndex::new();
        let r = ids(4);
        for (i, id) in r.iter().enumerate() {
            index.insert(*id, Time::new(i as f64)).unwrap();
        }

        index.update(r[3], Time::new(-1.0)).unwrap();
        assert_eq!(index.peek().unwrap().0, r[3]);

        assert_eq!(index.remove(r[3]).unwrap(), Time::new(-1.0));
        assert_eq!(index.peek().unwrap().0, r[0]);
        assert!(!index.contains(r[3]));
        assert!(index.is_heap());
    }

    #[test]
    fn dormant_reactions_are_kept() {
        let mut index = ReactionIndex::new();
        let r = ids(2);
        index.insert(r[0], Time::INFINITY).unwrap();
        index.insert(r[1], Time::new(5.0)).unwrap();
        assert_eq!(index.peek().unwrap().0, r[1]);

        index.update(r[1], Time::INFINITY).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.peek().unwrap().1, Time::INFINITY);
    }

    #[test]
    fn misuse_is_reported() {
        let mut index = ReactionIndex::new();
        let id = ReactionId::new();
        index.insert(id, Time::ZERO).unwrap();
        assert!(matches!(
            index.insert(id, Time::ZERO),
            Err(IndexError::Duplicate { .. })
        ));
        index.remove(id).unwrap();
        assert!(matches!(index.remove(id), Err(IndexError::Unknown { .. })));
        assert!(matches!(
            index.update(id, Time::ZERO),
            Err(IndexError::Unknown { .. })
        ));
        assert!(index.peek().is_none());
    }

    proptest! {
        #[test]
        fn always_yields_exact_minimum(
            taus in prop::collection::vec(0.0f64..100.0, 1..64),
            updates in prop::collection::vec((any::<prop::sample::Index>(), 0.0f64..100.0), 0..64),
            removals in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
        ) {
            let mut index = ReactionIndex::new();
            let mut live: Vec<(ReactionId, f64)> = Vec::new();
            for tau in taus {
                let id = ReactionId::new();
                index.insert(id, Time::new(tau)).unwrap();
                live.push((id, tau));
            }
            for (which, tau) in updates {
                let slot = which.index(live.len());
                index.update(live[slot].0, Time::new(tau)).unwrap();
                live[slot].1 = tau;
            }
            for which in removals {
                if live.len() <= 1 {
                    break;
                }
                let (id, _) = live.remove(which.index(live.len()));
                index.remove(id).unwrap();
            }

            prop_assert!(index.is_heap());
            let expected = live.iter().map(|(_, t)| *t).fold(f64::INFINITY, f64::min);
            prop_assert_eq!(index.peek().unwrap().1, Time::new(expected));
        }
    }
}
