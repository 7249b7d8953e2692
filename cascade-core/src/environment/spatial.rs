//! Spatial Index
//!
//! A uniform grid of buckets. Each node lives in the cell containing its
//! position; a range query visits only the cells overlapping the query's
//! bounding box and returns their occupants as *candidates*. The caller does
//! the exact distance check against the authoritative positions.
//!
//! When the bounding box spans more cells than are occupied (huge radius,
//! sparse population), the query walks the occupied cells instead.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::position::Position;
use crate::error::{EnvironmentError, EnvironmentResult};
use crate::model::NodeId;

type Cell = SmallVec<[i64; 3]>;

/// Grid-bucketed index over node positions.
#[derive(Debug)]
pub struct GridIndex {
    cell_size: f64,
    cells: HashMap<Cell, IndexSet<NodeId>>,
    located: HashMap<NodeId, Cell>,
}

impl GridIndex {
    /// Create an empty index with the given cell edge length.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            located: HashMap::new(),
        }
    }

    fn cell_of(&self, position: &Position) -> Cell {
        position
            .coordinates()
            .iter()
            .map(|c| (c / self.cell_size).floor() as i64)
            .collect()
    }

    /// Add a node at `position`.
    pub fn insert(&mut self, id: NodeId, position: &Position) {
        let cell = self.cell_of(position);
        self.cells.entry(cell.clone()).or_default().insert(id);
        self.located.insert(id, cell);
    }

    /// Remove a node.
    pub fn remove(&mut self, id: NodeId) -> EnvironmentResult<()> {
        let cell = self
            .located
            .remove(&id)
            .ok_or(EnvironmentError::NotIndexed { id })?;
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.shift_remove(&id);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
        Ok(())
    }

    /// Move a node to `position`.
    pub fn relocate(&mut self, id: NodeId, position: &Position) -> EnvironmentResult<()> {
        let target = self.cell_of(position);
        match self.located.get(&id) {
            None => Err(EnvironmentError::NotIndexed { id }),
            Some(current) if *current == target => Ok(()),
            Some(_) => {
                self.remove(id)?;
                self.insert(id, position);
                Ok(())
            }
        }
    }

    /// Whether a node is indexed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.located.contains_key(&id)
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.located.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.located.is_empty()
    }

    /// Nodes in every cell overlapping the box `center ± range`.
    pub fn candidates(&self, center: &Position, range: f64) -> Vec<NodeId> {
        let lo: Cell = center
            .coordinates()
            .iter()
            .map(|c| ((c - range) / self.cell_size).floor() as i64)
            .collect();
        let hi: Cell = center
            .coordinates()
            .iter()
            .map(|c| ((c + range) / self.cell_size).floor() as i64)
            .collect();

        let spanned = lo
            .iter()
            .zip(hi.iter())
            .map(|(l, h)| (*h as i128 - *l as i128 + 1).max(0) as u128)
            .fold(1u128, |acc, n| acc.saturating_mul(n));

        let mut found = Vec::new();
        if spanned > self.cells.len() as u128 {
            for (cell, bucket) in &self.cells {
                let inside = cell
                    .iter()
                    .zip(lo.iter().zip(hi.iter()))
                    .all(|(c, (l, h))| l <= c && c <= h);
                if inside {
                    found.extend(bucket.iter().copied());
                }
            }
            return found;
        }

        // Odometer over the cells of the box.
        let mut cursor = lo.clone();
        loop {
            if let Some(bucket) = self.cells.get(&cursor) {
                found.extend(bucket.iter().copied());
            }
            let mut axis = 0;
            loop {
                if axis == cursor.len() {
                    return found;
                }
                if cursor[axis] < hi[axis] {
                    cursor[axis] += 1;
                    break;
                }
                cursor[axis] = lo[axis];
                axis += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_cover_the_box() {
        let mut index = GridIndex::new(1.0);
        let near = NodeId::new();
        let far = NodeId::new();
        index.insert(near, &Position::from([0.5, 0.5]));
        index.insert(far, &Position::from([10.5, 0.5]));

        let found = index.candidates(&Position::from([0.0, 0.0]), 1.0);
        assert!(found.contains(&near));
        assert!(!found.contains(&far));

        // A huge radius falls back to scanning occupied cells.
        let found = index.candidates(&Position::from([0.0, 0.0]), 1e9);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn relocate_and_remove() {
        let mut index = GridIndex::new(1.0);
        let id = NodeId::new();
        index.insert(id, &Position::from([0.5, 0.5]));
        index.relocate(id, &Position::from([5.5, 5.5])).unwrap();

        assert!(index.candidates(&Position::from([0.5, 0.5]), 0.5).is_empty());
        assert_eq!(index.candidates(&Position::from([5.5, 5.5]), 0.5), vec![id]);

        index.remove(id).unwrap();
        assert!(index.is_empty());
        assert!(matches!(
            index.remove(id),
            Err(EnvironmentError::NotIndexed { .. })
        ));
        assert!(index.relocate(id, &Position::from([0.0, 0.0])).is_err());
    }
}
