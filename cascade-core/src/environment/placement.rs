//! Placement policies: where a node may be put, and where it actually lands.

use super::position::Position;

/// Admission and snapping of node positions.
pub trait Placement: Send + Sync {
    /// Whether a node may be placed at `position` at all.
    fn admit(&self, _position: &Position) -> bool {
        true
    }

    /// The position a node requested at `position` actually gets.
    fn place(&self, position: Position) -> Position {
        position
    }
}

/// Any position is fine and kept as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl Placement for Unbounded {}

/// An axis-aligned box. Positions outside are either refused or clamped to
/// the boundary.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    min: Position,
    max: Position,
    clamp: bool,
}

impl BoundingBox {
    /// A box refusing positions outside `[min, max]`.
    pub fn rejecting(min: impl Into<Position>, max: impl Into<Position>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            clamp: false,
        }
    }

    /// A box pulling positions outside `[min, max]` back onto its boundary.
    pub fn clamping(min: impl Into<Position>, max: impl Into<Position>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            clamp: true,
        }
    }

    fn contains(&self, position: &Position) -> bool {
        position
            .coordinates()
            .iter()
            .zip(self.min.coordinates().iter().zip(self.max.coordinates()))
            .all(|(c, (lo, hi))| lo <= c && c <= hi)
    }
}

impl Placement for BoundingBox {
    fn admit(&self, position: &Position) -> bool {
        self.clamp || self.contains(position)
    }

    fn place(&self, position: Position) -> Position {
        if !self.clamp {
            return position;
        }
        Position::new(
            position
                .coordinates()
                .iter()
                .zip(self.min.coordinates().iter().zip(self.max.coordinates()))
                .map(|(c, (lo, hi))| c.clamp(*lo, *hi)),
        )
    }
}
