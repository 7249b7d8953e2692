//! Positions in a Euclidean space of any (fixed) dimensionality.

use std::fmt;

use smallvec::SmallVec;

/// A point in the environment.
///
/// Coordinates are stored inline for up to three dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    coords: SmallVec<[f64; 3]>,
}

impl Position {
    /// Create a position from its coordinates.
    pub fn new(coords: impl IntoIterator<Item = f64>) -> Self {
        Self {
            coords: coords.into_iter().collect(),
        }
    }

    /// The origin of a `dimensions`-dimensional space.
    pub fn origin(dimensions: usize) -> Self {
        Self {
            coords: SmallVec::from_elem(0.0, dimensions),
        }
    }

    /// Number of coordinates.
    pub fn dimensions(&self) -> usize {
        self.coords.len()
    }

    /// The coordinates.
    pub fn coordinates(&self) -> &[f64] {
        &self.coords
    }

    /// Whether every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.coords.iter().all(|c| c.is_finite())
    }

    /// Euclidean distance to `other`. Extra coordinates of the longer
    /// position are ignored.
    pub fn distance_to(&self, other: &Position) -> f64 {
        self.coords
            .iter()
            .zip(other.coords.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// This position displaced by `delta`.
    pub fn translated(&self, delta: &Position) -> Position {
        Self {
            coords: self
                .coords
                .iter()
                .zip(delta.coords.iter())
                .map(|(a, b)| a + b)
                .collect(),
        }
    }

    /// Raw bit patterns of the coordinates, used as a hashable key.
    pub(crate) fn bits(&self) -> SmallVec<[u64; 3]> {
        self.coords.iter().map(|c| c.to_bits()).collect()
    }
}

impl<const N: usize> From<[f64; N]> for Position {
    fn from(coords: [f64; N]) -> Self {
        Self::new(coords)
    }
}

impl From<Vec<f64>> for Position {
    fn from(coords: Vec<f64>) -> Self {
        Self::new(coords)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_and_translation() {
        let a = Position::from([0.0, 0.0]);
        let b = Position::from([3.0, 4.0]);
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(a.translated(&b), b);
        assert_eq!(Position::origin(2), a);
        assert_eq!(b.to_string(), "(3, 4)");
    }

    #[test]
    fn finiteness() {
        assert!(Position::from([1.0, -2.0]).is_finite());
        assert!(!Position::from([f64::NAN, 0.0]).is_finite());
        assert!(!Position::from([0.0, f64::INFINITY]).is_finite());
    }
}
