//! Simulation Time
//!
//! A `Time` is a point on the simulated clock. It wraps an `f64` but, unlike
//! the raw float, it is totally ordered (via `f64::total_cmp`) so it can be
//! used as a heap key, and it can be `+∞` to mean "never".

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

/// A point in simulated time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Time(f64);

impl Time {
    /// The start of every simulation.
    pub const ZERO: Time = Time(0.0);

    /// A time that is never reached. Reactions scheduled here are dormant.
    pub const INFINITY: Time = Time(f64::INFINITY);

    /// Create a new time value.
    ///
    /// NaN is mapped to `+∞` so that a broken rate computation parks the
    /// reaction instead of corrupting the ordering.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::INFINITY
        } else {
            Self(value)
        }
    }

    /// Get the raw value.
    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// Whether this time will ever be reached.
    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }
}

impl From<f64> for Time {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl Add<f64> for Time {
    type Output = Time;

    fn add(self, rhs: f64) -> Time {
        Time::new(self.0 + rhs)
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinity_sorts_last() {
        let mut times = vec![Time::INFINITY, Time::new(2.0), Time::ZERO];
        times.sort();
        assert_eq!(times, vec![Time::ZERO, Time::new(2.0), Time::INFINITY]);
        assert!(!Time::INFINITY.is_finite());
    }

    #[test]
    fn nan_is_parked_at_infinity() {
        assert_eq!(Time::new(f64::NAN), Time::INFINITY);
        assert_eq!(Time::new(1.0) + f64::NAN, Time::INFINITY);
    }

    #[test]
    fn addition_advances() {
        assert_eq!(Time::new(1.5) + 0.5, Time::new(2.0));
    }
}
