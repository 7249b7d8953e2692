//! Time Distributions
//!
//! A time distribution produces a reaction's next firing time. Rate models
//! (Markovian, trace-driven, ...) plug in through [`TimeDistribution`]; the
//! two implementations here are the deterministic ones the kernel itself
//! needs for tests and simple models.

use crate::environment::Environment;
use crate::time::Time;

/// Strategy producing the next `tau` of a reaction.
pub trait TimeDistribution: Send {
    /// The currently scheduled occurrence.
    fn next_occurrence(&self) -> Time;

    /// Recompute the next occurrence. See [`Reaction::update`] for the
    /// meaning of `executed`.
    ///
    /// [`Reaction::update`]: crate::model::Reaction::update
    fn update(&mut self, now: Time, executed: bool, env: &Environment);
}

/// Fires at `start`, then every `period` time units.
#[derive(Debug, Clone)]
pub struct DiracComb {
    start: Time,
    period: f64,
    next: Time,
    initialized: bool,
}

impl DiracComb {
    /// Create a comb starting at `start` with the given period.
    ///
    /// A non-positive or non-finite period makes the reaction dormant after
    /// its first occurrence.
    pub fn new(start: f64, period: f64) -> Self {
        Self {
            start: Time::new(start),
            period,
            next: Time::new(start),
            initialized: false,
        }
    }

    /// Create a comb starting at zero with the given rate (events per unit
    /// of time).
    pub fn with_rate(rate: f64) -> Self {
        Self::new(0.0, 1.0 / rate)
    }
}

impl TimeDistribution for DiracComb {
    fn next_occurrence(&self) -> Time {
        self.next
    }

    fn update(&mut self, now: Time, executed: bool, _env: &Environment) {
        if !self.initialized {
            // The first virtual execution schedules the start, never earlier
            // than the current clock.
            self.initialized = true;
            self.next = self.start.max(now);
            return;
        }
        if executed {
            self.next = if self.period.is_finite() && self.period > 0.0 {
                now + self.period
            } else {
                Time::INFINITY
            };
        }
    }
}

/// Fires exactly once at a given time, then stays dormant.
#[derive(Debug, Clone)]
pub struct Trigger {
    at: Time,
    next: Time,
    initialized: bool,
}

impl Trigger {
    /// Create a trigger firing at `at`.
    pub fn new(at: f64) -> Self {
        Self {
            at: Time::new(at),
            next: Time::new(at),
            initialized: false,
        }
    }
}

impl TimeDistribution for Trigger {
    fn next_occurrence(&self) -> Time {
        self.next
    }

    fn update(&mut self, now: Time, executed: bool, _env: &Environment) {
        if !self.initialized {
            self.initialized = true;
            self.next = self.at.max(now);
        } else if executed {
            self.next = Time::INFINITY;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comb_starts_then_repeats() {
        let env = Environment::default();
        let mut comb = DiracComb::new(1.0, 0.5);
        comb.update(Time::ZERO, true, &env);
        assert_eq!(comb.next_occurrence(), Time::new(1.0));

        // Revisits that are not executions leave the schedule alone.
        comb.update(Time::new(0.5), false, &env);
        assert_eq!(comb.next_occurrence(), Time::new(1.0));

        comb.update(Time::new(1.0), true, &env);
        assert_eq!(comb.next_occurrence(), Time::new(1.5));
    }

    #[test]
    fn comb_with_zero_period_goes_dormant() {
        let env = Environment::default();
        let mut comb = DiracComb::new(0.0, 0.0);
        comb.update(Time::ZERO, true, &env);
        comb.update(Time::ZERO, true, &env);
        assert_eq!(comb.next_occurrence(), Time::INFINITY);
    }

    #[test]
    fn trigger_fires_once() {
        let env = Environment::default();
        let mut trigger = Trigger::new(3.0);
        trigger.update(Time::ZERO, true, &env);
        assert_eq!(trigger.next_occurrence(), Time::new(3.0));
        trigger.update(Time::new(3.0), true, &env);
        assert_eq!(trigger.next_occurrence(), Time::INFINITY);
    }
}
