//! Output monitors
//!
//! Observers notified as the simulation progresses. They are called on the
//! engine's driving thread with the environment borrowed immutably, so a
//! monitor must not block for long.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::environment::Environment;
use crate::model::Reaction;
use crate::time::Time;

/// Receives simulation progress. Every method defaults to doing nothing.
pub trait OutputMonitor: Send + Sync {
    /// The engine is initialized and about to wait for commands.
    fn initialized(&self, _env: &Environment) {}

    /// A step completed. `reaction` is the one selected for the step.
    fn step_done(&self, _env: &Environment, _reaction: Option<&dyn Reaction>, _time: Time, _step: u64) {}

    /// The engine stopped, normally or on error.
    fn finished(&self, _env: &Environment, _time: Time, _step: u64) {}
}

/// Identifier of a registered monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(u64);

impl MonitorId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Registered monitors, shared between the engine and its handles.
#[derive(Clone, Default)]
pub(crate) struct MonitorRegistry {
    inner: Arc<RwLock<IndexMap<MonitorId, Arc<dyn OutputMonitor>>>>,
}

impl MonitorRegistry {
    pub(crate) fn insert(&self, id: MonitorId, monitor: Arc<dyn OutputMonitor>) {
        self.inner.write().insert(id, monitor);
    }

    pub(crate) fn remove(&self, id: MonitorId) -> bool {
        self.inner.write().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Call `f` on every monitor in registration order.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&dyn OutputMonitor)) {
        for monitor in self.inner.read().values() {
            f(monitor.as_ref());
        }
    }
}
