//! Engine status and its broadcast.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle of an engine.
///
/// ```text
/// Init -> Ready -> Running <-> Paused -> Stopped
/// ```
///
/// Every status can move to `Stopped`. Moving backwards is refused, except
/// between `Running` and `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Built, not yet initialized.
    Init,
    /// Initialized, waiting for a play command.
    Ready,
    /// Firing reactions.
    Running,
    /// Waiting for a play command.
    Paused,
    /// Finished. Terminal.
    Stopped,
}

impl Status {
    fn rank(self) -> u8 {
        match self {
            Status::Init => 0,
            Status::Ready => 1,
            Status::Running | Status::Paused => 2,
            Status::Stopped => 3,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_move_to(self, next: Status) -> bool {
        next.rank() > self.rank()
            || matches!(
                (self, next),
                (Status::Running, Status::Paused) | (Status::Paused, Status::Running)
            )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared status cell.
///
/// Threads block on it with [`StatusMonitor::wait_for`]; async code
/// subscribes to a `watch` channel carrying the same transitions.
pub struct StatusMonitor {
    state: Mutex<Status>,
    changed: Condvar,
    broadcast: watch::Sender<Status>,
}

impl StatusMonitor {
    pub fn new() -> Self {
        let (broadcast, _) = watch::channel(Status::Init);
        Self {
            state: Mutex::new(Status::Init),
            changed: Condvar::new(),
            broadcast,
        }
    }

    /// The current status.
    pub fn get(&self) -> Status {
        *self.state.lock()
    }

    /// Move to `next`. Returns whether the transition was applied.
    ///
    /// Setting the current status again is accepted and does nothing.
    pub fn set(&self, next: Status) -> bool {
        let mut state = self.state.lock();
        let current = *state;
        if current == next {
            return true;
        }
        if !current.can_move_to(next) {
            warn!(from = %current, to = %next, "Ignoring illegal status transition");
            return false;
        }
        *state = next;
        self.broadcast.send_replace(next);
        self.changed.notify_all();
        debug!(from = %current, to = %next, "Status changed");
        true
    }

    /// Block until the status is `target` or `Stopped`, or until `timeout`
    /// elapses. Returns the status observed last.
    pub fn wait_for(&self, target: Status, timeout: Option<Duration>) -> Status {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while *state != target && *state != Status::Stopped {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
        *state
    }

    /// A receiver that observes every future transition.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.broadcast.subscribe()
    }
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusMonitor").field("status", &self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn transitions() {
        assert!(Status::Init.can_move_to(Status::Ready));
        assert!(Status::Running.can_move_to(Status::Paused));
        assert!(Status::Paused.can_move_to(Status::Running));
        assert!(Status::Ready.can_move_to(Status::Stopped));

        // No way back.
        assert!(!Status::Running.can_move_to(Status::Ready));
        assert!(!Status::Stopped.can_move_to(Status::Running));
    }

    #[test]
    fn illegal_transitions_are_ignored() {
        let monitor = StatusMonitor::new();
        assert!(monitor.set(Status::Ready));
        assert!(!monitor.set(Status::Init));
        assert_eq!(monitor.get(), Status::Ready);
    }

    #[test]
    fn wait_for_wakes_on_transition() {
        let monitor = Arc::new(StatusMonitor::new());
        let setter = Arc::clone(&monitor);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set(Status::Ready);
            setter.set(Status::Running);
        });

        let seen = monitor.wait_for(Status::Running, Some(Duration::from_secs(5)));
        worker.join().unwrap();
        assert_eq!(seen, Status::Running);
    }

    #[test]
    fn wait_for_times_out() {
        let monitor = StatusMonitor::new();
        let seen = monitor.wait_for(Status::Running, Some(Duration::from_millis(10)));
        assert_eq!(seen, Status::Init);
    }

    #[test]
    fn stopped_releases_waiters() {
        let monitor = StatusMonitor::new();
        monitor.set(Status::Stopped);
        assert_eq!(monitor.wait_for(Status::Paused, None), Status::Stopped);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let monitor = StatusMonitor::new();
        let mut rx = monitor.subscribe();
        monitor.set(Status::Ready);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Status::Ready);
    }
}
