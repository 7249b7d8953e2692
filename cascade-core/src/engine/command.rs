//! Commands and the engine handle
//!
//! Other threads never touch the engine directly. They send [`Command`]s
//! through an unbounded FIFO channel and the engine applies them on its own
//! thread, between two steps.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::sync::watch;
use tracing::debug;

use super::monitor::{MonitorId, MonitorRegistry, OutputMonitor};
use super::status::{Status, StatusMonitor};
use super::{Breakpoint, Engine};
use crate::time::Time;

/// A deferred operation applied by the engine between steps.
pub trait Command: Send + 'static {
    fn apply(self: Box<Self>, engine: &mut Engine);
}

impl<F> Command for F
where
    F: FnOnce(&mut Engine) + Send + 'static,
{
    fn apply(self: Box<Self>, engine: &mut Engine) {
        (*self)(engine)
    }
}

pub(crate) type BoxedCommand = Box<dyn Command>;

/// Thread-safe control surface of a running engine.
///
/// Control calls return `false` when the engine is gone and the command
/// could not be delivered.
#[derive(Clone)]
pub struct EngineHandle {
    commands: Sender<BoxedCommand>,
    status: Arc<StatusMonitor>,
    monitors: MonitorRegistry,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: Sender<BoxedCommand>,
        status: Arc<StatusMonitor>,
        monitors: MonitorRegistry,
    ) -> Self {
        Self {
            commands,
            status,
            monitors,
        }
    }

    /// Queue an arbitrary command.
    pub fn schedule(&self, command: impl Command) -> bool {
        self.commands.send(Box::new(command)).is_ok()
    }

    /// Start or resume firing reactions.
    pub fn play(&self) -> bool {
        self.schedule(|engine: &mut Engine| {
            engine.set_status(Status::Running);
        })
    }

    /// Pause after the current step.
    pub fn pause(&self) -> bool {
        self.schedule(|engine: &mut Engine| {
            engine.set_status(Status::Paused);
        })
    }

    /// Stop the engine. Pending commands are discarded.
    pub fn terminate(&self) -> bool {
        self.schedule(|engine: &mut Engine| {
            engine.set_status(Status::Stopped);
        })
    }

    /// Run until `step` steps have been performed, then pause.
    pub fn run_until_step(&self, step: u64) -> bool {
        self.schedule(move |engine: &mut Engine| {
            engine.set_breakpoint(Breakpoint::Step(step));
        })
    }

    /// Run until the clock reaches `time`, then pause.
    pub fn run_until_time(&self, time: impl Into<Time>) -> bool {
        let time = time.into();
        self.schedule(move |engine: &mut Engine| {
            engine.set_breakpoint(Breakpoint::Time(time));
        })
    }

    /// The current status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Block until the engine reaches `status` (or `Stopped`), or until
    /// `timeout` elapses. Returns the status observed last.
    pub fn wait_for(&self, status: Status, timeout: Option<Duration>) -> Status {
        self.status.wait_for(status, timeout)
    }

    /// Async view of the status.
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Register a monitor. It takes effect between two steps.
    ///
    /// A monitor that arrives after the engine has initialized is sent
    /// `initialized` on registration.
    pub fn add_monitor(&self, monitor: Arc<dyn OutputMonitor>) -> MonitorId {
        let id = MonitorId::new();
        let registry = self.monitors.clone();
        self.schedule(move |engine: &mut Engine| {
            if engine.status() != Status::Init {
                monitor.initialized(engine.environment());
            }
            registry.insert(id, monitor);
            debug!(monitor = %id, "Monitor registered");
        });
        id
    }

    /// Unregister a monitor. It takes effect between two steps.
    pub fn remove_monitor(&self, id: MonitorId) -> bool {
        let registry = self.monitors.clone();
        self.schedule(move |_: &mut Engine| {
            registry.remove(id);
        })
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("status", &self.status.get())
            .field("pending", &self.commands.len())
            .finish()
    }
}
