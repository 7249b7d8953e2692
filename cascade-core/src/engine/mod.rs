//! Engine
//!
//! The engine owns an [`Environment`] and drives it forward one reaction at
//! a time.
//!
//! # How It Works
//!
//! 1. On construction the engine attaches itself to the environment, builds a
//!    dependency handle for every reaction and performs a virtual first
//!    execution (`update(0, true)`) so every reaction has a `tau`.
//!
//! 2. [`Engine::run`] initializes the monitors, moves to `Ready` and waits
//!    for commands. While `Running`, each iteration:
//!    a. drains the command queue
//!    b. selects the reaction with the smallest `tau`
//!    c. advances the clock and checks the reaction's conditions
//!    d. fires it, applies the structural changes it caused, then updates it
//!       and every reaction it influences
//!    e. notifies the monitors
//!
//! 3. The loop stops when the step budget is spent, the next `tau` lies past
//!    the final time or at `+∞`, a terminate command arrives, or an error
//!    occurs. Monitors are told in every case.
//!
//! # Thread Safety
//!
//! The engine runs on one driving thread. Other threads control it through
//! an [`EngineHandle`]: commands travel over a channel and are applied
//! between steps, and status changes are published both to blocking waiters
//! and to async `watch` subscribers.
//!
//! With `worker_threads > 1` the updates after a firing fan out to a rayon
//! pool. An update task receives `&Environment`, so node quantities,
//! positions and the graph are read-only for the whole phase; the only
//! state a task writes is its own reaction's schedule. The write-sets of
//! two tasks are therefore disjoint exactly when they update different
//! reactions, which is what the debug assertion in the update phase checks.
//! Influenced reactions may well influence each other; that does not make
//! their writes overlap.

mod command;
mod monitor;
mod status;

pub use command::{Command, EngineHandle};
pub use monitor::{MonitorId, OutputMonitor};
pub use status::{Status, StatusMonitor};

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexSet;
use rayon::ThreadPool;
use tracing::{debug, error, info, trace};

use command::BoxedCommand;
use monitor::MonitorRegistry;
use crate::config::EngineConfig;
use crate::environment::{Environment, EnvironmentEvent};
use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::index::ReactionIndex;
use crate::model::{NodeId, ReactionId, SharedReaction};
use crate::time::Time;

/// A pause point requested through [`EngineHandle::run_until_step`] or
/// [`EngineHandle::run_until_time`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Breakpoint {
    Step(u64),
    Time(Time),
}

/// The discrete-event scheduler.
pub struct Engine {
    config: EngineConfig,
    environment: Environment,
    graph: DependencyGraph,
    index: ReactionIndex,
    time: Time,
    step: u64,
    status: Arc<StatusMonitor>,
    monitors: MonitorRegistry,
    sender: Sender<BoxedCommand>,
    commands: Receiver<BoxedCommand>,
    breakpoint: Option<Breakpoint>,
    workers: Option<ThreadPool>,
}

impl Engine {
    /// Take ownership of `environment` and schedule every reaction in it.
    pub fn new(mut environment: Environment, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        environment.attach_scheduler();

        let workers = if config.is_parallel() {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.worker_threads)
                    .thread_name(|i| format!("cascade-worker-{i}"))
                    .build()?,
            )
        } else {
            None
        };

        let (sender, commands) = crossbeam_channel::unbounded();
        let mut engine = Self {
            config,
            environment,
            graph: DependencyGraph::new(),
            index: ReactionIndex::new(),
            time: Time::ZERO,
            step: 0,
            status: Arc::new(StatusMonitor::new()),
            monitors: MonitorRegistry::default(),
            sender,
            commands,
            breakpoint: None,
            workers,
        };

        let reactions: Vec<SharedReaction> = engine
            .environment
            .nodes()
            .flat_map(|node| node.reactions().cloned())
            .collect();
        for reaction in reactions {
            engine.register(reaction)?;
        }

        debug!(
            reactions = engine.graph.len(),
            nodes = engine.environment.node_count(),
            parallel = engine.workers.is_some(),
            "Engine created"
        );
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The simulated environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The current simulation time.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Number of steps performed so far.
    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// The current status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// The dependency graph of the registered reactions.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The time-ordered reaction index.
    pub fn index(&self) -> &ReactionIndex {
        &self.index
    }

    /// The configuration in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A clonable control handle usable from any thread.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(
            self.sender.clone(),
            Arc::clone(&self.status),
            self.monitors.clone(),
        )
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Queue a play command.
    pub fn play(&self) {
        self.handle().play();
    }

    /// Queue a pause command.
    pub fn pause(&self) {
        self.handle().pause();
    }

    /// Queue a terminate command.
    pub fn terminate(&self) {
        self.handle().terminate();
    }

    /// Register a monitor immediately.
    pub fn add_monitor(&self, monitor: Arc<dyn OutputMonitor>) -> MonitorId {
        let id = MonitorId::new();
        self.monitors.insert(id, monitor);
        id
    }

    /// Unregister a monitor immediately.
    pub fn remove_monitor(&self, id: MonitorId) -> bool {
        self.monitors.remove(id)
    }

    pub(crate) fn set_status(&self, status: Status) -> bool {
        self.status.set(status)
    }

    pub(crate) fn set_breakpoint(&mut self, breakpoint: Breakpoint) {
        debug!(?breakpoint, "Breakpoint set");
        self.breakpoint = Some(breakpoint);
        self.set_status(Status::Running);
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Initialize, then process commands and steps until stopped.
    ///
    /// Returns the error that stopped the engine, if any. Monitors receive
    /// `finished` either way. Running an engine a second time does nothing.
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.status.get() != Status::Init {
            debug!(status = %self.status.get(), "Engine already ran");
            return Ok(());
        }

        self.monitors.for_each(|m| m.initialized(&self.environment));
        self.set_status(Status::Ready);
        info!(
            reactions = self.graph.len(),
            nodes = self.environment.node_count(),
            "Engine initialized"
        );

        let outcome = self.event_loop();
        if let Err(err) = &outcome {
            error!(error = %err, time = %self.time, step = self.step, "Engine stopped on error");
        }
        self.shutdown();

        self.monitors
            .for_each(|m| m.finished(&self.environment, self.time, self.step));
        info!(time = %self.time, steps = self.step, "Engine finished");
        outcome
    }

    fn event_loop(&mut self) -> Result<(), EngineError> {
        loop {
            match self.status.get() {
                Status::Stopped => return Ok(()),
                Status::Running => {
                    self.drain_commands();
                    if self.status.get() != Status::Running || self.breakpoint_reached() {
                        continue;
                    }
                    self.step()?;
                }
                _ => match self.commands.recv() {
                    Ok(command) => command.apply(self),
                    Err(_) => return Ok(()),
                },
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            command.apply(self);
        }
    }

    /// Pause and clear the breakpoint if it has been reached.
    fn breakpoint_reached(&mut self) -> bool {
        let reached = match self.breakpoint {
            None => false,
            Some(Breakpoint::Step(step)) => self.step >= step,
            Some(Breakpoint::Time(time)) => self.index.peek().map_or(true, |(_, tau)| tau > time),
        };
        if reached {
            info!(breakpoint = ?self.breakpoint, time = %self.time, step = self.step, "Breakpoint reached");
            self.breakpoint = None;
            self.set_status(Status::Paused);
        }
        reached
    }

    fn shutdown(&mut self) {
        self.set_status(Status::Stopped);
        let discarded = self.commands.try_iter().count();
        if discarded > 0 {
            debug!(discarded, "Discarded pending commands");
        }
        self.breakpoint = None;
        self.workers = None;
    }

    fn stop(&self, reason: &str) {
        info!(reason, time = %self.time, step = self.step, "Stopping");
        self.set_status(Status::Stopped);
    }

    /// Perform one step outside the event loop.
    ///
    /// Returns `Ok(false)` and moves to `Stopped` when there is nothing left
    /// to do within the configured budget. A stopped engine never steps
    /// again.
    pub fn step(&mut self) -> Result<bool, EngineError> {
        if self.status.get() == Status::Stopped {
            return Ok(false);
        }
        if self.config.max_steps.is_some_and(|max| self.step >= max) {
            self.stop("step budget exhausted");
            return Ok(false);
        }
        let Some((id, tau)) = self.index.peek() else {
            self.stop("no reactions left");
            return Ok(false);
        };
        if !tau.is_finite() {
            self.stop("every reaction is dormant");
            return Ok(false);
        }
        if tau < self.time {
            return Err(EngineError::TimeWentBackwards {
                reaction: id,
                tau,
                now: self.time,
            });
        }
        if self.config.final_time.is_some_and(|end| tau > Time::new(end)) {
            self.stop("final time reached");
            return Ok(false);
        }

        self.time = tau;
        let reaction = self
            .graph
            .reaction(id)
            .cloned()
            .ok_or(EngineError::UnknownReaction { id })?;

        let ready = reaction.lock().can_execute(&self.environment)?;
        if ready {
            let influenced = self.graph.influenced(id);
            reaction.lock().execute(&mut self.environment)?;
            self.apply_environment_events()?;
            self.update_after_firing(id, &reaction, influenced)?;
            trace!(reaction = %id, time = %self.time, step = self.step, "Fired");
        } else {
            // The slot is consumed even though nothing happened.
            let tau = {
                let mut r = reaction.lock();
                r.update(self.time, true, &self.environment);
                r.tau()
            };
            self.index.update(id, tau)?;
            trace!(reaction = %id, time = %self.time, "Conditions do not hold");
        }

        {
            let selected = reaction.lock();
            self.monitors.for_each(|m| {
                m.step_done(&self.environment, Some(&*selected), self.time, self.step)
            });
        }
        self.step += 1;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    fn update_after_firing(
        &mut self,
        fired: ReactionId,
        reaction: &SharedReaction,
        influenced: Vec<ReactionId>,
    ) -> Result<(), EngineError> {
        let live: Vec<(ReactionId, SharedReaction)> = influenced
            .into_iter()
            .filter_map(|id| self.graph.reaction(id).map(|r| (id, Arc::clone(r))))
            .collect();
        debug_assert!(
            live.iter().all(|(id, _)| *id != fired)
                && live.iter().map(|(id, _)| id).collect::<IndexSet<_>>().len() == live.len(),
            "influenced reactions must be distinct and exclude the fired one"
        );
        let own_live = self.graph.contains(fired);
        let now = self.time;
        let env = &self.environment;

        match &self.workers {
            Some(pool) if live.len() > 1 => pool.in_place_scope(|scope| {
                for (_, r) in &live {
                    scope.spawn(move |_| r.lock().update(now, false, env));
                }
                if own_live {
                    reaction.lock().update(now, true, env);
                }
            }),
            _ => {
                if own_live {
                    reaction.lock().update(now, true, env);
                }
                for (_, r) in &live {
                    r.lock().update(now, false, env);
                }
            }
        }

        if own_live {
            let tau = reaction.lock().tau();
            self.index.update(fired, tau)?;
        }
        for (id, r) in &live {
            let tau = r.lock().tau();
            self.index.update(*id, tau)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural changes
    // ------------------------------------------------------------------

    /// Mirror the environment's structural changes into the graph and index.
    ///
    /// Removals go first so that nothing is linked against a reaction that
    /// is about to disappear; relinking goes last so it sees the final
    /// topology.
    fn apply_environment_events(&mut self) -> Result<(), EngineError> {
        let events = self.environment.drain_events();
        if events.is_empty() {
            return Ok(());
        }

        let mut relink: IndexSet<NodeId> = IndexSet::new();
        for event in &events {
            match event {
                EnvironmentEvent::NodeRemoved {
                    node,
                    reactions,
                    former_neighbors,
                } => {
                    for id in reactions {
                        self.unregister(*id)?;
                    }
                    relink.extend(former_neighbors.iter().copied());
                    debug!(%node, reactions = reactions.len(), "Node removed");
                }
                EnvironmentEvent::ReactionRemoved { reaction } => self.unregister(*reaction)?,
                _ => {}
            }
        }

        let mut added: Vec<SharedReaction> = Vec::new();
        for event in events {
            match event {
                EnvironmentEvent::NodeAdded { node } => {
                    if let Ok(node) = self.environment.node(node) {
                        added.extend(node.reactions().cloned());
                    }
                }
                EnvironmentEvent::ReactionAdded { reaction } => added.push(reaction),
                EnvironmentEvent::NeighborAdded { node, neighbor }
                | EnvironmentEvent::NeighborRemoved { node, neighbor } => {
                    relink.insert(node);
                    relink.insert(neighbor);
                }
                EnvironmentEvent::NodeMoved { node } => trace!(%node, "Node moved"),
                EnvironmentEvent::NodeRemoved { .. } | EnvironmentEvent::ReactionRemoved { .. } => {}
            }
        }
        for reaction in added {
            self.register(reaction)?;
        }

        for node in relink {
            if self.environment.contains_node(node) {
                self.graph.relink_node(&self.environment, node);
            }
        }
        Ok(())
    }

    /// Schedule a reaction that is attached to a live node.
    fn register(&mut self, reaction: SharedReaction) -> Result<(), EngineError> {
        let (id, node) = {
            let r = reaction.lock();
            (r.id(), r.node())
        };
        let attached = self
            .environment
            .node(node)
            .is_ok_and(|n| n.contains_reaction(id));
        if self.graph.contains(id) || !attached {
            return Ok(());
        }

        self.graph
            .create_dependencies(Arc::clone(&reaction), &self.environment)?;
        let tau = {
            let mut r = reaction.lock();
            r.update(self.time, true, &self.environment);
            r.tau()
        };
        self.index.insert(id, tau)?;
        trace!(reaction = %id, %node, %tau, "Registered");
        Ok(())
    }

    fn unregister(&mut self, id: ReactionId) -> Result<(), EngineError> {
        self.graph.remove_dependencies(id);
        if self.index.contains(id) {
            self.index.remove(id)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status.get())
            .field("time", &self.time)
            .field("step", &self.step)
            .field("reactions", &self.graph.len())
            .field("monitors", &self.monitors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use crate::environment::ConnectWithinDistance;
    use crate::error::ReactionError;
    use crate::model::library::{ChangeConcentration, RemoveOwnNode, Threshold};
    use crate::model::{
        Context, Dependencies, DiracComb, Molecule, Node, Reaction, SimpleReaction, Trigger,
    };

    fn counter_env(period: f64) -> (Environment, NodeId, Molecule) {
        let mut env = Environment::default();
        let m = Molecule::new("count");
        let mut node = Node::new();
        let id = node.id();
        node.add_reaction(
            SimpleReaction::new(id, DiracComb::new(0.0, period))
                .with_action(ChangeConcentration::new(m.clone(), 1.0))
                .shared(),
        );
        env.add_node(node, [0.0, 0.0]).unwrap();
        (env, id, m)
    }

    #[derive(Default)]
    struct Steps {
        initialized: AtomicU64,
        steps: AtomicU64,
        finished: AtomicU64,
    }

    impl OutputMonitor for Steps {
        fn initialized(&self, _env: &Environment) {
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        fn step_done(&self, _env: &Environment, _r: Option<&dyn Reaction>, _t: Time, _s: u64) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }

        fn finished(&self, _env: &Environment, _time: Time, _step: u64) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_until_step_budget() {
        let (env, node, m) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default().with_max_steps(5)).unwrap();
        let steps = Arc::new(Steps::default());
        engine.add_monitor(steps.clone());

        engine.play();
        engine.run().unwrap();

        assert_eq!(engine.status(), Status::Stopped);
        assert_eq!(engine.step_count(), 5);
        assert_eq!(engine.time(), Time::new(4.0));
        assert_eq!(engine.environment().node(node).unwrap().concentration(&m), 5.0);
        assert_eq!(steps.steps.load(Ordering::SeqCst), 5);
        assert_eq!(steps.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stops_before_final_time() {
        let (env, _, _) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default().with_final_time(2.5)).unwrap();
        engine.play();
        engine.run().unwrap();

        // Fires at 0, 1 and 2; the event at 3 lies past the end.
        assert_eq!(engine.step_count(), 3);
        assert_eq!(engine.time(), Time::new(2.0));
    }

    #[test]
    fn failed_conditions_consume_the_slot() {
        let mut env = Environment::default();
        let mut node = Node::new();
        let id = node.id();
        let sink = Molecule::new("sink");
        node.add_reaction(
            SimpleReaction::new(id, DiracComb::new(0.0, 1.0))
                .with_condition(Threshold::new(Molecule::new("fuel"), 1.0))
                .with_action(ChangeConcentration::new(sink.clone(), 1.0))
                .shared(),
        );
        env.add_node(node, [0.0, 0.0]).unwrap();

        let mut engine = Engine::new(env, EngineConfig::default().with_max_steps(3)).unwrap();
        assert!(engine.step().unwrap());
        assert!(engine.step().unwrap());
        assert!(engine.step().unwrap());
        assert!(!engine.step().unwrap());

        assert_eq!(engine.time(), Time::new(2.0));
        assert_eq!(engine.environment().node(id).unwrap().concentration(&sink), 0.0);
        assert_eq!(engine.status(), Status::Stopped);
    }

    #[test]
    fn empty_environment_stops_immediately() {
        let mut engine = Engine::new(Environment::default(), EngineConfig::default()).unwrap();
        engine.play();
        engine.run().unwrap();
        assert_eq!(engine.step_count(), 0);
        assert_eq!(engine.status(), Status::Stopped);
    }

    #[test]
    fn influenced_reactions_are_rescheduled() {
        let mut env = Environment::default();
        let fuel = Molecule::new("fuel");
        let mut node = Node::new();
        let id = node.id();
        node.add_reaction(
            SimpleReaction::new(id, Trigger::new(1.0))
                .with_action(ChangeConcentration::new(fuel.clone(), 1.0))
                .shared(),
        );
        let burner = SimpleReaction::new(id, DiracComb::new(0.5, 1.0))
            .with_condition(Threshold::new(fuel.clone(), 1.0))
            .with_action(ChangeConcentration::new(Molecule::new("heat"), 1.0))
            .shared();
        let burner_id = burner.lock().id();
        node.add_reaction(burner);
        env.add_node(node, [0.0, 0.0]).unwrap();

        let mut engine = Engine::new(env, EngineConfig::default().with_final_time(3.0)).unwrap();
        engine.play();
        engine.run().unwrap();

        // Burner fails at 0.5, the trigger fires at 1.0, burner fires at 1.5
        // and 2.5.
        let heat = engine
            .environment()
            .node(id)
            .unwrap()
            .concentration(&Molecule::new("heat"));
        assert_eq!(heat, 2.0);
        assert_eq!(engine.graph().handle(burner_id).unwrap().influenced_by().len(), 1);
    }

    #[test]
    fn node_removal_unregisters_its_reactions() {
        let mut env = Environment::builder()
            .linking_rule(ConnectWithinDistance::new(1.5))
            .build()
            .unwrap();
        let mut doomed = Node::new();
        let doomed_id = doomed.id();
        doomed.add_reaction(
            SimpleReaction::new(doomed_id, Trigger::new(1.0))
                .with_action(RemoveOwnNode)
                .shared(),
        );
        doomed.add_reaction(
            SimpleReaction::new(doomed_id, DiracComb::new(0.0, 1.0))
                .with_action(ChangeConcentration::new(Molecule::new("a"), 1.0))
                .shared(),
        );
        env.add_node(doomed, [0.0, 0.0]).unwrap();
        let survivor_node = Node::new();
        let survivor = survivor_node.id();
        env.add_node(survivor_node, [1.0, 0.0]).unwrap();

        let mut engine = Engine::new(env, EngineConfig::default().with_final_time(5.0)).unwrap();
        assert_eq!(engine.graph().len(), 2);
        engine.play();
        engine.run().unwrap();

        assert!(!engine.environment().contains_node(doomed_id));
        assert!(engine.environment().neighborhood(survivor).unwrap().is_empty());
        assert!(engine.graph().is_empty());
        assert!(engine.index().is_empty());
    }

    #[test]
    fn dynamic_reactions_are_scheduled() {
        let (env, node, _) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        assert_eq!(engine.graph().len(), 1);

        let added = SimpleReaction::new(node, Trigger::new(0.5)).shared();
        let added_id = added.lock().id();
        engine.environment.add_reaction(node, added).unwrap();
        engine.apply_environment_events().unwrap();

        assert!(engine.graph().contains(added_id));
        assert_eq!(engine.index().tau_of(added_id), Some(Time::new(0.5)));

        engine.environment.remove_reaction(node, added_id).unwrap();
        engine.apply_environment_events().unwrap();
        assert!(!engine.index().contains(added_id));
    }

    #[test]
    fn parallel_updates_match_serial() {
        fn build() -> (Environment, Vec<NodeId>) {
            let mut env = Environment::default();
            let shared = Molecule::new("shared");
            let mut node = Node::new();
            let id = node.id();
            node.add_reaction(
                SimpleReaction::new(id, DiracComb::new(0.0, 1.0))
                    .with_action(ChangeConcentration::new(shared.clone(), 1.0))
                    .shared(),
            );
            for i in 0..8 {
                node.add_reaction(
                    SimpleReaction::new(id, DiracComb::new(0.25 + i as f64 * 0.01, 1.0))
                        .with_condition(Threshold::new(shared.clone(), 1.0))
                        .with_action(ChangeConcentration::new(Molecule::new(format!("out{i}")), 1.0))
                        .shared(),
                );
            }
            env.add_node(node, [0.0, 0.0]).unwrap();
            (env, vec![id])
        }

        let run = |threads: usize| {
            let (env, nodes) = build();
            let config = EngineConfig::default()
                .with_final_time(10.0)
                .with_worker_threads(threads);
            let mut engine = Engine::new(env, config).unwrap();
            engine.play();
            engine.run().unwrap();
            let node = engine.environment().node(nodes[0]).unwrap();
            (engine.step_count(), node.contents().clone())
        };

        assert_eq!(run(1), run(4));
    }

    #[test]
    fn coupled_influenced_reactions_update_in_parallel() {
        // Every reader also writes what the others read, so the influenced
        // set is fully linked. Each update still touches only its own
        // reaction.
        fn build() -> (Environment, NodeId) {
            let mut env = Environment::default();
            let fuel = Molecule::new("fuel");
            let mut node = Node::new();
            let id = node.id();
            node.set_concentration(fuel.clone(), 100.0);
            node.add_reaction(
                SimpleReaction::new(id, DiracComb::new(0.0, 1.0))
                    .with_action(ChangeConcentration::new(fuel.clone(), 1.0))
                    .shared(),
            );
            for i in 0..6 {
                node.add_reaction(
                    SimpleReaction::new(id, DiracComb::new(0.1 + i as f64 * 0.05, 0.9))
                        .with_condition(Threshold::new(fuel.clone(), 1.0))
                        .with_action(ChangeConcentration::new(fuel.clone(), -1.0))
                        .shared(),
                );
            }
            env.add_node(node, [0.0, 0.0]).unwrap();
            (env, id)
        }

        let run = |threads: usize| {
            let (env, id) = build();
            let config = EngineConfig::default()
                .with_final_time(8.0)
                .with_worker_threads(threads);
            let mut engine = Engine::new(env, config).unwrap();
            let readers: Vec<ReactionId> = engine.graph().ids().skip(1).collect();
            for a in &readers {
                for b in &readers {
                    if a != b {
                        assert!(engine.graph().handle(*a).unwrap().influences().contains(b));
                    }
                }
            }
            engine.play();
            engine.run().unwrap();
            let node = engine.environment().node(id).unwrap();
            (engine.step_count(), engine.time(), node.contents().clone())
        };

        assert_eq!(run(1), run(3));
    }

    /// Schedules itself one time unit in the past after firing.
    struct Rewinding {
        id: ReactionId,
        node: NodeId,
        tau: Time,
    }

    impl Reaction for Rewinding {
        fn id(&self) -> ReactionId {
            self.id
        }
        fn node(&self) -> NodeId {
            self.node
        }
        fn tau(&self) -> Time {
            self.tau
        }
        fn input_context(&self) -> Context {
            Context::Local
        }
        fn output_context(&self) -> Context {
            Context::Local
        }
        fn inbound_dependencies(&self) -> Dependencies {
            Dependencies::new()
        }
        fn outbound_dependencies(&self) -> Dependencies {
            Dependencies::new()
        }
        fn can_execute(&self, _env: &Environment) -> Result<bool, ReactionError> {
            Ok(true)
        }
        fn execute(&mut self, _env: &mut Environment) -> Result<(), ReactionError> {
            Ok(())
        }
        fn update(&mut self, now: Time, executed: bool, _env: &Environment) {
            if executed && now > Time::ZERO {
                self.tau = Time::new(now.as_f64() - 1.0);
            }
        }
    }

    #[test]
    fn past_tau_is_a_hard_failure() {
        let mut env = Environment::default();
        let mut node = Node::new();
        let id = node.id();
        node.add_reaction(crate::model::share(Rewinding {
            id: ReactionId::new(),
            node: id,
            tau: Time::new(2.0),
        }));
        env.add_node(node, [0.0, 0.0]).unwrap();

        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        let steps = Arc::new(Steps::default());
        engine.add_monitor(steps.clone());
        engine.play();

        let result = engine.run();
        assert!(matches!(result, Err(EngineError::TimeWentBackwards { .. })));
        assert_eq!(engine.status(), Status::Stopped);
        assert_eq!(steps.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn breakpoint_pauses_then_terminate_stops() {
        let (env, _, _) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        let handle = engine.handle();

        let driver = std::thread::spawn(move || {
            engine.run().unwrap();
            engine
        });

        handle.run_until_step(3);
        assert_eq!(
            handle.wait_for(Status::Paused, Some(Duration::from_secs(5))),
            Status::Paused
        );
        handle.terminate();
        let engine = driver.join().unwrap();

        assert_eq!(engine.step_count(), 3);
        assert_eq!(engine.status(), Status::Stopped);
    }

    #[test]
    fn run_until_time_fires_everything_up_to_target() {
        let (env, _, _) = counter_env(0.5);
        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        let handle = engine.handle();
        handle.run_until_time(1.0);

        let driver = std::thread::spawn(move || {
            engine.run().unwrap();
            engine
        });
        assert_eq!(
            handle.wait_for(Status::Paused, Some(Duration::from_secs(5))),
            Status::Paused
        );
        handle.terminate();
        let engine = driver.join().unwrap();

        // Fired at 0, 0.5 and 1.0; the event at 1.5 is past the target.
        assert_eq!(engine.step_count(), 3);
        assert_eq!(engine.time(), Time::new(1.0));
    }

    #[test]
    fn pending_commands_are_discarded_on_stop() {
        let (env, _, _) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        let handle = engine.handle();
        handle.terminate();
        handle.play();

        engine.run().unwrap();
        assert_eq!(engine.step_count(), 0);
        assert_eq!(engine.status(), Status::Stopped);
        // Once the engine is dropped, commands can no longer be delivered.
        drop(engine);
        assert!(!handle.play());
    }

    #[test]
    fn stopped_engine_never_steps() {
        let (env, node, m) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        engine.terminate();
        engine.run().unwrap();
        assert_eq!(engine.status(), Status::Stopped);

        assert!(!engine.step().unwrap());
        assert_eq!(engine.step_count(), 0);
        assert_eq!(engine.environment().node(node).unwrap().concentration(&m), 0.0);
    }

    #[test]
    fn monitors_added_through_the_handle_are_initialized() {
        let (env, _, _) = counter_env(1.0);
        let mut engine = Engine::new(env, EngineConfig::default()).unwrap();
        let direct = Arc::new(Steps::default());
        let queued = Arc::new(Steps::default());
        engine.add_monitor(direct.clone());
        let handle = engine.handle();
        handle.add_monitor(queued.clone());
        handle.terminate();

        engine.run().unwrap();
        for monitor in [&direct, &queued] {
            assert_eq!(monitor.initialized.load(Ordering::SeqCst), 1);
            assert_eq!(monitor.finished.load(Ordering::SeqCst), 1);
        }
    }
}
