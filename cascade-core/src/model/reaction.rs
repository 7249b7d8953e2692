//! Reactions, Conditions and Actions
//!
//! A reaction is a timed event attached to a node. It is made of:
//!
//! - guard **conditions**, which only read the environment;
//! - **actions**, which mutate it when the reaction fires;
//! - a **time distribution**, which decides the next firing time (`tau`).
//!
//! The kernel never looks inside these. It only needs the accessors of the
//! [`Reaction`] trait: the scheduled time, the contexts and dependency tokens
//! (for the dependency graph), and the `can_execute` / `execute` / `update`
//! entry points (for the engine).
//!
//! # Sharing
//!
//! Reactions are shared between the node that owns them, the dependency graph
//! and the engine as [`SharedReaction`]s. Each reaction sits behind its own
//! mutex, which is never contended on the driving thread and lets the
//! parallel update phase touch distinct reactions from worker threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::smallvec;

use super::context::{Context, Dependencies, Dependency};
use super::distribution::TimeDistribution;
use super::node::NodeId;
use crate::environment::Environment;
use crate::error::ReactionError;
use crate::time::Time;

/// Unique identifier for a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactionId(u64);

impl ReactionId {
    /// Generate a new unique reaction ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ReactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A reaction shared between its node, the dependency graph and the engine.
pub type SharedReaction = Arc<Mutex<dyn Reaction>>;

/// Wrap a reaction so it can be attached to a node.
pub fn share<R: Reaction + 'static>(reaction: R) -> SharedReaction {
    Arc::new(Mutex::new(reaction))
}

/// A timed event the engine can schedule.
pub trait Reaction: Send {
    /// Stable identity of this reaction.
    fn id(&self) -> ReactionId;

    /// The node this reaction lives on.
    fn node(&self) -> NodeId;

    /// The next time this reaction wants to fire.
    fn tau(&self) -> Time;

    /// The widest context read by the conditions.
    fn input_context(&self) -> Context;

    /// The widest context written by the actions.
    fn output_context(&self) -> Context;

    /// Tokens read while evaluating conditions and rates.
    fn inbound_dependencies(&self) -> Dependencies;

    /// Tokens written by the actions.
    fn outbound_dependencies(&self) -> Dependencies;

    /// Whether every condition currently holds.
    fn can_execute(&self, env: &Environment) -> Result<bool, ReactionError>;

    /// Run the actions.
    ///
    /// Partial effects of a failing action are not rolled back.
    fn execute(&mut self, env: &mut Environment) -> Result<(), ReactionError>;

    /// Recompute `tau`.
    ///
    /// `executed` is true when the reaction's current slot has been consumed:
    /// it just fired, it was selected but its conditions did not hold, or the
    /// engine is performing the initial virtual execution. It is false when
    /// the reaction is only being revisited because something it reads
    /// changed.
    fn update(&mut self, now: Time, executed: bool, env: &Environment);
}

/// A read-only guard evaluated before a reaction fires.
///
/// A condition that does not override `context` or `inbound_dependencies`
/// is treated as reading everything everywhere.
pub trait Condition: Send {
    /// How far from its node this condition reads.
    fn context(&self) -> Context {
        Context::Global
    }

    /// What this condition reads.
    fn inbound_dependencies(&self) -> Dependencies {
        smallvec![Dependency::Everything]
    }

    /// Evaluate the guard on `node`.
    fn is_valid(&self, env: &Environment, node: NodeId) -> Result<bool, ReactionError>;
}

/// An effect applied when a reaction fires.
///
/// Like [`Condition`], undeclared scope defaults to the least strict value.
pub trait Action: Send {
    /// How far from its node this action writes.
    fn context(&self) -> Context {
        Context::Global
    }

    /// What this action writes.
    fn outbound_dependencies(&self) -> Dependencies {
        smallvec![Dependency::Everything]
    }

    /// Apply the effect on behalf of `node`.
    fn execute(&mut self, env: &mut Environment, node: NodeId) -> Result<(), ReactionError>;
}

/// A reaction composed of boxed conditions, actions and a time distribution.
pub struct SimpleReaction {
    id: ReactionId,
    node: NodeId,
    conditions: Vec<Box<dyn Condition>>,
    actions: Vec<Box<dyn Action>>,
    distribution: Box<dyn TimeDistribution>,
}

impl SimpleReaction {
    /// Create a reaction on `node` with no conditions and no actions.
    pub fn new(node: NodeId, distribution: impl TimeDistribution + 'static) -> Self {
        Self {
            id: ReactionId::new(),
            node,
            conditions: Vec::new(),
            actions: Vec::new(),
            distribution: Box::new(distribution),
        }
    }

    /// Add a guard condition.
    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Add an action.
    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Wrap into a [`SharedReaction`].
    pub fn shared(self) -> SharedReaction {
        share(self)
    }
}

impl Reaction for SimpleReaction {
    fn id(&self) -> ReactionId {
        self.id
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn tau(&self) -> Time {
        self.distribution.next_occurrence()
    }

    fn input_context(&self) -> Context {
        self.conditions
            .iter()
            .map(|c| c.context())
            .fold(Context::Local, Context::widest)
    }

    fn output_context(&self) -> Context {
        self.actions
            .iter()
            .map(|a| a.context())
            .fold(Context::Local, Context::widest)
    }

    fn inbound_dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::new();
        for condition in &self.conditions {
            for dep in condition.inbound_dependencies() {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }

    fn outbound_dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::new();
        for action in &self.actions {
            for dep in action.outbound_dependencies() {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        deps
    }

    fn can_execute(&self, env: &Environment) -> Result<bool, ReactionError> {
        if !env.contains_node(self.node) {
            return Ok(false);
        }
        for condition in &self.conditions {
            if !condition.is_valid(env, self.node)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn execute(&mut self, env: &mut Environment) -> Result<(), ReactionError> {
        for action in &mut self.actions {
            action.execute(env, self.node)?;
        }
        Ok(())
    }

    fn update(&mut self, now: Time, executed: bool, env: &Environment) {
        self.distribution.update(now, executed, env);
    }
}

impl fmt::Debug for SimpleReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleReaction")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("tau", &self.tau())
            .field("conditions", &self.conditions.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}
