//! Error types for Cascade.
//!
//! Errors are grouped by where they arise:
//!
//! - [`EnvironmentError`]: model construction and structural consistency
//!   (duplicate ids, unknown nodes, missing or non-finite positions, bad
//!   ranges);
//! - [`IndexError`]: misuse of the reaction index;
//! - [`ReactionError`]: failures raised by conditions and actions;
//! - [`ConfigError`]: unreadable or invalid configuration;
//! - [`EngineError`]: everything that stops a running engine.
//!
//! None of them is retried by the kernel. The engine logs the error, moves to
//! `Stopped` and still notifies its monitors.

use thiserror::Error;

use crate::environment::Position;
use crate::model::{NodeId, ReactionId};
use crate::time::Time;

/// Structural and construction errors raised by the environment.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Node {id} is already in the environment")]
    DuplicateNode { id: NodeId },

    #[error("Node {id} is not in the environment")]
    UnknownNode { id: NodeId },

    #[error("Node {id} has no recorded position")]
    MissingPosition { id: NodeId },

    #[error("Node {id} is not in the spatial index")]
    NotIndexed { id: NodeId },

    #[error("Range {range} is not a positive finite distance")]
    InvalidRange { range: f64 },

    #[error("Position {position} has a non-finite coordinate")]
    InvalidPosition { position: Position },

    #[error("Position has {actual} dimensions, the environment has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Reaction {reaction} belongs to node {declared}, not to node {node}")]
    ReactionNodeMismatch {
        reaction: ReactionId,
        declared: NodeId,
        node: NodeId,
    },

    #[error("Reaction {reaction} is not attached to node {node}")]
    UnknownReaction { reaction: ReactionId, node: NodeId },
}

/// Misuse of the reaction index or the dependency graph.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Reaction {id} is already indexed")]
    Duplicate { id: ReactionId },

    #[error("Reaction {id} is not indexed")]
    Unknown { id: ReactionId },
}

/// Errors raised while evaluating conditions or running actions.
#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("Reaction failed: {reason}")]
    Failed { reason: String },

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl ReactionError {
    /// Creates a domain failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Errors that stop the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Reaction {reaction} was scheduled at {tau}, before the current time {now}")]
    TimeWentBackwards {
        reaction: ReactionId,
        tau: Time,
        now: Time,
    },

    #[error("Reaction {id} is not registered with the engine")]
    UnknownReaction { id: ReactionId },

    #[error(transparent)]
    Reaction(#[from] ReactionError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start the update workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result alias for environment operations.
pub type EnvironmentResult<T> = Result<T, EnvironmentError>;
