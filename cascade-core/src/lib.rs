//! Cascade Core
//!
//! This crate provides the kernel of the Cascade discrete-event simulator.
//! It implements:
//!
//! - A time-ordered index of pending reactions
//! - A dependency graph that limits rescheduling to reactions a firing can
//!   actually affect
//! - A spatial environment with range queries and self-maintaining
//!   neighborhoods
//! - An engine driving it all, controllable from other threads
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `model`: nodes, molecules, reactions and the traits models plug into
//! - `environment`: positions, neighborhoods, linking rules and placement
//! - `index`: the reaction index
//! - `graph`: the dependency graph
//! - `engine`: the scheduler loop, its status and its commands
//! - `config` and `error`: settings and error types
//!
//! # Example
//!
//! ```rust
//! use cascade_core::config::EngineConfig;
//! use cascade_core::engine::Engine;
//! use cascade_core::environment::Environment;
//! use cascade_core::model::library::ChangeConcentration;
//! use cascade_core::model::{DiracComb, Molecule, Node, SimpleReaction};
//!
//! let mut env = Environment::default();
//! let mut node = Node::new();
//! let id = node.id();
//! let a = Molecule::new("a");
//! node.add_reaction(
//!     SimpleReaction::new(id, DiracComb::new(0.0, 1.0))
//!         .with_action(ChangeConcentration::new(a.clone(), 1.0))
//!         .shared(),
//! );
//! env.add_node(node, [0.0, 0.0]).unwrap();
//!
//! let mut engine = Engine::new(env, EngineConfig::default().with_max_steps(3)).unwrap();
//! engine.play();
//! engine.run().unwrap();
//!
//! assert_eq!(engine.environment().node(id).unwrap().concentration(&a), 3.0);
//! ```

pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod graph;
pub mod index;
pub mod model;
pub mod time;

pub use config::{EngineConfig, EnvironmentConfig};
pub use engine::{Engine, EngineHandle, OutputMonitor, Status};
pub use environment::{Environment, Position};
pub use error::{EngineError, EnvironmentError};
pub use time::Time;
