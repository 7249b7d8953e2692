//! Simulation Model
//!
//! The types the kernel schedules over: nodes holding molecules, and the
//! reactions attached to them.
//!
//! # Boundary
//!
//! Concrete reaction semantics belong to incarnations (chemistry, biology,
//! swarm programming). They plug into the kernel through three small traits:
//!
//! - [`Condition`]: a read-only guard with a declared context and inbound
//!   dependency tokens;
//! - [`Action`]: an effect with a declared context and outbound tokens;
//! - [`TimeDistribution`]: the strategy producing the next firing time.
//!
//! [`SimpleReaction`] composes them into a [`Reaction`]. Anything else that
//! implements [`Reaction`] directly is scheduled the same way.

mod molecule;
mod context;
mod node;
mod reaction;
mod distribution;
pub mod library;

pub use molecule::Molecule;
pub use context::{intersects, Context, Dependencies, Dependency};
pub use node::{Node, NodeId};
pub use reaction::{share, Action, Condition, Reaction, ReactionId, SharedReaction, SimpleReaction};
pub use distribution::{DiracComb, TimeDistribution, Trigger};
