//! Dependency Graph
//!
//! This module tracks which reactions may have to be rescheduled when
//! another reaction fires.
//!
//! # Overview
//!
//! The graph is directed and may contain cycles:
//!
//! - Vertices are reactions, each wrapped in a [`DependencyHandle`]
//! - An edge from A to B means "firing A may change B's rate or conditions"
//!
//! After a reaction fires, the engine asks the graph for its out-edges and
//! updates exactly those reactions. Everything not reachable by one edge keeps
//! its scheduled time.
//!
//! # Design Decisions
//!
//! 1. Edges are stored on both endpoints (`influences` and `influenced_by`),
//!    so dropping a reaction or relinking it never needs a full scan.
//!
//! 2. Handles are indexed by reaction ID and by node, which keeps relinking
//!    after a neighborhood change local to the two nodes involved.
//!
//! 3. Over-coupling is allowed, under-coupling is not. Wildcards and global
//!    contexts are resolved conservatively.

mod dependency;
mod handle;

pub use dependency::DependencyGraph;
pub use handle::DependencyHandle;
