//! Structural events raised by the environment for its scheduler.

use crate::model::{NodeId, ReactionId, SharedReaction};

/// A structural change the scheduler has to react to.
///
/// Events are only recorded while a scheduler is attached; an environment
/// being assembled before the engine exists records nothing.
#[derive(Clone)]
pub enum EnvironmentEvent {
    /// A node was inserted. Its reactions need dependency handles.
    NodeAdded { node: NodeId },

    /// A node was removed, together with its reactions. `former_neighbors`
    /// is the neighborhood it had just before removal.
    NodeRemoved {
        node: NodeId,
        reactions: Vec<ReactionId>,
        former_neighbors: Vec<NodeId>,
    },

    /// A node changed position.
    NodeMoved { node: NodeId },

    /// `neighbor` entered the neighborhood of `node`.
    NeighborAdded { node: NodeId, neighbor: NodeId },

    /// `neighbor` left the neighborhood of `node`.
    NeighborRemoved { node: NodeId, neighbor: NodeId },

    /// A reaction was attached to an existing node.
    ReactionAdded { reaction: SharedReaction },

    /// A reaction was detached from a node.
    ReactionRemoved { reaction: ReactionId },
}

impl std::fmt::Debug for EnvironmentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeAdded { node } => write!(f, "NodeAdded({node})"),
            Self::NodeRemoved { node, .. } => write!(f, "NodeRemoved({node})"),
            Self::NodeMoved { node } => write!(f, "NodeMoved({node})"),
            Self::NeighborAdded { node, neighbor } => write!(f, "NeighborAdded({node}, {neighbor})"),
            Self::NeighborRemoved { node, neighbor } => {
                write!(f, "NeighborRemoved({node}, {neighbor})")
            }
            Self::ReactionAdded { reaction } => write!(f, "ReactionAdded({})", reaction.lock().id()),
            Self::ReactionRemoved { reaction } => write!(f, "ReactionRemoved({reaction})"),
        }
    }
}
