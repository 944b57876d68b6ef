use crate::id::NodeId;
use thiserror::Error;

/// Structural failures reported by [`Tree`](crate::Tree) operations.
///
/// Every operation that returns one of these leaves the tree exactly as it
/// was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node {0} not found")]
    NotFound(NodeId),

    #[error("node {id} references missing parent {parent}")]
    DanglingParent { id: NodeId, parent: NodeId },

    #[error("node {0} already exists")]
    DuplicateId(NodeId),

    /// A parentless node was offered while the tree already has a root.
    #[error("node {id} has no parent but {root} is already the root")]
    RootExists { id: NodeId, root: NodeId },

    /// Making room for a sibling would push an `order` past `i64::MAX`.
    #[error("no sibling order left under {parent}")]
    OrderOverflow { parent: NodeId },

    /// Snapshot validation found nodes that cannot be reached from the root
    /// (a parent cycle, or a snapshot without any root).
    #[error("{count} node(s) are not reachable from the root")]
    OrphanedNodes { count: usize },
}
