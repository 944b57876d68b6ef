pub mod error;
pub mod id;
pub mod layout;
pub mod model;
pub mod viewport;

pub use error::TreeError;
pub use id::{ClientId, MindMapId, NodeId};
pub use layout::{
    Connector, ElementBounds, ElementTable, Placement, hit_test, resolve_connectors,
};
pub use model::*;
pub use viewport::{InvalidZoomLimits, ViewportState, ZoomLimits};

// Re-export petgraph types so downstream crates don't need a direct dependency
pub use petgraph::graph::NodeIndex;
