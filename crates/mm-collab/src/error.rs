//! Error types for channels, persistence, and sessions.

use mm_core::error::TreeError;
use mm_core::id::MindMapId;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollabError {
    /// The channel could not deliver an outbound frame.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The store has no mind map under this id.
    #[error("mind map {0} not found")]
    NotFound(MindMapId),

    /// An operation that needs a joined room ran outside one.
    #[error("not joined to a mind map")]
    NotJoined,

    /// A frame was malformed or too large.
    #[error("codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// A stored snapshot failed validation.
    #[error("invalid tree: {0}")]
    Tree(#[from] TreeError),
}

pub type Result<T> = std::result::Result<T, CollabError>;
