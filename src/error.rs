//! Error types for the state tree.

use crate::types::NodeId;
use thiserror::Error;

/// Main error type for state tree operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Node disposed: {0}")]
    NodeDisposed(NodeId),

    #[error("Node {0} belongs to a different tree")]
    ForeignNode(NodeId),

    #[error("Node {0} is already attached to a parent")]
    AlreadyAttached(NodeId),

    #[error("Attaching {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("Key is owned by a child node: {0}")]
    ChildOwned(String),

    #[error("Value at {0:?} is not a mapping")]
    NotAContainer(String),

    #[error("Index {index} is too far past the end of a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Patch must be a mapping, got {0}")]
    InvalidPatch(&'static str),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Duplicate field in schema: {0}")]
    DuplicateField(String),

    #[error("Unknown view field: {0}")]
    UnknownField(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StateError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StateError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

/// Result type for state tree operations.
pub type Result<T> = std::result::Result<T, StateError>;
