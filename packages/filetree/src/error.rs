use thiserror::Error;

/// Error types for tree operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Path conflict at {path}: {reason}")]
    PathConflict { path: String, reason: String },

    #[error("Empty path")]
    EmptyPath,
}

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;
