// ABOUTME: Core type definitions for sandbox execution
// ABOUTME: Defines output stream chunks, errors, and the server-ready event

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which pipe an output chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// One line of combined process output, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub line: String,
}

/// Structured "server ready" event from the sandbox runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: Option<String>,
}

/// Error types for sandbox operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Mount failed: {reason}")]
    MountFailed { reason: String },

    #[error("Failed to spawn process '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Sandbox not available: {reason}")]
    Unavailable { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;
