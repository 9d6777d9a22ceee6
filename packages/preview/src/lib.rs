//! Siteforge Preview - Sandbox orchestration and readiness detection
//!
//! Owns the sandbox lifecycle for one generated project: mounts the
//! projected file tree, repairs known-bad generated configuration,
//! conditionally installs dependencies, selects a startup command, and
//! races three independent readiness signals to discover a servable URL
//! under a bounded timeout.

pub mod manifest;
pub mod orchestrator;
pub mod readiness;
pub mod repair;
pub mod types;

pub use manifest::LaunchCommand;
pub use orchestrator::{PreviewOrchestrator, PreviewSession};
pub use types::{
    LogKind, OutputWindow, PreviewConfig, PreviewError, PreviewResult, SessionLog, SessionPhase,
};

/// Version information for the preview crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
