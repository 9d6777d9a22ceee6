// ABOUTME: Sandbox boundary crate for Siteforge
// ABOUTME: Exposes the mount/process contracts and the host-process provider

//! Siteforge Sandbox - Execution sandbox boundary
//!
//! The orchestrator depends on exactly two structural contracts from the
//! host sandbox: a mount primitive accepting the projected file tree, and
//! a process primitive returning an output stream, an awaitable exit code,
//! and a "server ready" event subscription. This crate defines those
//! contracts and ships a host-process implementation.

pub mod host;
pub mod provider;
pub mod types;

pub use host::{HostProcess, HostSandbox};
pub use provider::{Sandbox, SandboxProcess};
pub use types::{OutputChunk, SandboxError, SandboxResult, ServerReady, StreamKind};

/// Version information for the sandbox crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
