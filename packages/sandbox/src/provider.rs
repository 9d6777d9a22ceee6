// ABOUTME: Provider traits for sandbox execution backends
// ABOUTME: Defines the mount and process primitives the orchestrator drives

use crate::types::{OutputChunk, SandboxResult, ServerReady};
use async_trait::async_trait;
use siteforge_filetree::MountTree;
use tokio::sync::{broadcast, mpsc};

/// An isolated, ephemeral runtime capable of mounting a file system and
/// spawning processes.
///
/// `mount` has overlay semantics: mounting a partial tree merges over the
/// existing file system, so a single corrected file can be re-mounted
/// without disturbing the rest.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Materialize the mount tree into the sandbox file system
    async fn mount(&self, tree: &MountTree) -> SandboxResult<()>;

    /// Spawn a command inside the sandbox
    async fn spawn(&self, command: &str, args: &[&str]) -> SandboxResult<Box<dyn SandboxProcess>>;

    /// Subscribe to "server ready" events carrying a port and/or URL.
    ///
    /// Providers that cannot emit the event return a receiver that never
    /// fires; readiness then falls to output pattern detection.
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;
}

/// A long-running process spawned inside the sandbox
#[async_trait]
pub trait SandboxProcess: Send + std::fmt::Debug {
    /// Take the combined stdout/stderr stream. Yields each line in arrival
    /// order; can be taken once.
    fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<OutputChunk>>;

    /// Await process exit and return its exit code
    async fn wait(&mut self) -> SandboxResult<i32>;

    /// Terminate the process
    async fn kill(&mut self) -> SandboxResult<()>;
}
