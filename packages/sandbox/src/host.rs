// ABOUTME: Host-process sandbox implementation
// ABOUTME: Materializes mounts under a root directory and spawns real processes there

use crate::provider::{Sandbox, SandboxProcess};
use crate::types::{OutputChunk, SandboxError, SandboxResult, ServerReady, StreamKind};
use async_trait::async_trait;
use siteforge_filetree::{MountNode, MountTree};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Validate one mount entry name to keep mounts inside the sandbox root
fn validate_entry_name(name: &str) -> SandboxResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(SandboxError::MountFailed {
            reason: format!("invalid mount entry name: {:?}", name),
        });
    }
    if name.contains('/') || name.contains('\\') {
        return Err(SandboxError::MountFailed {
            reason: format!("mount entry name contains a path separator: {:?}", name),
        });
    }
    Ok(())
}

/// Sandbox backed by a directory on the host and real processes.
///
/// Mounting overlays the given tree onto the root directory; spawning runs
/// the command with the root as its working directory, stdout/stderr piped
/// and stdin closed. This provider never emits structured server-ready
/// events, so readiness detection relies on output patterns.
pub struct HostSandbox {
    root: PathBuf,
    ready_tx: broadcast::Sender<ServerReady>,
}

impl HostSandbox {
    pub fn new(root: PathBuf) -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self { root, ready_tx }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Forward a structured server-ready event to subscribers.
    ///
    /// The host process model has no runtime of its own to observe; an
    /// embedding layer that does learn about readiness can inject the
    /// event here.
    pub fn notify_server_ready(&self, event: ServerReady) {
        let _ = self.ready_tx.send(event);
    }

    fn collect_entries<'a>(
        &self,
        base: &Path,
        tree: &'a MountTree,
        dirs: &mut Vec<PathBuf>,
        files: &mut Vec<(PathBuf, &'a str)>,
    ) -> SandboxResult<()> {
        for (name, node) in tree {
            validate_entry_name(name)?;
            let path = base.join(name);
            match node {
                MountNode::File(entry) => files.push((path, entry.contents.as_str())),
                MountNode::Directory(children) => {
                    dirs.push(path.clone());
                    self.collect_entries(&path, children, dirs, files)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sandbox for HostSandbox {
    async fn mount(&self, tree: &MountTree) -> SandboxResult<()> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        self.collect_entries(&self.root, tree, &mut dirs, &mut files)?;

        fs::create_dir_all(&self.root).await?;
        for dir in &dirs {
            fs::create_dir_all(dir).await?;
        }
        for (path, contents) in &files {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, contents).await?;
        }

        debug!(
            root = %self.root.display(),
            files = files.len(),
            "mounted file tree"
        );
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[&str]) -> SandboxResult<Box<dyn SandboxProcess>> {
        let command_str = if args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, args.join(" "))
        };

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SandboxError::SpawnFailed {
            command: command_str.clone(),
            reason: e.to_string(),
        })?;

        info!(command = %command_str, pid = ?child.id(), "spawned sandbox process");

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            pump_lines(stdout, StreamKind::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump_lines(stderr, StreamKind::Stderr, tx);
        }

        Ok(Box::new(HostProcess {
            command: command_str,
            child,
            output: Some(rx),
        }))
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

/// Pump one pipe into the combined output channel, line by line
fn pump_lines<R>(pipe: R, stream: StreamKind, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let reader = BufReader::new(pipe);
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(OutputChunk { stream, line }).is_err() {
                break;
            }
        }
    });
}

/// Process handle returned by [`HostSandbox::spawn`]
#[derive(Debug)]
pub struct HostProcess {
    command: String,
    child: Child,
    output: Option<mpsc::UnboundedReceiver<OutputChunk>>,
}

#[async_trait]
impl SandboxProcess for HostProcess {
    fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<OutputChunk>> {
        self.output.take()
    }

    async fn wait(&mut self) -> SandboxResult<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&mut self) -> SandboxResult<()> {
        if let Some(status) = self.child.try_wait()? {
            debug!(command = %self.command, ?status, "process already exited");
            return Ok(());
        }
        if let Err(e) = self.child.kill().await {
            warn!(command = %self.command, error = %e, "failed to kill process");
            return Err(SandboxError::Io(e));
        }
        Ok(())
    }
}
