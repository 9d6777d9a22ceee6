use crate::manifest::{self, LaunchCommand};
use crate::readiness;
use crate::repair;
use crate::types::{
    LogKind, OutputWindow, PreviewConfig, PreviewError, PreviewResult, SessionLog, SessionPhase,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use siteforge_artifact::BuildAction;
use siteforge_filetree::{overlay_file, project, single_file_tree, FileTree, MountTree};
use siteforge_sandbox::{OutputChunk, Sandbox, SandboxProcess, ServerReady, StreamKind};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOG_CAP: usize = 1000;

/// Buffers shared between a session and its output pump task
pub(crate) struct SessionShared {
    pub(crate) window: RwLock<OutputWindow>,
    pub(crate) logs: RwLock<VecDeque<SessionLog>>,
}

impl SessionShared {
    fn new(window_bytes: usize) -> Self {
        Self {
            window: RwLock::new(OutputWindow::new(window_bytes)),
            logs: RwLock::new(VecDeque::new()),
        }
    }

    async fn add_log(&self, kind: LogKind, message: String) {
        let mut logs = self.logs.write().await;
        logs.push_back(SessionLog {
            timestamp: Utc::now(),
            kind,
            message,
        });
        // Keep only the most recent entries to prevent memory issues
        if logs.len() > LOG_CAP {
            logs.pop_front();
        }
    }

    async fn push_output(&self, chunk: OutputChunk) {
        self.window.write().await.push_line(&chunk.line);
        let kind = match chunk.stream {
            StreamKind::Stdout => LogKind::Stdout,
            StreamKind::Stderr => LogKind::Stderr,
        };
        self.add_log(kind, chunk.line).await;
    }
}

/// State of one preview attempt.
///
/// Created once per attempt and superseded, not mutated in place, by each
/// retry; the orchestrator takes explicit ownership of the previous
/// session's process handle and terminates it before remounting.
pub struct PreviewSession {
    pub id: Uuid,
    pub phase: SessionPhase,
    /// Last projected mount structure handed to the sandbox
    pub mounted_files: MountTree,
    /// `RunScript` instructions forwarded from the tree builder, in
    /// document order
    pub scripts: Vec<BuildAction>,
    pub selected_command: Option<String>,
    pub install_output: String,
    pub resolved_url: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub(crate) shared: Arc<SessionShared>,
    /// Handle to the launched dev-server process (not cloned)
    pub(crate) process: Option<Box<dyn SandboxProcess>>,
}

impl PreviewSession {
    fn new(mounted_files: MountTree, scripts: Vec<BuildAction>, config: &PreviewConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: SessionPhase::Idle,
            mounted_files,
            scripts,
            selected_command: None,
            install_output: String::new(),
            resolved_url: None,
            error: None,
            started_at: Utc::now(),
            shared: Arc::new(SessionShared::new(config.output_window_bytes)),
            process: None,
        }
    }
}

impl Clone for PreviewSession {
    fn clone(&self) -> Self {
        PreviewSession {
            id: self.id,
            phase: self.phase,
            mounted_files: self.mounted_files.clone(),
            scripts: self.scripts.clone(),
            selected_command: self.selected_command.clone(),
            install_output: self.install_output.clone(),
            resolved_url: self.resolved_url.clone(),
            error: self.error.clone(),
            started_at: self.started_at,
            shared: self.shared.clone(),
            process: None, // Don't clone the process handle
        }
    }
}

struct ManifestContext {
    value: Value,
    has_markup: bool,
}

/// Drives the sandbox lifecycle for one project: mount, config repair,
/// dependency install, startup-script selection, and concurrent readiness
/// detection producing a servable URL or a diagnosable failure.
///
/// Only one attempt is in flight at a time; a new attempt waits for the
/// current one, then supersedes its session.
pub struct PreviewOrchestrator {
    sandbox: Arc<dyn Sandbox>,
    config: PreviewConfig,
    state: Mutex<Option<PreviewSession>>,
}

impl PreviewOrchestrator {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self::with_config(sandbox, PreviewConfig::default())
    }

    pub fn with_config(sandbox: Arc<dyn Sandbox>, config: PreviewConfig) -> Self {
        Self {
            sandbox,
            config,
            state: Mutex::new(None),
        }
    }

    /// Run the whole pipeline for the current file tree.
    ///
    /// `scripts` are the `RunScript` instructions the tree builder
    /// forwarded; they are queued on the session for the consumer in
    /// document order.
    pub async fn preview(
        &self,
        tree: &FileTree,
        scripts: Vec<BuildAction>,
    ) -> PreviewResult<String> {
        let mounted = project(tree);
        self.run_attempt(mounted, scripts).await
    }

    /// Restart the machine from `Mounting` with the previous session's
    /// file tree, terminating its process first
    pub async fn retry(&self) -> PreviewResult<String> {
        let (mounted, scripts) = {
            let guard = self.state.lock().await;
            match guard.as_ref() {
                Some(session) => (session.mounted_files.clone(), session.scripts.clone()),
                None => {
                    return Err(PreviewError::Mount {
                        reason: "no previous session to retry".to_string(),
                    })
                }
            }
        };
        self.run_attempt(mounted, scripts).await
    }

    /// Snapshot of the most recent session, without its process handle
    pub async fn session(&self) -> Option<PreviewSession> {
        self.state.lock().await.clone()
    }

    /// Captured log lines of the most recent session
    pub async fn session_logs(&self) -> Vec<SessionLog> {
        match self.state.lock().await.as_ref() {
            Some(session) => session.shared.logs.read().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// The rolling output window of the launched process
    pub async fn run_output(&self) -> String {
        match self.state.lock().await.as_ref() {
            Some(session) => session.shared.window.read().await.as_str().to_string(),
            None => String::new(),
        }
    }

    async fn run_attempt(
        &self,
        mounted: MountTree,
        scripts: Vec<BuildAction>,
    ) -> PreviewResult<String> {
        let mut guard = self.state.lock().await;

        // Take ownership of the superseded session's process and terminate
        // it before remounting
        if let Some(previous) = guard.take() {
            if let Some(mut process) = previous.process {
                info!(session = %previous.id, "terminating superseded session process");
                if let Err(e) = process.kill().await {
                    warn!(session = %previous.id, error = %e, "failed to kill superseded process");
                }
            }
        }

        let mut session = PreviewSession::new(mounted, scripts, &self.config);
        info!(session = %session.id, "starting preview attempt");

        let result = self.drive(&mut session).await;
        match &result {
            Ok(url) => {
                session.phase = SessionPhase::Ready;
                session.resolved_url = Some(url.clone());
                session
                    .shared
                    .add_log(LogKind::System, format!("Preview ready at {}", url))
                    .await;
                info!(session = %session.id, url = %url, "preview ready");
            }
            Err(e) => {
                session.phase = SessionPhase::Error;
                session.error = Some(e.to_string());
                session
                    .shared
                    .add_log(LogKind::System, format!("Preview failed: {}", e))
                    .await;
                warn!(session = %session.id, error = %e, "preview attempt failed");
            }
        }

        *guard = Some(session);
        result
    }

    async fn drive(&self, session: &mut PreviewSession) -> PreviewResult<String> {
        self.mount_files(session).await?;
        self.repair_config(session).await?;
        let manifest = self.check_dependencies(session).await?;
        self.install_dependencies(session, &manifest.value).await?;
        let command = self.select_command(session, &manifest)?;
        self.launch(session, &command).await?;
        self.race_readiness(session).await
    }

    async fn mount_files(&self, session: &mut PreviewSession) -> PreviewResult<()> {
        session.phase = SessionPhase::Mounting;
        session
            .shared
            .add_log(
                LogKind::System,
                format!("Mounting {} top-level entries", session.mounted_files.len()),
            )
            .await;

        self.sandbox
            .mount(&session.mounted_files)
            .await
            .map_err(|e| PreviewError::Mount {
                reason: e.to_string(),
            })
    }

    async fn repair_config(&self, session: &mut PreviewSession) -> PreviewResult<()> {
        session.phase = SessionPhase::ConfigRepair;

        let Some(path) = repair::find_broken_vite_config(&session.mounted_files) else {
            return Ok(());
        };

        let overlay = single_file_tree(&path, repair::FIXED_VITE_CONFIG);
        self.sandbox
            .mount(&overlay)
            .await
            .map_err(|e| PreviewError::Mount {
                reason: e.to_string(),
            })?;
        overlay_file(&mut session.mounted_files, &path, repair::FIXED_VITE_CONFIG);

        session
            .shared
            .add_log(LogKind::System, format!("Repaired malformed {}", path))
            .await;
        Ok(())
    }

    async fn check_dependencies(
        &self,
        session: &mut PreviewSession,
    ) -> PreviewResult<ManifestContext> {
        session.phase = SessionPhase::DependencyCheck;

        let has_markup = manifest::has_markup_entry(&session.mounted_files);
        let value = match manifest::locate_manifest(&session.mounted_files) {
            Some((path, contents)) => {
                debug!(path = %path, "found project manifest");
                manifest::parse_manifest(&contents)
            }
            None if has_markup => {
                let contents = manifest::static_manifest();
                let overlay = single_file_tree("package.json", &contents);
                self.sandbox
                    .mount(&overlay)
                    .await
                    .map_err(|e| PreviewError::Mount {
                        reason: e.to_string(),
                    })?;
                overlay_file(&mut session.mounted_files, "package.json", &contents);

                session
                    .shared
                    .add_log(
                        LogKind::System,
                        "No manifest found, synthesized static-preview package.json".to_string(),
                    )
                    .await;
                manifest::parse_manifest(&contents)
            }
            None => return Err(PreviewError::ManifestMissing),
        };

        Ok(ManifestContext { value, has_markup })
    }

    async fn install_dependencies(
        &self,
        session: &mut PreviewSession,
        manifest_value: &Value,
    ) -> PreviewResult<()> {
        if !manifest::needs_install(manifest_value) {
            debug!("manifest declares no dependencies, skipping install");
            return Ok(());
        }

        session.phase = SessionPhase::Installing;
        session
            .shared
            .add_log(LogKind::System, "Installing dependencies".to_string())
            .await;

        let mut process = self
            .sandbox
            .spawn(manifest::PACKAGE_MANAGER, &["install"])
            .await?;
        let output_rx = process.take_output();
        let exit_code = process.wait().await?;

        let mut output = String::new();
        if let Some(mut rx) = output_rx {
            while let Some(chunk) = rx.recv().await {
                output.push_str(&chunk.line);
                output.push('\n');
            }
        }
        session.install_output = output;

        if exit_code != 0 {
            return Err(PreviewError::Install {
                exit_code,
                output: session.install_output.clone(),
            });
        }

        session
            .shared
            .add_log(LogKind::System, "Dependencies installed".to_string())
            .await;
        Ok(())
    }

    fn select_command(
        &self,
        session: &mut PreviewSession,
        manifest: &ManifestContext,
    ) -> PreviewResult<LaunchCommand> {
        session.phase = SessionPhase::ScriptSelection;

        match manifest::resolve_launch_command(&manifest.value, manifest.has_markup) {
            Some(command) => {
                session.selected_command = Some(command.display());
                Ok(command)
            }
            None => Err(PreviewError::ScriptNotFound {
                available: manifest::available_scripts(&manifest.value),
            }),
        }
    }

    async fn launch(
        &self,
        session: &mut PreviewSession,
        command: &LaunchCommand,
    ) -> PreviewResult<()> {
        session.phase = SessionPhase::Launching;
        session
            .shared
            .add_log(
                LogKind::System,
                format!("Starting dev server with: {}", command.display()),
            )
            .await;

        let mut process = match command {
            LaunchCommand::NpmScript(script) => {
                self.sandbox
                    .spawn(manifest::PACKAGE_MANAGER, &["run", script.as_str()])
                    .await?
            }
            LaunchCommand::StaticServe => {
                self.sandbox
                    .spawn(manifest::STATIC_SERVE_COMMAND, &manifest::STATIC_SERVE_ARGS)
                    .await?
            }
        };

        if let Some(mut rx) = process.take_output() {
            let shared = session.shared.clone();
            // Pump task: ends when the process output closes; holds only
            // the session's own buffers
            tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    shared.push_output(chunk).await;
                }
            });
        }
        session.process = Some(process);
        Ok(())
    }

    async fn race_readiness(&self, session: &mut PreviewSession) -> PreviewResult<String> {
        session.phase = SessionPhase::ReadinessRace;
        session
            .shared
            .add_log(LogKind::System, "Waiting for server readiness".to_string())
            .await;

        let mut ready_rx = self.sandbox.server_ready();
        let shared = session.shared.clone();

        // Source 1: the structured server-ready event. A closed channel
        // pends forever instead of resolving the race.
        let structured = async move {
            loop {
                match ready_rx.recv().await {
                    Ok(event) => return event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed server-ready events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return std::future::pending().await;
                    }
                }
            }
        };

        // Source 2: periodic pattern matching over the rolling window
        let scan_initial_delay = self.config.scan_initial_delay;
        let scan_interval = self.config.scan_interval;
        let scan = async move {
            tokio::time::sleep(scan_initial_delay).await;
            let mut ticker = tokio::time::interval(scan_interval);
            loop {
                ticker.tick().await;
                let window = shared.window.read().await;
                if let Some(url) = readiness::scan_output(window.as_str()) {
                    return url;
                }
            }
        };

        // Source 3: the hard timeout. First settled source wins; the
        // losers are abandoned and observe nothing afterwards.
        let resolved = tokio::select! {
            event = structured => {
                let ServerReady { port, url } = event;
                Some(url.unwrap_or_else(|| readiness::loopback_url(&port.to_string())))
            },
            url = scan => Some(url),
            _ = tokio::time::sleep(self.config.readiness_timeout) => None,
        };

        match resolved {
            Some(url) => Ok(url),
            None => {
                let window = session.shared.window.read().await;
                match readiness::last_resort_port(window.as_str()) {
                    Some(url) => {
                        info!(url = %url, "reconstructed url from trailing port number");
                        Ok(url)
                    }
                    None => Err(PreviewError::NoUrlDetected {
                        output: window.as_str().to_string(),
                    }),
                }
            }
        }
    }
}
