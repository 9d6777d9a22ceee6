// ABOUTME: Integration tests for the preview orchestrator pipeline
// ABOUTME: Drives the full state machine against a scripted sandbox

use async_trait::async_trait;
use siteforge_artifact::{ArtifactParser, BuildAction};
use siteforge_filetree::{flatten_files, FileTree, MountTree};
use siteforge_preview::repair::FIXED_VITE_CONFIG;
use siteforge_preview::{PreviewConfig, PreviewError, PreviewOrchestrator, SessionPhase};
use siteforge_sandbox::{
    OutputChunk, Sandbox, SandboxProcess, SandboxResult, ServerReady, StreamKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Scripted sandbox: records mounts and spawns, emits canned output
struct FakeSandbox {
    mounts: Mutex<Vec<MountTree>>,
    commands: Mutex<Vec<String>>,
    install_exit: i32,
    install_lines: Vec<String>,
    run_lines: Vec<String>,
    ready_tx: broadcast::Sender<ServerReady>,
    kills: Arc<AtomicUsize>,
}

impl FakeSandbox {
    fn new(run_lines: &[&str]) -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            mounts: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            install_exit: 0,
            install_lines: Vec::new(),
            run_lines: run_lines.iter().map(|s| s.to_string()).collect(),
            ready_tx,
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_install(mut self, exit: i32, lines: &[&str]) -> Self {
        self.install_exit = exit;
        self.install_lines = lines.iter().map(|s| s.to_string()).collect();
        self
    }

    fn recorded_commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn recorded_mounts(&self) -> Vec<MountTree> {
        self.mounts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn mount(&self, tree: &MountTree) -> SandboxResult<()> {
        self.mounts.lock().unwrap().push(tree.clone());
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[&str]) -> SandboxResult<Box<dyn SandboxProcess>> {
        let command_line = format!("{} {}", command, args.join(" "));
        self.commands.lock().unwrap().push(command_line.clone());

        let process = if args.first() == Some(&"install") {
            FakeProcess::exiting(self.install_exit, &self.install_lines)
        } else {
            FakeProcess::long_running(&self.run_lines, self.kills.clone())
        };
        Ok(Box::new(process))
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

#[derive(Debug)]
struct FakeProcess {
    exit: Option<i32>,
    output: Option<mpsc::UnboundedReceiver<OutputChunk>>,
    kills: Option<Arc<AtomicUsize>>,
}

impl FakeProcess {
    fn exiting(exit: i32, lines: &[String]) -> Self {
        Self {
            exit: Some(exit),
            output: Some(canned_output(lines)),
            kills: None,
        }
    }

    fn long_running(lines: &[String], kills: Arc<AtomicUsize>) -> Self {
        Self {
            exit: None,
            output: Some(canned_output(lines)),
            kills: Some(kills),
        }
    }
}

fn canned_output(lines: &[String]) -> mpsc::UnboundedReceiver<OutputChunk> {
    let (tx, rx) = mpsc::unbounded_channel();
    for line in lines {
        tx.send(OutputChunk {
            stream: StreamKind::Stdout,
            line: line.clone(),
        })
        .unwrap();
    }
    rx
}

#[async_trait]
impl SandboxProcess for FakeProcess {
    fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<OutputChunk>> {
        self.output.take()
    }

    async fn wait(&mut self) -> SandboxResult<i32> {
        match self.exit {
            Some(code) => Ok(code),
            None => std::future::pending().await,
        }
    }

    async fn kill(&mut self) -> SandboxResult<()> {
        if let Some(kills) = &self.kills {
            kills.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn fast_config() -> PreviewConfig {
    PreviewConfig {
        scan_initial_delay: Duration::from_millis(50),
        scan_interval: Duration::from_millis(20),
        readiness_timeout: Duration::from_millis(250),
        ..PreviewConfig::default()
    }
}

fn build_tree(artifact: &str) -> (FileTree, Vec<BuildAction>) {
    let mut steps = ArtifactParser::parse_steps(artifact, 0, 0);
    let mut tree = FileTree::new();
    let outcome = tree.apply(&mut steps);
    assert!(outcome.conflicts.is_empty());
    (tree, outcome.scripts)
}

const VITE_PROJECT: &str = r#"
<boltArtifact id="demo" title="Demo">
  <boltAction type="file" filePath="src/App.tsx">
export default function App() { return null; }
  </boltAction>
  <boltAction type="file" filePath="package.json">
{ "name": "demo", "scripts": { "dev": "vite" } }
  </boltAction>
  <boltAction type="shell">
npm run dev
  </boltAction>
</boltArtifact>
"#;

#[tokio::test]
async fn end_to_end_artifact_to_ready_url() {
    let (tree, scripts) = build_tree(VITE_PROJECT);

    // Parsed then merged: two files under correct paths, one forwarded
    // script, in original document order
    assert!(tree.get("src/App.tsx").unwrap().is_file());
    assert!(tree.get("package.json").unwrap().is_file());
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].payload, "npm run dev");

    let sandbox = Arc::new(FakeSandbox::new(&[
        "  VITE v5.4.2  ready in 320 ms",
        "  Local:   http://localhost:5173/",
    ]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    let url = orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(url, "http://localhost:5173/");

    // No dependencies declared, so no install ran
    assert_eq!(sandbox.recorded_commands(), vec!["npm run dev"]);

    let session = orchestrator.session().await.unwrap();
    assert_eq!(session.phase, SessionPhase::Ready);
    assert_eq!(session.resolved_url.as_deref(), Some("http://localhost:5173/"));
    assert_eq!(session.selected_command.as_deref(), Some("npm run dev"));
    assert_eq!(session.scripts.len(), 1);
}

#[tokio::test]
async fn install_runs_only_for_declared_dependencies() {
    let artifact = r#"
<boltArtifact id="demo">
  <boltAction type="file" filePath="package.json">
{ "name": "demo", "dependencies": { "react": "^18.0.0" }, "scripts": { "dev": "vite" } }
  </boltAction>
</boltArtifact>
"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(
        FakeSandbox::new(&["Local: http://localhost:3000"]).with_install(0, &["added 1 package"]),
    );
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(
        sandbox.recorded_commands(),
        vec!["npm install", "npm run dev"]
    );

    let session = orchestrator.session().await.unwrap();
    assert!(session.install_output.contains("added 1 package"));
}

#[tokio::test]
async fn install_failure_is_fatal_with_captured_output() {
    let artifact = r#"
<boltArtifact id="demo">
  <boltAction type="file" filePath="package.json">
{ "name": "demo", "dependencies": { "left-pad": "*" }, "scripts": { "dev": "vite" } }
  </boltAction>
</boltArtifact>
"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(
        FakeSandbox::new(&[]).with_install(1, &["npm ERR! code E404", "npm ERR! boom"]),
    );
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    let err = orchestrator.preview(&tree, scripts).await.unwrap_err();
    match err {
        PreviewError::Install { exit_code, output } => {
            assert_eq!(exit_code, 1);
            assert!(output.contains("boom"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Install failed, the dev server was never launched
    assert_eq!(sandbox.recorded_commands(), vec!["npm install"]);

    let session = orchestrator.session().await.unwrap();
    assert_eq!(session.phase, SessionPhase::Error);
    assert!(session
        .error
        .as_deref()
        .unwrap()
        .contains("exit code: 1"));
}

#[tokio::test]
async fn missing_manifest_without_markup_is_fatal() {
    let artifact = r#"<a type="file" filePath="src/main.ts">console.log(1)</a>"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&[]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox, fast_config());

    let err = orchestrator.preview(&tree, scripts).await.unwrap_err();
    assert!(matches!(err, PreviewError::ManifestMissing));
    assert_eq!(err.to_string(), "No package.json or HTML files found");
}

#[tokio::test]
async fn markup_only_project_gets_a_synthesized_manifest() {
    let artifact = r#"<a type="file" filePath="index.html">&lt;html&gt;&lt;/html&gt;</a>"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&["Local: http://localhost:4173/"]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    let url = orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(url, "http://localhost:4173/");

    // Second mount is the synthesized manifest overlay
    let mounts = sandbox.recorded_mounts();
    assert_eq!(mounts.len(), 2);
    let overlay = &mounts[1];
    let manifest = overlay.get("package.json").unwrap().contents().unwrap();
    assert!(manifest.contains("static-preview"));

    // The synthesized dev script is what gets launched
    assert_eq!(sandbox.recorded_commands(), vec!["npm run dev"]);
}

#[tokio::test]
async fn manifest_without_usable_script_and_no_markup_is_fatal() {
    let artifact = r#"
<a type="file" filePath="package.json">{ "scripts": { "build": "tsc", "test": "vitest" } }</a>
"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&[]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox, fast_config());

    let err = orchestrator.preview(&tree, scripts).await.unwrap_err();
    match err {
        PreviewError::ScriptNotFound { available } => {
            assert!(available.contains(&"build".to_string()));
            assert!(available.contains(&"test".to_string()));
            assert_eq!(available.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn markup_fallback_launches_static_serving() {
    let artifact = r#"
<boltArtifact id="demo">
  <boltAction type="file" filePath="package.json">{ "scripts": { "build": "tsc" } }</boltAction>
  <boltAction type="file" filePath="index.html">&lt;html&gt;&lt;/html&gt;</boltAction>
</boltArtifact>
"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&["Local: http://localhost:4173/"]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(
        sandbox.recorded_commands(),
        vec!["npx vite --port 4173 --host"]
    );
}

#[tokio::test]
async fn trailing_port_number_reconstructs_a_loopback_url() {
    let artifact = r#"
<a type="file" filePath="package.json">{ "dependencies": { "express": "^4" }, "scripts": { "start": "node server.js" } }</a>
"#;
    let (tree, scripts) = build_tree(artifact);

    // Install succeeds, launch output has no recognizable pattern but
    // does end with a five-digit number
    let sandbox = Arc::new(
        FakeSandbox::new(&["booting worker", "server up, listening 54321"])
            .with_install(0, &["ok"]),
    );
    let orchestrator = PreviewOrchestrator::with_config(sandbox, fast_config());

    let url = orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(url, "http://localhost:54321");
}

#[tokio::test]
async fn silent_server_without_any_port_is_fatal() {
    let artifact = r#"<a type="file" filePath="package.json">{ "scripts": { "dev": "vite" } }</a>"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&["compiling...", "done"]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox, fast_config());

    let err = orchestrator.preview(&tree, scripts).await.unwrap_err();
    match &err {
        PreviewError::NoUrlDetected { output } => assert!(output.contains("compiling")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.to_string(),
        "Server started but no accessible URL found"
    );
}

#[tokio::test]
async fn structured_ready_event_wins_the_race() {
    let artifact = r#"<a type="file" filePath="package.json">{ "scripts": { "dev": "vite" } }</a>"#;
    let (tree, scripts) = build_tree(artifact);

    // Pattern scanning would never fire: no output, long scan delay
    let sandbox = Arc::new(FakeSandbox::new(&[]));
    let config = PreviewConfig {
        scan_initial_delay: Duration::from_secs(30),
        readiness_timeout: Duration::from_secs(10),
        ..PreviewConfig::default()
    };
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), config);

    let notifier = sandbox.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = notifier.ready_tx.send(ServerReady {
            port: 5173,
            url: Some("http://localhost:5173/".to_string()),
        });
    });

    let url = orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(url, "http://localhost:5173/");
}

#[tokio::test]
async fn port_only_ready_event_reconstructs_loopback() {
    let artifact = r#"<a type="file" filePath="package.json">{ "scripts": { "dev": "vite" } }</a>"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&[]));
    let config = PreviewConfig {
        scan_initial_delay: Duration::from_secs(30),
        readiness_timeout: Duration::from_secs(10),
        ..PreviewConfig::default()
    };
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), config);

    let notifier = sandbox.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = notifier.ready_tx.send(ServerReady {
            port: 8080,
            url: None,
        });
    });

    let url = orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(url, "http://localhost:8080");
}

#[tokio::test]
async fn malformed_vite_config_is_repaired_before_launch() {
    let artifact = r#"
<boltArtifact id="demo">
  <boltAction type="file" filePath="vite.config.ts">
import { defineConfig } from 'vite';
export default defineConfig({
  plugins: [react()],
  exclude: ['lucide-react'],
});
  </boltAction>
  <boltAction type="file" filePath="package.json">{ "scripts": { "dev": "vite" } }</boltAction>
</boltArtifact>
"#;
    let (tree, scripts) = build_tree(artifact);

    let sandbox = Arc::new(FakeSandbox::new(&["Local: http://localhost:5173/"]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    orchestrator.preview(&tree, scripts).await.unwrap();

    let mounts = sandbox.recorded_mounts();
    assert_eq!(mounts.len(), 2, "full mount plus the repair overlay");
    assert_eq!(
        mounts[1].get("vite.config.ts").unwrap().contents(),
        Some(FIXED_VITE_CONFIG)
    );

    // The session's view of the mounted files carries the fix too
    let session = orchestrator.session().await.unwrap();
    let repaired = flatten_files(&session.mounted_files)
        .into_iter()
        .find(|(path, _)| path == "vite.config.ts")
        .map(|(_, contents)| contents.to_string())
        .unwrap();
    assert_eq!(repaired, FIXED_VITE_CONFIG);
}

#[tokio::test]
async fn retry_terminates_the_previous_process_and_remounts() {
    let (tree, scripts) = build_tree(VITE_PROJECT);

    let sandbox = Arc::new(FakeSandbox::new(&["Local: http://localhost:5173/"]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox.clone(), fast_config());

    orchestrator.preview(&tree, scripts).await.unwrap();
    assert_eq!(sandbox.kills.load(Ordering::SeqCst), 0);
    let first_id = orchestrator.session().await.unwrap().id;

    let url = orchestrator.retry().await.unwrap();
    assert_eq!(url, "http://localhost:5173/");
    assert_eq!(
        sandbox.kills.load(Ordering::SeqCst),
        1,
        "previous dev server was terminated before remounting"
    );

    let session = orchestrator.session().await.unwrap();
    assert_ne!(session.id, first_id, "retry supersedes the session");
    assert_eq!(sandbox.recorded_commands().len(), 2);
}

#[tokio::test]
async fn retry_without_a_prior_session_fails() {
    let sandbox = Arc::new(FakeSandbox::new(&[]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox, fast_config());
    assert!(orchestrator.retry().await.is_err());
}

#[tokio::test]
async fn run_output_is_captured_for_diagnosis() {
    let (tree, scripts) = build_tree(VITE_PROJECT);

    let sandbox = Arc::new(FakeSandbox::new(&[
        "  VITE v5.4.2  ready in 320 ms",
        "  Local:   http://localhost:5173/",
    ]));
    let orchestrator = PreviewOrchestrator::with_config(sandbox, fast_config());

    orchestrator.preview(&tree, scripts).await.unwrap();

    let output = orchestrator.run_output().await;
    assert!(output.contains("VITE v5.4.2"));

    let logs = orchestrator.session_logs().await;
    assert!(logs
        .iter()
        .any(|log| log.message.contains("Starting dev server with: npm run dev")));
    assert!(logs
        .iter()
        .any(|log| log.message.contains("Preview ready at http://localhost:5173/")));
}
