use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siteforge_sandbox::SandboxError;
use std::time::Duration;

/// Phase of the preview pipeline state machine.
///
/// `Ready` and `Error` are terminal; `Error` is reachable from every
/// phase. `Installing` is entered only when the manifest declares
/// dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    Idle,
    Mounting,
    ConfigRepair,
    DependencyCheck,
    Installing,
    ScriptSelection,
    Launching,
    ReadinessRace,
    Ready,
    Error,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Mounting => "mounting",
            SessionPhase::ConfigRepair => "config-repair",
            SessionPhase::DependencyCheck => "dependency-check",
            SessionPhase::Installing => "installing",
            SessionPhase::ScriptSelection => "script-selection",
            SessionPhase::Launching => "launching",
            SessionPhase::ReadinessRace => "readiness-race",
            SessionPhase::Ready => "ready",
            SessionPhase::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Ready | SessionPhase::Error)
    }
}

/// Log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Stdout,
    Stderr,
    System,
}

/// One captured line of session output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

/// Rolling window over a logically unbounded output buffer.
///
/// Keeps only the most recent bytes for pattern matching while tracking
/// the total length ever written.
#[derive(Debug, Clone)]
pub struct OutputWindow {
    window: String,
    total_len: usize,
    cap: usize,
}

impl OutputWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            window: String::new(),
            total_len: 0,
            cap,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.total_len += line.len() + 1;
        self.window.push_str(line);
        self.window.push('\n');
        if self.window.len() > self.cap {
            let mut cut = self.window.len() - self.cap;
            while !self.window.is_char_boundary(cut) {
                cut += 1;
            }
            self.window.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.window
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }
}

impl Default for OutputWindow {
    fn default() -> Self {
        Self::new(PreviewConfig::default().output_window_bytes)
    }
}

/// Timing and buffering knobs for the readiness race.
///
/// Defaults preserve the observable behavior of the original pipeline:
/// the first pattern scan runs 8 seconds after launch and the race gives
/// up 20 seconds in. The readiness limit is the only timeout in the whole
/// pipeline; a hung install or launch stalls it indefinitely.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub scan_initial_delay: Duration,
    pub scan_interval: Duration,
    pub readiness_timeout: Duration,
    pub output_window_bytes: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            scan_initial_delay: Duration::from_secs(8),
            scan_interval: Duration::from_millis(500),
            readiness_timeout: Duration::from_secs(20),
            output_window_bytes: 64 * 1024,
        }
    }
}

pub(crate) fn format_scripts(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

/// Error types for preview orchestration.
///
/// Every variant is fatal for the attempt and carries enough captured
/// context to diagnose without re-running; the consumer retries the whole
/// pipeline from scratch.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("Mount failed: {reason}")]
    Mount { reason: String },

    #[error("No package.json or HTML files found")]
    ManifestMissing,

    #[error("Failed to install dependencies (exit code: {exit_code})")]
    Install { exit_code: i32, output: String },

    #[error("No dev script found. Available scripts: {}", format_scripts(.available))]
    ScriptNotFound { available: Vec<String> },

    #[error("Server started but no accessible URL found")]
    NoUrlDetected { output: String },

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Result type for preview operations
pub type PreviewResult<T> = Result<T, PreviewError>;
