use serde::{Deserialize, Serialize};

/// Kind of build instruction extracted from a generation artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CreateFile,
    CreateFolder,
    EditFile,
    DeleteFile,
    RunScript,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateFile => "CREATE_FILE",
            ActionKind::CreateFolder => "CREATE_FOLDER",
            ActionKind::EditFile => "EDIT_FILE",
            ActionKind::DeleteFile => "DELETE_FILE",
            ActionKind::RunScript => "RUN_SCRIPT",
        }
    }

    /// Whether this kind addresses a path in the file tree
    pub fn takes_path(&self) -> bool {
        !matches!(self, ActionKind::RunScript)
    }
}

/// One atomic instruction extracted from an artifact.
///
/// `sequence` is the position in document order across the whole
/// conversation; it is stable and preserved through merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAction {
    pub kind: ActionKind,
    /// Slash-delimited relative path; `None` only for `RunScript`
    pub path: Option<String>,
    /// File contents, or the command line for `RunScript`
    pub payload: String,
    pub sequence: usize,
}

impl BuildAction {
    /// Path segments with empty components (leading slash, doubled
    /// separators) dropped
    pub fn path_segments(&self) -> Vec<&str> {
        self.path
            .as_deref()
            .map(|p| p.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Lifecycle status of a build step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    /// Terminal error state (path-kind conflict); the reason lives in
    /// `BuildStep::error`
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in-progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::InProgress => 1,
            StepStatus::Completed => 2,
            StepStatus::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

/// A `BuildAction` plus lifecycle status.
///
/// Steps are created `Pending` and only ever move forward
/// (`pending -> in-progress -> completed`); a step reaches `Completed`
/// once its effect has been durably applied to the file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: usize,
    pub title: String,
    pub action: BuildAction,
    pub status: StepStatus,
    pub error: Option<String>,
}

impl BuildStep {
    pub fn new(id: usize, action: BuildAction) -> Self {
        let title = Self::derive_title(&action);
        Self {
            id,
            title,
            action,
            status: StepStatus::Pending,
            error: None,
        }
    }

    fn derive_title(action: &BuildAction) -> String {
        match (action.kind, action.path.as_deref()) {
            (ActionKind::CreateFile, Some(path)) => format!("Create {}", path),
            (ActionKind::CreateFolder, Some(path)) => format!("Create folder {}", path),
            (ActionKind::EditFile, Some(path)) => format!("Edit {}", path),
            (ActionKind::DeleteFile, Some(path)) => format!("Delete {}", path),
            (ActionKind::RunScript, _) => "Run command".to_string(),
            (kind, None) => kind.as_str().to_string(),
        }
    }

    /// Move the status forward; regression requests are no-ops
    pub fn advance_to(&mut self, next: StepStatus) {
        if next.rank() > self.status.rank() {
            self.status = next;
        }
    }

    /// Mark the step failed with a reason. Completed steps stay completed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status != StepStatus::Completed {
            self.status = StepStatus::Failed;
            self.error = Some(reason.into());
        }
    }
}
