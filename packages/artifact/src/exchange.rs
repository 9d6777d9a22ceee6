use serde::{Deserialize, Serialize};

/// Response shape returned by the generation backend for a new project.
///
/// `prompts` prime the model for the follow-up conversation; the first
/// entry of `ui_prompts` is the template artifact the UI feeds straight
/// into the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub prompts: Vec<String>,
    #[serde(rename = "uiPrompts")]
    pub ui_prompts: Vec<String>,
}

impl TemplateResponse {
    /// The artifact text to parse for the initial project scaffold, if any
    pub fn template_artifact(&self) -> Option<&str> {
        self.ui_prompts.first().map(String::as_str)
    }
}

/// Response shape returned by the generation backend for one conversation
/// turn; `response` is a single artifact string appended to the running
/// step sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub response: String,
}
