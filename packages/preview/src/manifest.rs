use serde_json::Value;
use siteforge_filetree::{flatten_files, MountTree};
use tracing::{debug, warn};

/// Startup script names in priority order
const SCRIPT_PRIORITY: [&str; 4] = ["dev", "start", "serve", "preview"];

/// The command launched when a startup script is selected
pub const PACKAGE_MANAGER: &str = "npm";

/// Static-serving command used when a project has markup but no manifest
/// scripts of its own
pub const STATIC_SERVE_COMMAND: &str = "npx";
pub const STATIC_SERVE_ARGS: [&str; 4] = ["vite", "--port", "4173", "--host"];

/// What the launcher should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCommand {
    /// `npm run <script>`
    NpmScript(String),
    /// The synthesized static-serving command, for markup-only projects
    StaticServe,
}

impl LaunchCommand {
    pub fn display(&self) -> String {
        match self {
            LaunchCommand::NpmScript(script) => format!("npm run {}", script),
            LaunchCommand::StaticServe => format!(
                "{} {}",
                STATIC_SERVE_COMMAND,
                STATIC_SERVE_ARGS.join(" ")
            ),
        }
    }
}

/// Minimal manifest synthesized for a markup-only project, served
/// statically on a fixed port
pub fn static_manifest() -> String {
    let manifest = serde_json::json!({
        "name": "static-preview",
        "version": "1.0.0",
        "scripts": {
            "dev": "npx vite --port 4173 --host",
            "start": "npx http-server . -p 4173 -c-1"
        }
    });
    serde_json::to_string_pretty(&manifest).expect("static manifest serializes")
}

/// Locate the project manifest among mounted files.
///
/// Matches any path ending in `package.json`; the shallowest match wins so
/// a workspace root manifest beats a nested one.
pub fn locate_manifest(mounted: &MountTree) -> Option<(String, String)> {
    flatten_files(mounted)
        .into_iter()
        .filter(|(path, _)| path == "package.json" || path.ends_with("/package.json"))
        .min_by_key(|(path, _)| path.matches('/').count())
        .map(|(path, contents)| (path, contents.to_string()))
}

/// Whether any markup entry file is mounted
pub fn has_markup_entry(mounted: &MountTree) -> bool {
    flatten_files(mounted)
        .iter()
        .any(|(path, _)| path.ends_with(".html"))
}

/// Parse manifest text leniently: invalid JSON degrades to an empty
/// manifest (no scripts, no dependencies) instead of failing the attempt
pub fn parse_manifest(contents: &str) -> Value {
    match serde_json::from_str(contents) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "invalid package.json, treating as empty");
            Value::Null
        }
    }
}

/// Whether installing is needed: a non-empty `dependencies` or
/// `devDependencies` map. An empty map or a missing key means there is
/// nothing to install.
pub fn needs_install(manifest: &Value) -> bool {
    ["dependencies", "devDependencies"].iter().any(|key| {
        manifest
            .get(key)
            .and_then(Value::as_object)
            .is_some_and(|deps| !deps.is_empty())
    })
}

/// Pick the startup script by priority order: `dev`, `start`, `serve`,
/// `preview`
pub fn select_script(manifest: &Value) -> Option<&'static str> {
    let scripts = manifest.get("scripts").and_then(Value::as_object)?;
    SCRIPT_PRIORITY
        .iter()
        .find(|name| scripts.contains_key(**name))
        .copied()
}

/// All script names the manifest declares, for diagnosis when none is
/// runnable
pub fn available_scripts(manifest: &Value) -> Vec<String> {
    manifest
        .get("scripts")
        .and_then(Value::as_object)
        .map(|scripts| scripts.keys().cloned().collect())
        .unwrap_or_default()
}

/// Resolve the launch command for a manifest, falling back to static
/// serving when the project has a markup entry but no usable script
pub fn resolve_launch_command(manifest: &Value, has_markup: bool) -> Option<LaunchCommand> {
    if let Some(script) = select_script(manifest) {
        debug!(script, "selected startup script");
        return Some(LaunchCommand::NpmScript(script.to_string()));
    }
    if has_markup {
        debug!("no startup script, falling back to static serving");
        return Some(LaunchCommand::StaticServe);
    }
    None
}
