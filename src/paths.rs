use std::path::PathBuf;
use std::sync::OnceLock;

static FORGE_HOME: OnceLock<PathBuf> = OnceLock::new();

/// Returns the per-user Forge home directory (`~/.forge/`).
/// Supports `$FORGE_HOME` env override. Cached via `OnceLock`.
pub fn forge_home() -> &'static PathBuf {
    FORGE_HOME.get_or_init(|| {
        if let Ok(val) = std::env::var("FORGE_HOME") {
            let p = PathBuf::from(val);
            if !p.as_os_str().is_empty() {
                return p;
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".forge")
    })
}

/// `~/.forge/settings.toml` — per-user settings (`output_dir`,
/// `autonomous_access`, `internet_access`).
pub fn settings_path() -> PathBuf {
    forge_home().join("settings.toml")
}

/// `~/.forge/logs/`
pub fn logs_dir() -> PathBuf {
    forge_home().join("logs")
}

/// `~/.forge/prompts/` — user overrides for the embedded prompt templates.
pub fn prompts_override_dir() -> PathBuf {
    forge_home().join("prompts")
}

/// Workspace-local session state file: `<workspace>/.forge_session.toml`.
pub fn session_path(workspace_root: &std::path::Path) -> PathBuf {
    workspace_root.join(".forge_session.toml")
}

