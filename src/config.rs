//! Configuration: workspace-local `forge.toml`, per-user `~/.forge/settings.toml`,
//! and the static [`ModelSpec`] registry the Router consults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Role a model call is made on behalf of — used for sampling defaults
/// and as one axis of the Router's resolution table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Coder,
    Reviewer,
    Analyzer,
    Classifier,
    Agentic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Coding,
    Reasoning,
    Agentic,
    Summarizer,
    Embedding,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Medium,
    Large,
}

/// Stable model identity. Defined once at engine startup from a static
/// registry; never mutated for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub category: ModelCategory,
    pub tier: ModelTier,
    pub priority: i32,
    pub supports_reasoning_trace: bool,
    pub default_context_window: usize,
}

/// The built-in model registry. Real deployments may have a different set
/// of models installed; the Router degrades gracefully when a preferred
/// name isn't present in the server's `/api/tags` listing.
pub fn default_model_registry() -> Vec<ModelSpec> {
    vec![
        ModelSpec {
            name: "qwen2.5-coder:32b".into(),
            category: ModelCategory::Coding,
            tier: ModelTier::Large,
            priority: 100,
            supports_reasoning_trace: false,
            default_context_window: 32_768,
        },
        ModelSpec {
            name: "qwen2.5-coder:14b".into(),
            category: ModelCategory::Coding,
            tier: ModelTier::Medium,
            priority: 90,
            supports_reasoning_trace: false,
            default_context_window: 32_768,
        },
        ModelSpec {
            name: "qwen2.5-coder:7b".into(),
            category: ModelCategory::Coding,
            tier: ModelTier::Small,
            priority: 80,
            supports_reasoning_trace: false,
            default_context_window: 32_768,
        },
        ModelSpec {
            name: "deepseek-r1:32b".into(),
            category: ModelCategory::Reasoning,
            tier: ModelTier::Large,
            priority: 95,
            supports_reasoning_trace: true,
            default_context_window: 32_768,
        },
        ModelSpec {
            name: "deepseek-r1:14b".into(),
            category: ModelCategory::Reasoning,
            tier: ModelTier::Medium,
            priority: 85,
            supports_reasoning_trace: true,
            default_context_window: 32_768,
        },
        ModelSpec {
            name: "llama3.1:70b".into(),
            category: ModelCategory::Agentic,
            tier: ModelTier::Large,
            priority: 90,
            supports_reasoning_trace: false,
            default_context_window: 131_072,
        },
        ModelSpec {
            name: "llama3.1:8b".into(),
            category: ModelCategory::Agentic,
            tier: ModelTier::Small,
            priority: 70,
            supports_reasoning_trace: false,
            default_context_window: 131_072,
        },
        ModelSpec {
            name: "phi3:mini".into(),
            category: ModelCategory::Summarizer,
            tier: ModelTier::Small,
            priority: 60,
            supports_reasoning_trace: false,
            default_context_window: 4_096,
        },
        ModelSpec {
            name: "nomic-embed-text".into(),
            category: ModelCategory::Embedding,
            tier: ModelTier::Small,
            priority: 50,
            supports_reasoning_trace: false,
            default_context_window: 8_192,
        },
        ModelSpec {
            name: "llama3.1:8b".into(),
            category: ModelCategory::General,
            tier: ModelTier::Small,
            priority: 50,
            supports_reasoning_trace: false,
            default_context_window: 131_072,
        },
    ]
}

/// Workspace-local configuration, `forge.toml` at the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model_server: ModelServerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelServerConfig {
    pub url: String,
}

impl Default for ModelServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of tasks from the same wave run concurrently. A
    /// config option rather than a hardcoded guess, since the right
    /// fan-out depends on the host and the model server's own concurrency.
    pub fanout: usize,
    /// Foreground run-command timeout, seconds.
    pub run_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fanout: 4,
            run_timeout_secs: 120,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_server: ModelServerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl Config {
    /// Load `forge.toml` from `workspace_root` if present, else defaults.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config_path = workspace_root.join("forge.toml");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

/// Per-user settings at `~/.forge/settings.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub autonomous_access: bool,
    #[serde(default)]
    pub internet_access: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            autonomous_access: false,
            internet_access: false,
        }
    }
}

impl UserSettings {
    pub fn load() -> Result<Self> {
        let path = crate::paths::settings_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }
}
