//! Prompt template store for the Role Engines.
//!
//! Compiled-in defaults overlaid with `~/.forge/prompts/*.md` at runtime,
//! so prompt iteration doesn't require touching Rust source.

use std::collections::HashMap;
use std::path::Path;

pub const PLANNER_SYSTEM: &str = "planner-system";
pub const CODER_SYSTEM: &str = "coder-system";
pub const CODER_PATCH_SYSTEM: &str = "coder-patch-system";
pub const REVIEWER_SYSTEM: &str = "reviewer-system";
pub const ANALYZER_SYSTEM: &str = "analyzer-system";
pub const AGENTIC_SYSTEM: &str = "agentic-system";

const DEFAULTS: &[(&str, &str)] = &[
    (PLANNER_SYSTEM, include_str!("../../prompts/planner-system.md")),
    (CODER_SYSTEM, include_str!("../../prompts/coder-system.md")),
    (CODER_PATCH_SYSTEM, include_str!("../../prompts/coder-patch-system.md")),
    (REVIEWER_SYSTEM, include_str!("../../prompts/reviewer-system.md")),
    (ANALYZER_SYSTEM, include_str!("../../prompts/analyzer-system.md")),
    (AGENTIC_SYSTEM, include_str!("../../prompts/agentic-system.md")),
];

pub struct PromptStore {
    prompts: HashMap<String, String>,
}

impl PromptStore {
    pub fn load(override_dir: Option<&Path>) -> Self {
        let mut prompts: HashMap<String, String> =
            DEFAULTS.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        if let Some(dir) = override_dir {
            Self::overlay_from_dir(&mut prompts, dir);
        }
        Self { prompts }
    }

    pub fn get(&self, key: &str) -> &str {
        self.prompts.get(key).map(|s| s.as_str()).unwrap_or_default()
    }

    fn overlay_from_dir(prompts: &mut HashMap<String, String>, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if let Ok(content) = std::fs::read_to_string(&path) {
                prompts.insert(stem.to_string(), content);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_load() {
        let store = PromptStore::load(None);
        assert!(store.get(PLANNER_SYSTEM).contains("Planner"));
        assert!(store.get(CODER_SYSTEM).contains("===FILE"));
        assert!(store.get(REVIEWER_SYSTEM).contains("approved"));
        assert!(store.get(ANALYZER_SYSTEM).contains("forbid_strategies"));
        assert!(store.get(AGENTIC_SYSTEM).contains("===FILE"));
    }

    #[test]
    fn overlay_from_dir_replaces_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("coder-system.md"), "custom coder prompt").unwrap();
        let store = PromptStore::load(Some(tmp.path()));
        assert_eq!(store.get(CODER_SYSTEM), "custom coder prompt");
    }
}
