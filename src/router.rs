//! Model Router: resolves `(role, complexity, size)` to a concrete,
//! *installed* [`ModelSpec`], degrading gracefully when the preferred
//! model isn't present on the server.
//!
//! Installed-model enumeration (`GET /api/tags`) is cached for the Router's
//! lifetime with a manual refresh hook — hitting `/api/tags` on every
//! `resolve()` call would be wasteful under concurrent DAG fan-out.

use crate::config::{Complexity, ModelCategory, ModelSpec, ModelTier, Role, Size};
use crate::error::EngineError;
use crate::model_client::ModelClient;
use tokio::sync::RwLock;

/// Caller-supplied decision point for the interactive "offer to download a
/// missing model" path. Defaults to always-decline so the core stays
/// testable without a TTY.
pub trait DownloadPrompt: Send + Sync {
    fn should_download(&self, model_name: &str) -> bool;
}

pub struct AlwaysDecline;
impl DownloadPrompt for AlwaysDecline {
    fn should_download(&self, _model_name: &str) -> bool {
        false
    }
}

fn category_for_role(role: Role) -> ModelCategory {
    match role {
        Role::Planner | Role::Analyzer => ModelCategory::Reasoning,
        Role::Coder | Role::Reviewer => ModelCategory::Coding,
        Role::Classifier => ModelCategory::Summarizer,
        Role::Agentic => ModelCategory::Agentic,
    }
}

/// Maps `(complexity, size)` onto a starting tier. Resolved as
/// `complexity_rank + size_rank` bucketed into three bands — heavy/large
/// lands at Large, simple/small at Small, everything else at Medium.
fn desired_tier(complexity: Complexity, size: Size) -> ModelTier {
    let c = match complexity {
        Complexity::Simple => 0,
        Complexity::Medium => 1,
        Complexity::Heavy => 2,
    };
    let s = match size {
        Size::Small => 0,
        Size::Medium => 1,
        Size::Large => 2,
    };
    match c + s {
        0 | 1 => ModelTier::Small,
        2 | 3 => ModelTier::Medium,
        _ => ModelTier::Large,
    }
}

/// Degradation order starting from `tier`: try the desired tier, then step
/// down one tier at a time before ever stepping up.
fn tier_degradation_order(tier: ModelTier) -> [ModelTier; 3] {
    match tier {
        ModelTier::Large => [ModelTier::Large, ModelTier::Medium, ModelTier::Small],
        ModelTier::Medium => [ModelTier::Medium, ModelTier::Small, ModelTier::Large],
        ModelTier::Small => [ModelTier::Small, ModelTier::Medium, ModelTier::Large],
    }
}

pub struct Router {
    registry: Vec<ModelSpec>,
    installed: RwLock<Option<Vec<String>>>,
}

impl Router {
    pub fn new(registry: Vec<ModelSpec>) -> Self {
        Self {
            registry,
            installed: RwLock::new(None),
        }
    }

    /// Force a re-fetch of the installed-model list on next `resolve` call.
    pub async fn invalidate(&self) {
        *self.installed.write().await = None;
    }

    async fn installed_models(&self, client: &ModelClient) -> Result<Vec<String>, EngineError> {
        {
            let guard = self.installed.read().await;
            if let Some(list) = guard.as_ref() {
                return Ok(list.clone());
            }
        }
        let list = client.list_installed().await?;
        *self.installed.write().await = Some(list.clone());
        Ok(list)
    }

    /// Exact-name match against a category + tier-degradation search.
    /// Never matches `foo:70b` against `foo:14b` — equality is on the full
    /// registry `name` field, quantization tag included.
    fn find_in_category(
        &self,
        category: ModelCategory,
        tier: ModelTier,
        installed: &[String],
    ) -> Option<ModelSpec> {
        let mut candidates: Vec<&ModelSpec> =
            self.registry.iter().filter(|m| m.category == category).collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        for t in tier_degradation_order(tier) {
            if let Some(found) = candidates
                .iter()
                .filter(|m| m.tier == t)
                .find(|m| installed.iter().any(|name| name == &m.name))
            {
                return Some((*found).clone());
            }
        }
        None
    }

    /// Resolves `(role, complexity, size)` to a concrete, installed model.
    pub async fn resolve(
        &self,
        role: Role,
        complexity: Complexity,
        size: Size,
        client: &ModelClient,
    ) -> Result<ModelSpec, EngineError> {
        let installed = self.installed_models(client).await?;
        let tier = desired_tier(complexity, size);
        let category = category_for_role(role);

        if let Some(spec) = self.find_in_category(category, tier, &installed) {
            return Ok(spec);
        }
        // No category match at all: fall back to a `general` model.
        if let Some(spec) = self.find_in_category(ModelCategory::General, tier, &installed) {
            return Ok(spec);
        }
        Err(EngineError::ModelUnavailable)
    }

    /// Resolve with an interactive download offer on miss: if nothing in
    /// the desired category is installed, offer the highest-priority
    /// registry entry for that category to `prompt`. Declining is
    /// non-fatal — falls through to the normal `resolve` failure path.
    pub async fn resolve_or_offer(
        &self,
        role: Role,
        complexity: Complexity,
        size: Size,
        client: &ModelClient,
        prompt: &dyn DownloadPrompt,
    ) -> Result<ModelSpec, EngineError> {
        match self.resolve(role, complexity, size, client).await {
            Ok(spec) => Ok(spec),
            Err(EngineError::ModelUnavailable) => {
                let category = category_for_role(role);
                let best = self
                    .registry
                    .iter()
                    .filter(|m| m.category == category)
                    .max_by_key(|m| m.priority);
                if let Some(candidate) = best {
                    if prompt.should_download(&candidate.name) {
                        client.pull(&candidate.name, |_progress| {}).await?;
                        self.invalidate().await;
                        return self.resolve(role, complexity, size, client).await;
                    }
                }
                Err(EngineError::ModelUnavailable)
            }
            Err(e) => Err(e),
        }
    }

    pub fn registry(&self) -> &[ModelSpec] {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_model_registry;

    fn registry() -> Vec<ModelSpec> {
        default_model_registry()
    }

    #[test]
    fn desired_tier_bounds() {
        assert_eq!(desired_tier(Complexity::Heavy, Size::Large), ModelTier::Large);
        assert_eq!(desired_tier(Complexity::Medium, Size::Medium), ModelTier::Medium);
        assert_eq!(desired_tier(Complexity::Simple, Size::Small), ModelTier::Small);
    }

    #[test]
    fn find_in_category_exact_name_match_only() {
        let router = Router::new(registry());
        // Only the 14b tag installed: must not match the 32b spec.
        let installed = vec!["qwen2.5-coder:14b".to_string()];
        let found =
            router.find_in_category(ModelCategory::Coding, ModelTier::Large, &installed);
        assert_eq!(found.unwrap().name, "qwen2.5-coder:14b");
    }

    #[test]
    fn find_in_category_none_when_nothing_installed() {
        let router = Router::new(registry());
        let found = router.find_in_category(ModelCategory::Coding, ModelTier::Large, &[]);
        assert!(found.is_none());
    }

    #[test]
    fn degradation_order_prefers_stepping_down_first() {
        assert_eq!(
            tier_degradation_order(ModelTier::Large),
            [ModelTier::Large, ModelTier::Medium, ModelTier::Small]
        );
        assert_eq!(
            tier_degradation_order(ModelTier::Small),
            [ModelTier::Small, ModelTier::Medium, ModelTier::Large]
        );
    }

    #[tokio::test]
    async fn always_decline_download_prompt_declines() {
        let prompt = AlwaysDecline;
        assert!(!prompt.should_download("anything"));
    }
}
