//! Analyzer role: diagnoses a verifier failure and proposes a fix
//! strategy, forbidding strategies already attempted for this task.

use super::prompts::{PromptStore, ANALYZER_SYSTEM};
use super::{extract_json_object, ModelBackend};
use crate::config::{Role, Size};
use crate::dag::task::FixStrategy;
use crate::error::EngineError;
use crate::memory::AnalyzerContext;
use crate::model_client::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerOutput {
    pub root_cause: String,
    pub fix_strategy: String,
    pub is_dependency_issue: bool,
    #[serde(default)]
    pub forbid_strategies: Vec<String>,
}

impl AnalyzerOutput {
    pub fn forbidden_strategy_set(&self) -> HashSet<FixStrategy> {
        self.forbid_strategies
            .iter()
            .filter_map(|s| match s.trim().to_uppercase().as_str() {
                "A" => Some(FixStrategy::A),
                "B" => Some(FixStrategy::B),
                "C" => Some(FixStrategy::C),
                "D" => Some(FixStrategy::D),
                "E" => Some(FixStrategy::E),
                _ => None,
            })
            .collect()
    }
}

pub struct Analyzer<'a> {
    pub backend: &'a dyn ModelBackend,
    pub prompts: &'a PromptStore,
}

impl<'a> Analyzer<'a> {
    pub async fn analyze(&self, context: &AnalyzerContext, size: Size) -> Result<AnalyzerOutput, EngineError> {
        let mut user = format!(
            "Architecture: {}\n\nVerifier output:\n{}\n",
            context.architecture_summary, context.verifier_output
        );
        if !context.failure_log.is_empty() {
            user.push_str("\nPrior attempts for this task:\n");
            for record in &context.failure_log {
                user.push_str(&format!(
                    "- attempt {}: strategy {:?}, outcome {:?}: {}\n",
                    record.attempt, record.strategy, record.outcome, record.analyzer_diagnosis
                ));
            }
        }
        let messages = vec![Message::system(self.prompts.get(ANALYZER_SYSTEM)), Message::user(user)];
        let raw = self.backend.call(Role::Analyzer, messages, size).await?;
        let value = extract_json_object(&raw)?;
        serde_json::from_value(value).map_err(|e| EngineError::ParseError(e.to_string()))
    }
}
