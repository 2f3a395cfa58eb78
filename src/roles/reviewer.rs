//! Reviewer role: approves or rejects a generated file with
//! severity-tagged issues. A review with only `info` issues counts as
//! approved.

use super::prompts::{PromptStore, REVIEWER_SYSTEM};
use super::{extract_json_object, ModelBackend};
use crate::config::{Role, Size};
use crate::error::EngineError;
use crate::memory::ReviewerContext;
use crate::model_client::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub approved: bool,
    pub issues: Vec<Issue>,
    pub summary: String,
}

impl ReviewOutput {
    /// Approved if the model said so, or if every issue raised is
    /// `info`-severity despite `approved: false`.
    pub fn effectively_approved(&self) -> bool {
        self.approved || self.issues.iter().all(|i| i.severity == Severity::Info)
    }
}

/// Maximum number of review -> patch -> re-review rounds before the file
/// proceeds to the Verifier regardless of outstanding issues.
pub const MAX_REVIEW_ROUNDS: u32 = 2;

pub struct Reviewer<'a> {
    pub backend: &'a dyn ModelBackend,
    pub prompts: &'a PromptStore,
}

impl<'a> Reviewer<'a> {
    pub async fn review(&self, context: &ReviewerContext, size: Size) -> Result<ReviewOutput, EngineError> {
        let user = format!(
            "Architecture: {}\n\nFile content:\n{}\n",
            context.architecture_summary, context.file_content
        );
        let messages = vec![Message::system(self.prompts.get(REVIEWER_SYSTEM)), Message::user(user)];
        let raw = self.backend.call(Role::Reviewer, messages, size).await?;
        let value = extract_json_object(&raw)?;
        serde_json::from_value(value).map_err(|e| EngineError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_only_issues_are_approved() {
        let output = ReviewOutput {
            approved: false,
            issues: vec![Issue { severity: Severity::Info, description: "style nit".into() }],
            summary: "fine".into(),
        };
        assert!(output.effectively_approved());
    }

    #[test]
    fn critical_issue_blocks_approval() {
        let output = ReviewOutput {
            approved: false,
            issues: vec![Issue { severity: Severity::Critical, description: "broken".into() }],
            summary: "bad".into(),
        };
        assert!(!output.effectively_approved());
    }

    #[test]
    fn deserializes_from_model_json() {
        let json = r#"{"approved": true, "issues": [], "summary": "looks good"}"#;
        let output: ReviewOutput = serde_json::from_str(json).unwrap();
        assert!(output.effectively_approved());
    }
}
