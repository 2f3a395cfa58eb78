//! Fix Engine: the five-strategy per-task retry loop and escalation.
//! Strategy selection is data (`FixStrategy::for_attempt`), not a
//! match-arm cascade, so `forbid_strategies` and the escalation table
//! stay declarative.
//!
//! **Design decision** (recorded also in DESIGN.md): the per-attempt
//! table intentionally assigns strategy A to attempts 1 through 3 — that
//! repetition is not a bug. "No repeating a forbidden strategy" applies
//! only when the engine has a *choice*: when the Analyzer's
//! `forbid_strategies` forces a deviation from the table, the engine
//! walks forward to the next non-forbidden strategy rather than
//! forbidding same-as-table repeats outright.

use crate::dag::task::{FailureRecord, FixOutcome, FixStrategy, TaskId, TaskNode};
use crate::error::EngineError;
use crate::memory::{AnalyzerContext, CoderContext, Memory};
use crate::research::{classify_error_pattern, ResearchProvider, ResearchQuery};
use crate::roles::analyzer::{Analyzer, AnalyzerOutput};
use crate::roles::coder::Coder;
use crate::config::Size;
use crate::parser::FileWrite;
use std::collections::HashSet;

const STRATEGY_ORDER: [FixStrategy; 5] =
    [FixStrategy::A, FixStrategy::B, FixStrategy::C, FixStrategy::D, FixStrategy::E];

/// Picks the strategy for `attempt` (1-based), walking forward past any
/// strategy the Analyzer has forbidden for this task.
pub fn select_strategy(attempt: u32, forbidden: &HashSet<FixStrategy>) -> Option<FixStrategy> {
    let table_choice = FixStrategy::for_attempt(attempt)?;
    if !forbidden.contains(&table_choice) {
        return Some(table_choice);
    }
    let start = STRATEGY_ORDER.iter().position(|s| *s == table_choice).unwrap_or(0);
    STRATEGY_ORDER.iter().skip(start).find(|s| !forbidden.contains(*s)).copied()
}

pub struct FixAttempt {
    pub strategy: FixStrategy,
    pub file: FileWrite,
    pub analyzer: AnalyzerOutput,
}

pub struct FixEngine<'a> {
    pub coder: &'a Coder<'a>,
    pub analyzer: &'a Analyzer<'a>,
    pub research: &'a dyn ResearchProvider,
}

impl<'a> FixEngine<'a> {
    /// Runs one fix attempt for `task` at `attempt` (1-based), given the
    /// verifier's failure output and the current file content.
    pub async fn attempt(
        &self,
        task: &TaskNode,
        memory: &Memory,
        verifier_output: &str,
        current_content: &str,
        attempt: u32,
        size: Size,
    ) -> Result<FixAttempt, EngineError> {
        let analyzer_context: AnalyzerContext = memory.analyzer_context(task.id, verifier_output);
        let analysis = self.analyzer.analyze(&analyzer_context, size).await?;
        let forbidden = analysis.forbidden_strategy_set();

        let strategy = select_strategy(attempt, &forbidden)
            .ok_or_else(|| EngineError::VerifierFailure("no fix strategy available for this attempt".into()))?;

        let file = match strategy {
            FixStrategy::A | FixStrategy::B => {
                let guidance = if strategy == FixStrategy::B && analysis.is_dependency_issue {
                    format!("{} (dependency issue: inspect and patch reverse dependencies too)", analysis.fix_strategy)
                } else {
                    analysis.fix_strategy.clone()
                };
                self.coder.patch(task, current_content, strategy, &guidance, size).await?
            }
            FixStrategy::C => {
                let context: CoderContext = memory.coder_context(&task.file);
                let guidance = format!(
                    "Full regeneration requested after repeated failures. Root cause: {}. Failure log: {} prior attempts.",
                    analysis.root_cause,
                    memory.failures_for(task.id).len()
                );
                self.coder.patch(task, current_content, strategy, &guidance, size).await.or(
                    self.coder.generate(task, &context, size).await
                )?
            }
            FixStrategy::D => {
                let guidance = format!(
                    "Simplify: produce a minimal version that prioritizes compiling/running over \
                     feature completeness. Mark elided behaviour with TODO comments. Root cause: {}",
                    analysis.root_cause
                );
                self.coder.patch(task, current_content, strategy, &guidance, size).await?
            }
            FixStrategy::E => {
                let pattern = classify_error_pattern(verifier_output);
                let result = self
                    .research
                    .research(ResearchQuery { error_pattern: pattern, context: analysis.root_cause.clone() })
                    .await;
                let guidance = if result.guidance.is_empty() {
                    format!("No external guidance available. Root cause: {}", analysis.root_cause)
                } else {
                    format!("Guidance: {}\nRoot cause: {}", result.guidance.join("; "), analysis.root_cause)
                };
                self.coder.patch(task, current_content, strategy, &guidance, size).await?
            }
        };

        Ok(FixAttempt { strategy, file, analyzer: analysis })
    }
}

/// Builds the [`FailureRecord`] for a completed attempt, once the caller
/// knows whether re-verification passed.
pub fn build_failure_record(
    task_id: TaskId,
    attempt: usize,
    verifier_excerpt: &str,
    analysis: &AnalyzerOutput,
    strategy: FixStrategy,
    outcome: FixOutcome,
) -> FailureRecord {
    FailureRecord {
        task_id,
        attempt,
        verifier_excerpt: verifier_excerpt.to_string(),
        analyzer_diagnosis: analysis.root_cause.clone(),
        strategy,
        outcome,
    }
}
