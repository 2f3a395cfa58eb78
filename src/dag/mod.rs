//! DAG Orchestrator: the wave scheduler and per-task pipeline that turns a
//! [`task::Plan`] into verified files on disk.
//!
//! Pre-execute sequentially, fan out concurrently bounded by a semaphore,
//! post-execute sequentially. Waves are computed and status transitions
//! are committed back to `Plan` single-threaded between waves; only the
//! body of each task's pipeline runs concurrently, bounded by
//! [`crate::config::OrchestratorConfig::fanout`].

pub mod fix_engine;
pub mod task;

use crate::config::Size;
use crate::error::EngineError;
use crate::memory::{embeddings::EmbeddingProvider, Memory};
use crate::parser::FileWrite;
use crate::roles::analyzer::Analyzer;
use crate::roles::coder::Coder;
use crate::roles::reviewer::{Reviewer, MAX_REVIEW_ROUNDS};
use crate::verifier::{self, VerificationResult};
use crate::workspace::write_file_atomic;
use fix_engine::{build_failure_record, FixEngine};
use task::{EscalationEvent, FixOutcome, Plan, TaskId, TaskNode, TaskStatus, MAX_TASK_FAILURES};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Non-interactive default: once a task exhausts
/// `MAX_TASK_FAILURES` attempts, escalate to [`EscalationEvent::Skip`]
/// (recorded as `Failed`, not `Skipped` — `Skipped` is reserved by the
/// state machine for deadlock-unreachable tasks) rather than pausing for a
/// human who isn't there in batch mode.
pub trait EscalationPolicy: Send + Sync {
    fn decide(&self, task: &TaskNode) -> EscalationEvent;
}

pub struct NonInteractiveEscalation;
impl EscalationPolicy for NonInteractiveEscalation {
    fn decide(&self, _task: &TaskNode) -> EscalationEvent {
        EscalationEvent::Skip
    }
}

/// Outcome of a full orchestrator run: the final status buckets, for the
/// caller to report and decide whether session persistence should offer a
/// resume.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub verified: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    pub skipped: Vec<TaskId>,
}

pub struct Orchestrator<'a> {
    pub coder: &'a Coder<'a>,
    pub reviewer: &'a Reviewer<'a>,
    pub analyzer: &'a Analyzer<'a>,
    pub fix_engine: &'a FixEngine<'a>,
    pub embedding_provider: Option<&'a dyn EmbeddingProvider>,
    pub escalation: &'a dyn EscalationPolicy,
    pub workspace_root: PathBuf,
    pub fanout: usize,
    pub size: Size,
}

impl<'a> Orchestrator<'a> {
    /// Runs `plan` to completion: repeatedly computes the ready set, runs it
    /// at bounded fan-out, and folds results back before computing the next
    /// wave. Returns once no `Pending` tasks remain.
    pub async fn run(&self, plan: &mut Plan, memory: &Arc<Mutex<Memory>>) -> Result<RunOutcome, EngineError> {
        plan.validate().map_err(EngineError::PlanInvariantViolated)?;

        let mut outcome = RunOutcome::default();

        loop {
            let pending: Vec<TaskId> =
                plan.tasks.iter().filter(|t| t.status == TaskStatus::Pending).map(|t| t.id).collect();
            if pending.is_empty() {
                break;
            }

            let verified_set: HashSet<TaskId> =
                plan.tasks.iter().filter(|t| t.status == TaskStatus::Verified).map(|t| t.id).collect();

            let ready: Vec<TaskId> = pending
                .iter()
                .copied()
                .filter(|id| {
                    let task = plan.tasks.iter().find(|t| t.id == *id).expect("ready id exists");
                    task.depends_on.iter().all(|d| verified_set.contains(d))
                })
                .collect();

            if ready.is_empty() {
                // Deadlock: every remaining Pending task depends, directly or
                // transitively, on a task that will never reach Verified.
                for id in &pending {
                    let task = plan.tasks.iter_mut().find(|t| t.id == *id).expect("pending id exists");
                    task.transition(TaskStatus::Skipped).map_err(EngineError::PlanInvariantViolated)?;
                    tracing::warn!(task = ?id, "skipping unreachable task: dependency can never verify");
                    outcome.skipped.push(*id);
                }
                break;
            }

            for id in &ready {
                let task = plan.tasks.iter_mut().find(|t| t.id == *id).expect("ready id exists");
                task.transition(TaskStatus::InProgress).map_err(EngineError::PlanInvariantViolated)?;
            }

            let semaphore = Arc::new(Semaphore::new(self.fanout.max(1)));
            let mut futures = Vec::with_capacity(ready.len());
            for id in &ready {
                let task = plan.tasks.iter().find(|t| t.id == *id).expect("ready id exists").clone();
                let permit = semaphore.clone();
                let memory = memory.clone();
                futures.push(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                    self.run_task(task, &memory).await
                });
            }
            let results = futures_util::future::join_all(futures).await;

            let mut touched_files = Vec::new();
            for result in results {
                let task = plan.tasks.iter_mut().find(|t| t.id == result.id).expect("result id exists");
                *task = result;
                match task.status {
                    TaskStatus::Verified => outcome.verified.push(task.id),
                    TaskStatus::Failed => outcome.failed.push(task.id),
                    _ => {}
                }
                touched_files.push(task.file.clone());
            }

            // Between waves, re-index memory embeddings for files produced
            // in this wave. A no-op when no embedding-capable model is
            // registered.
            if let Some(provider) = self.embedding_provider {
                let mut guard = memory.lock().await;
                for path in &touched_files {
                    if let Ok(content) = tokio::fs::read_to_string(self.workspace_root.join(path)).await {
                        guard.embeddings.update(provider, path, &content);
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Runs one task through generate → review → verify → fix to a terminal
    /// status (`Verified` or `Failed`), returning the updated [`TaskNode`].
    async fn run_task(&self, mut task: TaskNode, memory: &Arc<Mutex<Memory>>) -> TaskNode {
        let coder_context = memory.lock().await.coder_context(&task.file);
        let generated = match self.coder.generate(&task, &coder_context, self.size).await {
            Ok(file) => file,
            Err(e) => return self.fail(task, e.to_string()),
        };

        if let Err(e) = task.transition(TaskStatus::Generated) {
            return self.fail(task, e);
        }

        match self.review_and_verify(&mut task, memory, generated).await {
            Ok(verification) if verification.passed => {
                if let Err(e) = task.transition(TaskStatus::Verified) {
                    return self.fail(task, e);
                }
                let mut guard = memory.lock().await;
                guard.set_file_purpose(&task.file, task.description.clone());
                task
            }
            Ok(verification) => self.fix_loop(task, memory, render_verifier_output(&verification)).await,
            Err(e) => self.fail(task, e.to_string()),
        }
    }

    /// Drives the review loop (≤ [`MAX_REVIEW_ROUNDS`]) for the file
    /// currently held in memory for `task`, writes it to disk, and verifies
    /// it. Returns the verification result with the task left in
    /// `Reviewed` status.
    async fn review_and_verify(
        &self,
        task: &mut TaskNode,
        memory: &Arc<Mutex<Memory>>,
        mut file: FileWrite,
    ) -> Result<VerificationResult, EngineError> {
        write_file_atomic(&self.workspace_root, &file.path, &file.content)
            .await
            .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;

        for round in 0..MAX_REVIEW_ROUNDS {
            task.transition(TaskStatus::Reviewing).map_err(EngineError::PlanInvariantViolated)?;
            let review_context = memory.lock().await.reviewer_context(&file.content);
            let review = self.reviewer.review(&review_context, self.size).await?;
            task.last_review_feedback = Some(review.summary.clone());

            if review.effectively_approved() || round + 1 == MAX_REVIEW_ROUNDS {
                break;
            }

            let guidance = review
                .issues
                .iter()
                .map(|i| format!("[{:?}] {}", i.severity, i.description))
                .collect::<Vec<_>>()
                .join("\n");
            let patched = self
                .coder
                .patch(task, &file.content, task::FixStrategy::A, &guidance, self.size)
                .await?;
            file = patched;
            write_file_atomic(&self.workspace_root, &file.path, &file.content)
                .await
                .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;
            task.transition(TaskStatus::Generated).map_err(EngineError::PlanInvariantViolated)?;
        }

        task.transition(TaskStatus::Reviewed).map_err(EngineError::PlanInvariantViolated)?;
        Ok(verifier::verify(&self.workspace_root.join(&task.file)).await)
    }

    /// Runs the Fix Engine until the task verifies, exhausts
    /// `MAX_TASK_FAILURES`, or errors outright.
    async fn fix_loop(&self, mut task: TaskNode, memory: &Arc<Mutex<Memory>>, mut verifier_output: String) -> TaskNode {
        if let Err(e) = task.transition(TaskStatus::NeedsFix) {
            return self.fail(task, e);
        }

        loop {
            let attempt = task.failure_count + 1;
            if attempt > MAX_TASK_FAILURES {
                return match self.escalation.decide(&task) {
                    EscalationEvent::Skip | EscalationEvent::Pause => self.fail(task, "fix attempts exhausted".into()),
                    EscalationEvent::Retry => {
                        task.failure_count = 0;
                        continue;
                    }
                    EscalationEvent::GuidedFix { hint } => {
                        if task.transition(TaskStatus::Pending).is_ok() {
                            task.last_error = Some(hint);
                        }
                        return task;
                    }
                };
            }

            let current_content = match tokio::fs::read_to_string(self.workspace_root.join(&task.file)).await {
                Ok(c) => c,
                Err(e) => return self.fail(task, e.to_string()),
            };

            if let Err(e) = task.transition(TaskStatus::InProgress) {
                return self.fail(task, e);
            }

            let fix_attempt = {
                let guard = memory.lock().await;
                self.fix_engine
                    .attempt(&task, &guard, &verifier_output, &current_content, attempt, self.size)
                    .await
            };
            let fix_attempt = match fix_attempt {
                Ok(f) => f,
                Err(e) => return self.fail(task, e.to_string()),
            };

            if let Err(e) = task.transition(TaskStatus::Generated) {
                return self.fail(task, e);
            }

            match self.review_and_verify(&mut task, memory, fix_attempt.file.clone()).await {
                Ok(verification) if verification.passed => {
                    // The failure log exists to keep Analyzer from repeating
                    // a strategy that has already failed; a successful
                    // attempt closes the task out without leaving a record.
                    if let Err(e) = task.transition(TaskStatus::Verified) {
                        return self.fail(task, e);
                    }
                    return task;
                }
                Ok(verification) => {
                    let record = build_failure_record(
                        task.id,
                        attempt as usize,
                        &verifier_output,
                        &fix_attempt.analyzer,
                        fix_attempt.strategy,
                        FixOutcome::Unchanged,
                    );
                    memory.lock().await.record_failure(task.id, record);
                    verifier_output = render_verifier_output(&verification);
                    task.failure_count += 1;
                    if let Err(e) = task.transition(TaskStatus::NeedsFix) {
                        return self.fail(task, e);
                    }
                }
                Err(e) => return self.fail(task, e.to_string()),
            }
        }
    }

    fn fail(&self, mut task: TaskNode, reason: String) -> TaskNode {
        task.last_error = Some(reason);
        let _ = task.transition(TaskStatus::Failed);
        task
    }
}

fn render_verifier_output(result: &VerificationResult) -> String {
    let mut out = String::new();
    for (name, check) in &result.checks {
        out.push_str(&format!("[{name}] passed={} {}\n", check.passed, check.detail));
    }
    for err in &result.structured_errors {
        out.push_str(&format!("{}:{} {} - {}\n", err.path, err.line, err.category, err.message));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Complexity;
    use crate::dag::task::SpecSlotsPlan;
    use crate::model_client::Message;
    use crate::roles::prompts::PromptStore;
    use crate::roles::{BoxFuture, ModelBackend};
    use crate::research::NullResearchProvider;
    use std::collections::HashMap;
    use std::path::PathBuf as Pb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted backend: returns a canned reply keyed by role, counting
    /// calls so tests can assert the pipeline invoked each role the
    /// expected number of times.
    struct ScriptedBackend {
        coder_reply: String,
        reviewer_reply: String,
        calls: AtomicUsize,
    }

    impl ModelBackend for ScriptedBackend {
        fn call<'a>(
            &'a self,
            role: crate::config::Role,
            _messages: Vec<Message>,
            _size: crate::config::Size,
        ) -> BoxFuture<'a, Result<String, EngineError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = match role {
                crate::config::Role::Reviewer => self.reviewer_reply.clone(),
                _ => self.coder_reply.clone(),
            };
            Box::pin(async move { Ok(reply) })
        }
    }

    fn make_plan() -> Plan {
        Plan {
            architecture_summary: "a tiny tool".into(),
            tech_stack: Default::default(),
            file_index: vec![],
            spec_slots: SpecSlotsPlan::default(),
            tasks: vec![TaskNode::new(TaskId(1), Pb::from("app.py"), "entry point".into(), vec![])],
        }
    }

    #[tokio::test]
    async fn approved_first_review_reaches_verified() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            coder_reply: "===FILE: app.py===\nprint(1)\n===END===\n".into(),
            reviewer_reply: r#"{"approved": true, "issues": [], "summary": "fine"}"#.into(),
            calls: AtomicUsize::new(0),
        };
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let reviewer = Reviewer { backend: &backend, prompts: &prompts };
        let analyzer = Analyzer { backend: &backend, prompts: &prompts };
        let research = NullResearchProvider;
        let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };

        let orchestrator = Orchestrator {
            coder: &coder,
            reviewer: &reviewer,
            analyzer: &analyzer,
            fix_engine: &fix_engine,
            embedding_provider: None,
            escalation: &NonInteractiveEscalation,
            workspace_root: tmp.path().to_path_buf(),
            fanout: 4,
            size: crate::config::Size::Small,
        };

        let mut plan = make_plan();
        let memory = Arc::new(Mutex::new(Memory::new()));
        let outcome = orchestrator.run(&mut plan, &memory).await.unwrap();

        assert_eq!(outcome.verified, vec![TaskId(1)]);
        assert_eq!(plan.tasks[0].status, TaskStatus::Verified);
        assert_eq!(
            tokio::fs::read_to_string(tmp.path().join("app.py")).await.unwrap(),
            "print(1)\n"
        );
        let _ = HashMap::<(), ()>::new();
        let _ = Complexity::Simple;
    }

    #[tokio::test]
    async fn unreachable_dependency_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            coder_reply: "I refuse.".into(),
            reviewer_reply: r#"{"approved": false, "issues": [{"severity":"critical","description":"bad"}], "summary": "no"}"#.into(),
            calls: AtomicUsize::new(0),
        };
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let reviewer = Reviewer { backend: &backend, prompts: &prompts };
        let analyzer = Analyzer { backend: &backend, prompts: &prompts };
        let research = NullResearchProvider;
        let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };

        let orchestrator = Orchestrator {
            coder: &coder,
            reviewer: &reviewer,
            analyzer: &analyzer,
            fix_engine: &fix_engine,
            embedding_provider: None,
            escalation: &NonInteractiveEscalation,
            workspace_root: tmp.path().to_path_buf(),
            fanout: 2,
            size: crate::config::Size::Small,
        };

        // Task 2 depends on task 1, which will fail immediately (Coder
        // never produces a file block): task 2 must never become ready,
        // and the deadlock path must mark it Skipped, not loop forever.
        let mut plan = Plan {
            architecture_summary: String::new(),
            tech_stack: Default::default(),
            file_index: vec![],
            spec_slots: SpecSlotsPlan::default(),
            tasks: vec![
                TaskNode::new(TaskId(1), Pb::from("a.py"), "a".into(), vec![]),
                TaskNode::new(TaskId(2), Pb::from("b.py"), "b".into(), vec![TaskId(1)]),
            ],
        };
        let memory = Arc::new(Mutex::new(Memory::new()));
        let outcome = orchestrator.run(&mut plan, &memory).await.unwrap();

        assert_eq!(outcome.failed, vec![TaskId(1)]);
        assert_eq!(outcome.skipped, vec![TaskId(2)]);
    }
}
