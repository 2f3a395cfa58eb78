//! Session Persistence: serializes the architecture summary, task DAG
//! with statuses and failure counters, per-role histories, failure log,
//! and embedding index to a workspace-local, self-describing state file.
//!
//! Format: TOML with a top-level `version` field. Unknown (future)
//! versions load read-only rather than being coerced into the current
//! shape — a [`SessionView::ReadOnly`] is returned instead of a live
//! session.

use crate::dag::task::{FailureRecord, Plan, TaskId, TaskStatus};
use crate::memory::{Memory, SpecSlots};
use crate::model_client::Message;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Current on-disk format version. Bump when the `SessionFile` shape
/// changes in a way older binaries can't read.
pub const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSpecSlots {
    database_schema: Option<String>,
    api_surface: Option<String>,
    auth_flow: Option<String>,
    deployment: Option<String>,
}

impl From<SpecSlots> for PersistedSpecSlots {
    fn from(s: SpecSlots) -> Self {
        Self {
            database_schema: s.database_schema,
            api_surface: s.api_surface,
            auth_flow: s.auth_flow,
            deployment: s.deployment,
        }
    }
}

impl From<PersistedSpecSlots> for SpecSlots {
    fn from(s: PersistedSpecSlots) -> Self {
        Self {
            database_schema: s.database_schema,
            api_surface: s.api_surface,
            auth_flow: s.auth_flow,
            deployment: s.deployment,
        }
    }
}

/// On-disk shape. All maps are represented as `Vec<(key, value)>` rather
/// than `HashMap` with non-string keys, since TOML tables require string
/// keys and `TaskId` isn't one.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    workspace_root: PathBuf,
    plan: Option<Plan>,
    spec_slots: PersistedSpecSlots,
    file_index: Vec<(PathBuf, String)>,
    failure_log: Vec<(TaskId, Vec<FailureRecord>)>,
    histories: HashMap<String, Vec<Message>>,
    embeddings: Vec<crate::memory::embeddings::FileEmbedding>,
}

/// What a load produced: a live, mutable session when the on-disk version
/// is one this binary understands, or a read-only view when it's newer
/// Unknown, newer versions load read-only.
pub enum SessionView {
    Current { plan: Plan, memory: Memory },
    ReadOnly { version: u32 },
}

/// Writes the current session state to `<workspace>/.forge_session.toml`
/// via the same write-to-temp-then-rename helper used for generated
/// files, so a crash never leaves a torn state file behind.
pub async fn save(workspace_root: &Path, plan: &Plan, memory: &Memory) -> Result<()> {
    let file = SessionFile {
        version: SESSION_VERSION,
        workspace_root: workspace_root.to_path_buf(),
        plan: Some(downgrade_in_progress(plan)),
        spec_slots: memory.spec_slots.clone().into(),
        file_index: memory.file_index_snapshot(),
        failure_log: memory.failure_log_snapshot(),
        histories: memory.history_snapshot(),
        embeddings: memory.embeddings.snapshot(),
    };
    let content = toml::to_string_pretty(&file).context("serializing session state")?;
    crate::workspace::write_file_atomic(workspace_root, Path::new(".forge_session.toml"), &content)
        .await
        .context("writing session state file")?;
    Ok(())
}

/// Loads the session state file if present. Returns `Ok(None)` when no
/// state file exists yet (a fresh workspace), per the resume contract.
pub async fn load(workspace_root: &Path) -> Result<Option<SessionView>> {
    let path = crate::paths::session_path(workspace_root);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("reading session state file"),
    };
    let file: SessionFile = toml::from_str(&content).context("parsing session state file")?;

    if file.version > SESSION_VERSION {
        return Ok(Some(SessionView::ReadOnly { version: file.version }));
    }

    let mut plan = file.plan.unwrap_or_else(|| Plan {
        architecture_summary: String::new(),
        tech_stack: Default::default(),
        file_index: vec![],
        spec_slots: Default::default(),
        tasks: vec![],
    });
    // Tasks in IN_PROGRESS at save time are downgraded to PENDING on
    // resume: generation is not transactional.
    downgrade_in_progress_tasks(&mut plan);

    let memory = Memory::restore(
        plan.architecture_summary.clone(),
        file.spec_slots.into(),
        file.file_index,
        file.failure_log,
        file.histories,
        file.embeddings,
    );

    Ok(Some(SessionView::Current { plan, memory }))
}

fn downgrade_in_progress(plan: &Plan) -> Plan {
    let mut copy = plan.clone();
    downgrade_in_progress_tasks(&mut copy);
    copy
}

fn downgrade_in_progress_tasks(plan: &mut Plan) {
    for task in &mut plan.tasks {
        if task.status == TaskStatus::InProgress {
            task.status = TaskStatus::Pending;
        }
    }
}

/// Whether a Plan is all-terminal: re-running a completed build on an
/// unchanged workspace should yield zero model calls when every task is
/// already verified.
pub fn plan_fully_verified(plan: &Plan) -> bool {
    !plan.tasks.is_empty() && plan.tasks.iter().all(|t| t.status == TaskStatus::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::task::{SpecSlotsPlan, TaskNode};
    use std::path::PathBuf as Pb;

    fn sample_plan() -> Plan {
        Plan {
            architecture_summary: "a tiny tool".into(),
            tech_stack: Default::default(),
            file_index: vec![],
            spec_slots: SpecSlotsPlan::default(),
            tasks: vec![
                TaskNode::new(TaskId(1), Pb::from("a.py"), "a".into(), vec![]),
                TaskNode::new(TaskId(2), Pb::from("b.py"), "b".into(), vec![TaskId(1)]),
            ],
        }
    }

    #[tokio::test]
    async fn save_load_round_trip_preserves_topology_and_statuses() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plan = sample_plan();
        plan.tasks[0].status = TaskStatus::Verified;
        plan.tasks[1].status = TaskStatus::InProgress;

        let mut memory = Memory::new();
        memory.architecture_summary = plan.architecture_summary.clone();
        memory.record_failure(
            TaskId(1),
            FailureRecord {
                task_id: TaskId(1),
                attempt: 1,
                verifier_excerpt: "boom".into(),
                analyzer_diagnosis: "diag".into(),
                strategy: crate::dag::task::FixStrategy::A,
                outcome: crate::dag::task::FixOutcome::Unchanged,
            },
        );

        save(tmp.path(), &plan, &memory).await.unwrap();
        let loaded = load(tmp.path()).await.unwrap().expect("session file exists");
        match loaded {
            SessionView::Current { plan: loaded_plan, memory: loaded_memory } => {
                assert_eq!(loaded_plan.tasks.len(), 2);
                assert_eq!(loaded_plan.tasks[0].status, TaskStatus::Verified);
                // In-flight IN_PROGRESS downgraded to PENDING on resume.
                assert_eq!(loaded_plan.tasks[1].status, TaskStatus::Pending);
                assert_eq!(loaded_memory.failures_for(TaskId(1)).len(), 1);
            }
            SessionView::ReadOnly { .. } => panic!("expected a current session"),
        }
    }

    #[tokio::test]
    async fn missing_state_file_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(tmp.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn future_version_loads_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = sample_plan();
        let memory = Memory::new();
        save(tmp.path(), &plan, &memory).await.unwrap();

        let path = crate::paths::session_path(tmp.path());
        let mut content = tokio::fs::read_to_string(&path).await.unwrap();
        content = content.replacen("version = 1", "version = 99", 1);
        tokio::fs::write(&path, content).await.unwrap();

        match load(tmp.path()).await.unwrap().unwrap() {
            SessionView::ReadOnly { version } => assert_eq!(version, 99),
            SessionView::Current { .. } => panic!("expected read-only view for unknown version"),
        }
    }

    #[test]
    fn plan_fully_verified_requires_all_tasks_verified() {
        let mut plan = sample_plan();
        assert!(!plan_fully_verified(&plan));
        plan.tasks[0].status = TaskStatus::Verified;
        plan.tasks[1].status = TaskStatus::Verified;
        assert!(plan_fully_verified(&plan));
    }
}
