//! TaskNode, Plan, and the Fix Engine's supporting data types.
//!
//! Tasks are identified by integer id with `depends_on` as an id list —
//! memory references between tasks are by id, never by in-memory pointer.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

pub const MAX_TASK_FAILURES: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Generated,
    Reviewing,
    Reviewed,
    NeedsFix,
    Verified,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Allowed forward transitions in the task status state machine.
    /// `NeedsFix` loops back into the pipeline via the Fix Engine, which is
    /// why it can return to `InProgress` (a patch attempt re-enters
    /// generate/review) as well as proceed to `Failed`/`Skipped` on
    /// escalation.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if next == Failed {
            // Any non-terminal status can fail outright — a transport or
            // parse error can abort the pipeline at any stage, not only
            // after the Fix Engine gives up on a verifier failure.
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Generated)
                | (Generated, Reviewing)
                | (Reviewing, Generated) // patch-and-re-review loop
                | (Reviewing, Reviewed)
                | (Reviewed, Verified)
                | (Reviewed, NeedsFix)
                | (NeedsFix, InProgress) // fix strategy re-enters generate
                | (NeedsFix, Pending) // guided-fix restart
                | (Pending, Skipped) // deadlock skip
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Verified | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub file: PathBuf,
    pub description: String,
    pub depends_on: Vec<TaskId>,
    pub status: TaskStatus,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub last_review_feedback: Option<String>,
}

impl TaskNode {
    pub fn new(id: TaskId, file: PathBuf, description: String, depends_on: Vec<TaskId>) -> Self {
        Self {
            id,
            file,
            description,
            depends_on,
            status: TaskStatus::Pending,
            failure_count: 0,
            last_error: None,
            last_review_feedback: None,
        }
    }

    /// Transitions to `next`, returning `Err` if the state machine forbids
    /// it.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!("illegal transition {:?} -> {:?} for task {:?}", self.status, next, self.id));
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecSlotsPlan {
    pub database_schema: Option<String>,
    pub api_surface: Option<String>,
    pub auth_flow: Option<String>,
    pub deployment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub architecture_summary: String,
    pub tech_stack: HashSet<String>,
    /// Ordered file index: path -> one-line purpose.
    pub file_index: Vec<(PathBuf, String)>,
    pub spec_slots: SpecSlotsPlan,
    pub tasks: Vec<TaskNode>,
}

impl Plan {
    /// Validates the two invariants every Plan must hold: task file paths
    /// are pairwise distinct, and the dependency graph is acyclic. Returns
    /// the topological order on success.
    pub fn validate(&self) -> Result<Vec<TaskId>, String> {
        let mut seen_paths = HashSet::new();
        for task in &self.tasks {
            if !seen_paths.insert(&task.file) {
                return Err(format!("duplicate task file path: {}", task.file.display()));
            }
        }

        let ids: HashSet<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        for task in &self.tasks {
            for dep in &task.depends_on {
                if !ids.contains(dep) {
                    return Err(format!("task {:?} depends on unknown task {:?}", task.id, dep));
                }
            }
        }

        topological_sort(&self.tasks)
    }
}

fn topological_sort(tasks: &[TaskNode]) -> Result<Vec<TaskId>, String> {
    let mut indegree: HashMap<TaskId, usize> = HashMap::new();
    let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

    for task in tasks {
        indegree.entry(task.id).or_insert(0);
        for dep in &task.depends_on {
            *indegree.entry(task.id).or_insert(0) += 1;
            dependents.entry(*dep).or_default().push(task.id);
        }
    }

    let mut queue: Vec<TaskId> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| *id)
        .collect();
    queue.sort();

    let mut order = Vec::new();
    while let Some(id) = queue.pop() {
        order.push(id);
        if let Some(deps) = dependents.get(&id) {
            for &dependent in deps {
                let entry = indegree.get_mut(&dependent).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push(dependent);
                }
            }
        }
        queue.sort();
    }

    if order.len() != tasks.len() {
        return Err("dependency graph contains a cycle".to_string());
    }
    Ok(order)
}

// ---------------------------------------------------------------------------
// Fix Engine supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixStrategy {
    /// Attempts 1-3: targeted patch.
    A,
    /// Attempts 4-5: deep analysis, reverse-dependency context.
    B,
    /// Attempt 6: full regeneration.
    C,
    /// Attempt 7: simplification.
    D,
    /// Attempt 8: research.
    E,
}

impl FixStrategy {
    /// Strategy table keyed by 1-based attempt number.
    pub fn for_attempt(attempt: u32) -> Option<FixStrategy> {
        match attempt {
            1..=3 => Some(FixStrategy::A),
            4 | 5 => Some(FixStrategy::B),
            6 => Some(FixStrategy::C),
            7 => Some(FixStrategy::D),
            8 => Some(FixStrategy::E),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixOutcome {
    Fixed,
    Unchanged,
    Regressed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub task_id: TaskId,
    pub attempt: usize,
    pub verifier_excerpt: String,
    pub analyzer_diagnosis: String,
    pub strategy: FixStrategy,
    pub outcome: FixOutcome,
}

/// Raised when the Fix Engine exhausts `MAX_TASK_FAILURES` attempts without
/// a verified result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationEvent {
    Retry,
    GuidedFix { hint: String },
    Skip,
    Pause,
}
