//! Memory: structured project state layered into an architecture summary,
//! file index, dependency graph, bounded failure log, per-role chat
//! histories, and an optional embedding layer.
//!
//! The contextual slicing contract is mandatory and enforced here, not
//! left to callers: each role accessor below returns exactly the slice
//! that role is allowed to see — no role receives raw dumps of another
//! role's conversation.

pub mod embeddings;
pub mod history;

use crate::dag::task::{FailureRecord, TaskId};
use embeddings::EmbeddingIndex;
use history::HistoryStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Bound on the number of failure records retained per task.
pub const MAX_FAILURE_RECORDS_PER_TASK: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct SpecSlots {
    pub database_schema: Option<String>,
    pub api_surface: Option<String>,
    pub auth_flow: Option<String>,
    pub deployment: Option<String>,
}

pub struct Memory {
    pub architecture_summary: String,
    pub spec_slots: SpecSlots,
    file_index: HashMap<PathBuf, String>,
    dependency_graph: HashMap<PathBuf, Vec<PathBuf>>,
    failure_log: HashMap<TaskId, Vec<FailureRecord>>,
    histories: HistoryStore,
    pub embeddings: EmbeddingIndex,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            architecture_summary: String::new(),
            spec_slots: SpecSlots::default(),
            file_index: HashMap::new(),
            dependency_graph: HashMap::new(),
            failure_log: HashMap::new(),
            histories: HistoryStore::new(history::DEFAULT_HISTORY_BOUND),
            embeddings: EmbeddingIndex::new(),
        }
    }

    /// Rebuilds a `Memory` from persisted parts on session resume. The
    /// dependency graph is not persisted — it's re-derived from file
    /// content the next time `index_dependencies` runs.
    pub fn restore(
        architecture_summary: String,
        spec_slots: SpecSlots,
        file_index: Vec<(PathBuf, String)>,
        failure_log: Vec<(TaskId, Vec<FailureRecord>)>,
        histories: HashMap<String, Vec<crate::model_client::Message>>,
        embeddings: Vec<embeddings::FileEmbedding>,
    ) -> Self {
        Self {
            architecture_summary,
            spec_slots,
            file_index: file_index.into_iter().collect(),
            dependency_graph: HashMap::new(),
            failure_log: failure_log.into_iter().collect(),
            histories: HistoryStore::from_snapshot(history::DEFAULT_HISTORY_BOUND, histories),
            embeddings: EmbeddingIndex::from_snapshot(embeddings),
        }
    }

    /// Snapshot of the file index, for session persistence.
    pub fn file_index_snapshot(&self) -> Vec<(PathBuf, String)> {
        self.file_index.iter().map(|(p, s)| (p.clone(), s.clone())).collect()
    }

    // -- file index / dependency graph --------------------------------------

    pub fn set_file_purpose(&mut self, path: &Path, purpose: impl Into<String>) {
        self.file_index.insert(path.to_path_buf(), purpose.into());
    }

    pub fn file_index(&self) -> &HashMap<PathBuf, String> {
        &self.file_index
    }

    /// Re-derives the import edges for `path` from its content, using a
    /// tiny per-language line-prefix scanner — good enough for the
    /// contextual-slicing contract without a real multi-language parser.
    pub fn index_dependencies(&mut self, path: &Path, content: &str) {
        let imports = scan_imports(content);
        self.dependency_graph.insert(path.to_path_buf(), imports);
    }

    pub fn dependencies_of(&self, path: &Path) -> &[PathBuf] {
        self.dependency_graph.get(path).map(|v| v.as_slice()).unwrap_or(&[])
    }

    // -- failure log (append-only per session, bounded per task) -----------

    pub fn record_failure(&mut self, task_id: TaskId, record: FailureRecord) {
        let entries = self.failure_log.entry(task_id).or_default();
        entries.push(record);
        while entries.len() > MAX_FAILURE_RECORDS_PER_TASK {
            entries.remove(0);
        }
    }

    pub fn failures_for(&self, task_id: TaskId) -> &[FailureRecord] {
        self.failure_log.get(&task_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn all_failures(&self) -> impl Iterator<Item = (&TaskId, &Vec<FailureRecord>)> {
        self.failure_log.iter()
    }

    /// Snapshot of the full failure log, for session persistence. Returned
    /// as a `Vec` rather than the internal `HashMap` since the on-disk
    /// format needs ordered, string-keyable entries.
    pub fn failure_log_snapshot(&self) -> Vec<(TaskId, Vec<FailureRecord>)> {
        self.failure_log.iter().map(|(id, v)| (*id, v.clone())).collect()
    }

    // -- per-role chat history -----------------------------------------------

    pub fn push_history(&mut self, role: &str, message: crate::model_client::Message) {
        self.histories.push(role, message);
    }

    pub fn history_for(&self, role: &str) -> &[crate::model_client::Message] {
        self.histories.get(role)
    }

    /// Snapshot of every role's chat history, for session persistence.
    pub fn history_snapshot(&self) -> HashMap<String, Vec<crate::model_client::Message>> {
        self.histories.snapshot()
    }

    // -- contextual slicing contract -----------------------------------------

    /// Coder context: architecture summary + spec slots + the target file's
    /// dependency context + top-k related files (empty if embeddings
    /// unavailable).
    pub fn coder_context(&self, target_path: &Path) -> CoderContext {
        let related = if self.embeddings.is_empty() {
            Vec::new()
        } else {
            // A real embedding query vector would come from the model; the
            // Memory layer only owns retrieval, not embedding generation,
            // so callers that have embeddings pass a query vector through
            // `related_files_for` instead when they want non-empty results.
            Vec::new()
        };
        CoderContext {
            architecture_summary: self.architecture_summary.clone(),
            spec_slots: self.spec_slots.clone(),
            dependencies: self.dependencies_of(target_path).to_vec(),
            related_files: related,
        }
    }

    /// Same as [`Memory::coder_context`] but with an explicit query vector
    /// for the embedding retrieval step, when the caller has one.
    pub fn coder_context_with_query(&self, target_path: &Path, query_vector: &[f32], k: usize) -> CoderContext {
        let mut ctx = self.coder_context(target_path);
        ctx.related_files = self.embeddings.top_k(query_vector, k);
        ctx
    }

    /// Reviewer context: the file under review + architecture summary.
    /// Deliberately excludes failure log and other roles' histories.
    pub fn reviewer_context(&self, file_content: &str) -> ReviewerContext {
        ReviewerContext {
            file_content: file_content.to_string(),
            architecture_summary: self.architecture_summary.clone(),
        }
    }

    /// Analyzer context: verifier output + this task's failure log +
    /// architecture summary.
    pub fn analyzer_context(&self, task_id: TaskId, verifier_output: &str) -> AnalyzerContext {
        AnalyzerContext {
            verifier_output: verifier_output.to_string(),
            failure_log: self.failures_for(task_id).to_vec(),
            architecture_summary: self.architecture_summary.clone(),
        }
    }

    /// Planner context: the original request + failure log, included only
    /// when refining an existing plan.
    pub fn planner_context(&self, request: &str, refining: bool) -> PlannerContext {
        let failure_log = if refining {
            self.all_failures().flat_map(|(_, v)| v.clone()).collect()
        } else {
            Vec::new()
        };
        PlannerContext { request: request.to_string(), failure_log }
    }
}

#[derive(Debug, Clone)]
pub struct CoderContext {
    pub architecture_summary: String,
    pub spec_slots: SpecSlots,
    pub dependencies: Vec<PathBuf>,
    pub related_files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReviewerContext {
    pub file_content: String,
    pub architecture_summary: String,
}

#[derive(Debug, Clone)]
pub struct AnalyzerContext {
    pub verifier_output: String,
    pub failure_log: Vec<FailureRecord>,
    pub architecture_summary: String,
}

#[derive(Debug, Clone)]
pub struct PlannerContext {
    pub request: String,
    pub failure_log: Vec<FailureRecord>,
}

/// Minimal per-language import scanner: line-prefix matching for
/// `use `/`import `/`from ... import`/`#include`, good enough for the
/// contextual-slicing contract without pulling in a real multi-language
/// parser dependency.
fn scan_imports(content: &str) -> Vec<PathBuf> {
    let mut imports = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("use ") {
            imports.push(normalize_module(rest));
        } else if let Some(rest) = trimmed.strip_prefix("import ") {
            imports.push(normalize_module(rest));
        } else if let Some(rest) = trimmed.strip_prefix("from ") {
            if let Some((module, _)) = rest.split_once(" import") {
                imports.push(normalize_module(module));
            }
        } else if let Some(rest) = trimmed.strip_prefix("#include ") {
            imports.push(normalize_module(rest));
        }
    }
    imports
}

fn normalize_module(raw: &str) -> PathBuf {
    let cleaned = raw
        .trim_end_matches(';')
        .trim_matches(|c| c == '"' || c == '<' || c == '>' || c == '\'')
        .trim();
    PathBuf::from(cleaned.split("::").next().unwrap_or(cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::task::{FixStrategy, FixOutcome};

    #[test]
    fn failure_log_is_bounded_per_task() {
        let mut memory = Memory::new();
        for i in 0..(MAX_FAILURE_RECORDS_PER_TASK + 5) {
            memory.record_failure(
                TaskId(1),
                FailureRecord {
                    task_id: TaskId(1),
                    attempt: i,
                    verifier_excerpt: String::new(),
                    analyzer_diagnosis: String::new(),
                    strategy: FixStrategy::A,
                    outcome: FixOutcome::Unchanged,
                },
            );
        }
        assert_eq!(memory.failures_for(TaskId(1)).len(), MAX_FAILURE_RECORDS_PER_TASK);
    }

    #[test]
    fn reviewer_context_excludes_failure_log() {
        let memory = Memory::new();
        let ctx = memory.reviewer_context("file body");
        assert_eq!(ctx.file_content, "file body");
        // ReviewerContext type has no failure_log field at all — compile-time
        // enforcement that the role never receives it.
    }

    #[test]
    fn planner_context_only_includes_failures_when_refining() {
        let mut memory = Memory::new();
        memory.record_failure(
            TaskId(1),
            FailureRecord {
                task_id: TaskId(1),
                attempt: 1,
                verifier_excerpt: "boom".into(),
                analyzer_diagnosis: "diag".into(),
                strategy: FixStrategy::A,
                outcome: FixOutcome::Unchanged,
            },
        );
        let fresh = memory.planner_context("request", false);
        assert!(fresh.failure_log.is_empty());
        let refining = memory.planner_context("request", true);
        assert_eq!(refining.failure_log.len(), 1);
    }

    #[test]
    fn scan_imports_recognizes_rust_python_c() {
        let content = "use std::collections::HashMap;\nimport os\nfrom typing import Optional\n#include <stdio.h>\n";
        let imports = scan_imports(content);
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0], PathBuf::from("std"));
        assert_eq!(imports[1], PathBuf::from("os"));
        assert_eq!(imports[2], PathBuf::from("typing"));
        assert_eq!(imports[3], PathBuf::from("stdio.h"));
    }

    #[test]
    fn index_dependencies_feeds_coder_context() {
        let mut memory = Memory::new();
        memory.index_dependencies(Path::new("main.rs"), "use crate::util;\n");
        let ctx = memory.coder_context(Path::new("main.rs"));
        assert_eq!(ctx.dependencies, vec![PathBuf::from("crate")]);
    }
}
