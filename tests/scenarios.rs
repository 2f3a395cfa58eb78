//! End-to-end scenarios S1-S6 from spec.md §8, driven against the public
//! library surface with zero network access: a `MockModel`-style
//! `ScriptedBackend` stands in for the model transport boundary in every
//! test here.

use forge::classifier;
use forge::config::{Complexity, Role as ConfigRole, Size};
use forge::dag::fix_engine::FixEngine;
use forge::dag::task::{Plan, SpecSlotsPlan, TaskId, TaskNode, TaskStatus};
use forge::dag::{NonInteractiveEscalation, Orchestrator};
use forge::error::EngineError;
use forge::memory::Memory;
use forge::model_client::Message;
use forge::parser;
use forge::research::NullResearchProvider;
use forge::roles::analyzer::Analyzer;
use forge::roles::coder::Coder;
use forge::roles::prompts::PromptStore;
use forge::roles::reviewer::Reviewer;
use forge::roles::{BoxFuture, ModelBackend};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// S1 — short prompt promotes complexity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_short_prompt_promotes_complexity() {
    let tmp = tempfile::tempdir().unwrap();
    let (complexity, size) = classifier::classify("build a tinder for linkedin", tmp.path(), None).await;
    assert_eq!(complexity, Complexity::Heavy);
    assert_eq!(size, Size::Large);
}

// ---------------------------------------------------------------------------
// S2 — canonical file emission
// ---------------------------------------------------------------------------

#[test]
fn s2_canonical_file_emission() {
    let raw = "===FILE: app.py===\nprint(\"hi\")\n===END===\n";
    let parsed = parser::parse(raw);
    assert_eq!(parsed.files.len(), 1);
    assert_eq!(parsed.files[0].path, PathBuf::from("app.py"));
    assert_eq!(parsed.files[0].content, "print(\"hi\")\n");
    assert!(parsed.commands.is_empty());
}

// ---------------------------------------------------------------------------
// S3 — fence stripping
// ---------------------------------------------------------------------------

#[test]
fn s3_fence_stripping() {
    let raw = "===FILE: package.json===\n```json\n{\"name\":\"x\"}\n```\n===END===\n";
    let parsed = parser::parse(raw);
    assert_eq!(parsed.files.len(), 1);
    assert_eq!(parsed.files[0].content, "{\"name\":\"x\"}\n");
    assert!(!parsed.files[0].content.contains('`'));
}

// ---------------------------------------------------------------------------
// S4 — stop-on-failure (Agentic Executor)
// ---------------------------------------------------------------------------

struct ScriptedBackend {
    agentic_reply: String,
    coder_reply: String,
    analyzer_reply: String,
    foreground_dispatches: AtomicUsize,
}

impl ModelBackend for ScriptedBackend {
    fn call<'a>(&'a self, role: ConfigRole, _messages: Vec<Message>, _size: Size) -> BoxFuture<'a, Result<String, EngineError>> {
        let reply = match role {
            ConfigRole::Analyzer => self.analyzer_reply.clone(),
            ConfigRole::Coder => self.coder_reply.clone(),
            _ => self.agentic_reply.clone(),
        };
        Box::pin(async move { Ok(reply) })
    }
}

#[tokio::test]
async fn s4_stop_on_failure_does_not_dispatch_remaining_foreground_commands() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend {
        agentic_reply: "===FILE: app.py===\nprint(1)\n===END===\n===RUN: false===\n===RUN: echo should_not_run===\n".into(),
        // The patch reply can't turn `false` into exit 0 no matter what it
        // writes, so auto-fix exhausts its attempts and the failure surfaces.
        coder_reply: "===FILE: app.py===\nprint(2)\n===END===\n".into(),
        analyzer_reply: r#"{"root_cause":"exit 1","fix_strategy":"patch","is_dependency_issue":false}"#.into(),
        foreground_dispatches: AtomicUsize::new(0),
    };
    let prompts = PromptStore::load(None);
    let coder = Coder { backend: &backend, prompts: &prompts };
    let analyzer = Analyzer { backend: &backend, prompts: &prompts };
    let research = NullResearchProvider;
    let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };
    let exec = forge::agentic::AgenticExecutor {
        backend: &backend,
        prompts: &prompts,
        fix_engine: &fix_engine,
        workspace_root: tmp.path().to_path_buf(),
        run_timeout: std::time::Duration::from_secs(5),
    };

    let mut memory = Memory::new();
    let result = exec.execute("write a script", &mut memory, Size::Small).await;

    assert!(result.is_err(), "echo should_not_run must never flip the overall result to success");
    // The event log is the auto-fix attempt's retry count: exactly the
    // `false` command re-run MAX_AUTO_FIX_ATTEMPTS times, never the second
    // `echo` line from the original response.
    assert_eq!(memory.failures_for(TaskId(0)).len(), forge::agentic::MAX_AUTO_FIX_ATTEMPTS as usize);
}

// ---------------------------------------------------------------------------
// S5 — dangerous-command block
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s5_dangerous_command_never_dispatched() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend {
        agentic_reply: "===FILE: app.py===\nprint(1)\n===END===\n===RUN: rm -rf /===\n".into(),
        coder_reply: String::new(),
        analyzer_reply: String::new(),
        foreground_dispatches: AtomicUsize::new(0),
    };
    let prompts = PromptStore::load(None);
    let coder = Coder { backend: &backend, prompts: &prompts };
    let analyzer = Analyzer { backend: &backend, prompts: &prompts };
    let research = NullResearchProvider;
    let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };
    let exec = forge::agentic::AgenticExecutor {
        backend: &backend,
        prompts: &prompts,
        fix_engine: &fix_engine,
        workspace_root: tmp.path().to_path_buf(),
        run_timeout: std::time::Duration::from_secs(5),
    };

    let mut memory = Memory::new();
    let result = exec.execute("do something dangerous", &mut memory, Size::Small).await;
    assert!(matches!(result, Err(EngineError::DangerousCommand(_))));
    assert_eq!(backend.foreground_dispatches.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// S6 — fix-loop progression: fails twice, passes on the third attempt
// ---------------------------------------------------------------------------

/// Returns invalid JSON on its first three coder calls (initial generate
/// plus two fix attempts), valid JSON on the fourth and any call after —
/// deterministic, no reliance on any external toolchain (the `.json`
/// verifier is pure `serde_json::from_str`).
struct FlakyJsonBackend {
    coder_calls: AtomicUsize,
}

impl ModelBackend for FlakyJsonBackend {
    fn call<'a>(&'a self, role: ConfigRole, _messages: Vec<Message>, _size: Size) -> BoxFuture<'a, Result<String, EngineError>> {
        let reply = match role {
            ConfigRole::Reviewer => r#"{"approved": true, "issues": [], "summary": "looks fine"}"#.to_string(),
            ConfigRole::Analyzer => {
                r#"{"root_cause":"invalid json","fix_strategy":"fix the trailing content","is_dependency_issue":false}"#.to_string()
            }
            ConfigRole::Coder => {
                let n = self.coder_calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    "===FILE: app.json===\n{not valid json\n===END===\n".to_string()
                } else {
                    "===FILE: app.json===\n{\"ok\": true}\n===END===\n".to_string()
                }
            }
            _ => String::new(),
        };
        Box::pin(async move { Ok(reply) })
    }
}

#[tokio::test]
async fn s6_fix_loop_progression_verifies_on_third_attempt() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = FlakyJsonBackend { coder_calls: AtomicUsize::new(0) };
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
        fanout: 1,
        size: Size::Small,
    };

    let mut plan = Plan {
        architecture_summary: "a tiny tool".into(),
        tech_stack: Default::default(),
        file_index: vec![],
        spec_slots: SpecSlotsPlan::default(),
        tasks: vec![TaskNode::new(TaskId(1), PathBuf::from("app.json"), "config file".into(), vec![])],
    };
    let memory = Arc::new(Mutex::new(Memory::new()));
    let outcome = orchestrator.run(&mut plan, &memory).await.unwrap();

    assert_eq!(outcome.verified, vec![TaskId(1)]);
    assert_eq!(plan.tasks[0].status, TaskStatus::Verified);
    assert_eq!(plan.tasks[0].failure_count, 2);

    let guard = memory.lock().await;
    let records = guard.failures_for(TaskId(1));
    assert_eq!(records.len(), 2, "the third, successful attempt leaves no failure-log record");
    for record in records {
        assert_eq!(record.strategy, forge::dag::task::FixStrategy::A);
        assert_eq!(record.outcome, forge::dag::task::FixOutcome::Unchanged);
    }
    assert_eq!(records[0].attempt, 1);
    assert_eq!(records[1].attempt, 2);

    assert_eq!(
        tokio::fs::read_to_string(tmp.path().join("app.json")).await.unwrap(),
        "{\"ok\": true}\n"
    );
}

// ---------------------------------------------------------------------------
// Property 3 — Plan invariants: distinct paths, acyclic dependency graph
// ---------------------------------------------------------------------------

#[test]
fn plan_validate_rejects_duplicate_paths_and_cycles() {
    let dup_plan = Plan {
        architecture_summary: String::new(),
        tech_stack: Default::default(),
        file_index: vec![],
        spec_slots: SpecSlotsPlan::default(),
        tasks: vec![
            TaskNode::new(TaskId(1), PathBuf::from("a.py"), "a".into(), vec![]),
            TaskNode::new(TaskId(2), PathBuf::from("a.py"), "also a".into(), vec![]),
        ],
    };
    assert!(dup_plan.validate().is_err());

    let mut cyclic_plan = Plan {
        architecture_summary: String::new(),
        tech_stack: Default::default(),
        file_index: vec![],
        spec_slots: SpecSlotsPlan::default(),
        tasks: vec![
            TaskNode::new(TaskId(1), PathBuf::from("a.py"), "a".into(), vec![TaskId(2)]),
            TaskNode::new(TaskId(2), PathBuf::from("b.py"), "b".into(), vec![TaskId(1)]),
        ],
    };
    assert!(cyclic_plan.validate().is_err());
    cyclic_plan.tasks[1].depends_on.clear();
    assert!(cyclic_plan.validate().is_ok());
}
