//! Agentic Executor: the single-shot path for requests that are not full
//! builds. One [`crate::config::Role::Agentic`] model call, the Response
//! Parser extracts file writes and shell commands, files land on disk
//! atomically, then commands run in order.
//!
//! Shares the Response Parser and the one safety-filtered subprocess
//! dispatch point ([`crate::verifier::run`]) with the DAG Orchestrator —
//! there is exactly one function in the crate that spawns a child process,
//! and it runs the dangerous-command filter unconditionally before doing so.

use crate::config::{Role, Size};
use crate::dag::fix_engine::{build_failure_record, FixEngine};
use crate::dag::task::{FixOutcome, TaskId, TaskNode};
use crate::error::EngineError;
use crate::memory::Memory;
use crate::model_client::Message;
use crate::parser::{self, ShellCommand};
use crate::roles::prompts::{PromptStore, AGENTIC_SYSTEM};
use crate::roles::ModelBackend;
use crate::workspace::write_file_atomic;
use std::path::PathBuf;
use std::time::Duration;

/// Auto-fix retries at most this many times before surfacing the failure.
pub const MAX_AUTO_FIX_ATTEMPTS: u32 = 3;

/// Pseudo task id used to thread a single-shot run through the Fix
/// Engine, which is otherwise keyed by DAG task ids.
const AGENTIC_TASK_ID: TaskId = TaskId(0);

#[derive(Debug, Clone, Default)]
pub struct AgenticOutcome {
    pub files_written: Vec<PathBuf>,
    pub foreground_commands_run: usize,
    pub background_commands_dispatched: usize,
    pub fix_attempts: u32,
    pub succeeded: bool,
    pub last_output: String,
}

pub struct AgenticExecutor<'a> {
    pub backend: &'a dyn ModelBackend,
    pub prompts: &'a PromptStore,
    pub fix_engine: &'a FixEngine<'a>,
    pub workspace_root: PathBuf,
    pub run_timeout: Duration,
}

impl<'a> AgenticExecutor<'a> {
    /// Runs `request` to completion: one model call, write files, run
    /// commands, auto-fix on the first foreground failure.
    pub async fn execute(&self, request: &str, memory: &mut Memory, size: Size) -> Result<AgenticOutcome, EngineError> {
        let messages = vec![Message::system(self.prompts.get(AGENTIC_SYSTEM)), Message::user(request.to_string())];
        let raw = self.backend.call(Role::Agentic, messages, size).await?;
        let parsed = parser::parse(&raw);

        if parsed.files.is_empty() && parsed.commands.is_empty() {
            return Err(EngineError::ParseError("agentic response produced no files or commands".into()));
        }

        let mut outcome = AgenticOutcome::default();
        for file in &parsed.files {
            write_file_atomic(&self.workspace_root, &file.path, &file.content)
                .await
                .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;
            outcome.files_written.push(file.path.clone());
        }

        // Background commands are dispatched without waiting for them, but
        // still pass through the same safety-filtered entry point — just
        // not through the bounded-timeout foreground path.
        for command in &parsed.commands {
            if let ShellCommand::Background(cmd) = command {
                self.dispatch_background(cmd).await?;
                outcome.background_commands_dispatched += 1;
            }
        }

        let foreground: Vec<&str> =
            parsed.commands.iter().filter_map(|c| match c { ShellCommand::Foreground(cmd) => Some(cmd.as_str()), _ => None }).collect();

        let mut failure: Option<(String, String)> = None; // (command, captured output)
        for command in &foreground {
            let run = crate::verifier::run(command, &self.workspace_root, self.run_timeout)
                .await
                .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;
            outcome.foreground_commands_run += 1;
            if run.exit_code != Some(0) {
                failure = Some((command.to_string(), format!("{}\n{}", run.stdout, run.stderr)));
                break; // stop remaining foreground commands; background is unaffected
            }
        }

        let Some((failed_command, captured_output)) = failure else {
            outcome.succeeded = true;
            return Ok(outcome);
        };

        outcome.last_output = captured_output.clone();

        // Nothing to patch: no file was produced, so the Fix Engine has no
        // target to regenerate. Surface the failure directly.
        let Some(primary_file) = outcome.files_written.first().cloned() else {
            return Err(EngineError::VerifierFailure(captured_output));
        };

        let task = TaskNode::new(AGENTIC_TASK_ID, primary_file.clone(), request.to_string(), vec![]);
        let mut verifier_output = captured_output;

        for attempt in 1..=MAX_AUTO_FIX_ATTEMPTS {
            let current_content = tokio::fs::read_to_string(self.workspace_root.join(&primary_file))
                .await
                .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;

            let fix_attempt = self
                .fix_engine
                .attempt(&task, memory, &verifier_output, &current_content, attempt, size)
                .await?;

            write_file_atomic(&self.workspace_root, &fix_attempt.file.path, &fix_attempt.file.content)
                .await
                .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;

            let retry = crate::verifier::run(&failed_command, &self.workspace_root, self.run_timeout)
                .await
                .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;
            outcome.fix_attempts = attempt;

            if retry.exit_code == Some(0) {
                // As in the DAG pipeline, a successful attempt closes the
                // task out without a failure-log entry — the log exists to
                // keep the Analyzer from repeating an already-failed
                // strategy, not as a full attempt history.
                outcome.succeeded = true;
                return Ok(outcome);
            }

            verifier_output = format!("{}\n{}", retry.stdout, retry.stderr);
            outcome.last_output = verifier_output.clone();
            let record = build_failure_record(
                AGENTIC_TASK_ID,
                attempt as usize,
                &outcome.last_output,
                &fix_attempt.analyzer,
                fix_attempt.strategy,
                FixOutcome::Unchanged,
            );
            memory.record_failure(AGENTIC_TASK_ID, record);
        }

        Err(EngineError::VerifierFailure(format!(
            "auto-fix exhausted {MAX_AUTO_FIX_ATTEMPTS} attempts, last output:\n{}",
            outcome.last_output
        )))
    }

    async fn dispatch_background(&self, command: &str) -> Result<(), EngineError> {
        if let Some(pattern) = parser::is_dangerous_command(command) {
            return Err(EngineError::DangerousCommand(pattern.to_string()));
        }
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| EngineError::VerifierFailure(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Complexity, Role as ConfigRole};
    use crate::research::NullResearchProvider;
    use crate::roles::analyzer::Analyzer;
    use crate::roles::coder::Coder;
    use crate::roles::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        agentic_reply: String,
        coder_reply: String,
        analyzer_reply: String,
        calls: AtomicUsize,
    }

    impl ModelBackend for ScriptedBackend {
        fn call<'a>(&'a self, role: ConfigRole, _messages: Vec<Message>, _size: Size) -> BoxFuture<'a, Result<String, EngineError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = match role {
                ConfigRole::Analyzer => self.analyzer_reply.clone(),
                ConfigRole::Coder => self.coder_reply.clone(),
                _ => self.agentic_reply.clone(),
            };
            Box::pin(async move { Ok(reply) })
        }
    }

    fn executor<'a>(
        backend: &'a ScriptedBackend,
        prompts: &'a PromptStore,
        fix_engine: &'a FixEngine<'a>,
        workspace_root: PathBuf,
    ) -> AgenticExecutor<'a> {
        AgenticExecutor { backend, prompts, fix_engine, workspace_root, run_timeout: Duration::from_secs(5) }
    }

    #[tokio::test]
    async fn writes_file_and_runs_command_on_success() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            agentic_reply: "===FILE: app.py===\nprint(1)\n===END===\n===RUN: true===\n".into(),
            coder_reply: String::new(),
            analyzer_reply: String::new(),
            calls: AtomicUsize::new(0),
        };
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let analyzer = Analyzer { backend: &backend, prompts: &prompts };
        let research = NullResearchProvider;
        let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };
        let exec = executor(&backend, &prompts, &fix_engine, tmp.path().to_path_buf());

        let mut memory = Memory::new();
        let outcome = exec.execute("write a script", &mut memory, Size::Small).await.unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.files_written, vec![PathBuf::from("app.py")]);
        assert_eq!(outcome.foreground_commands_run, 1);
        let _ = Complexity::Simple;
    }

    #[tokio::test]
    async fn stops_remaining_foreground_commands_after_first_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            agentic_reply: "===FILE: app.py===\nprint(1)\n===END===\n===RUN: false===\n===RUN: echo should_not_run===\n".into(),
            coder_reply: "===FILE: app.py===\nprint(2)\n===END===\n".into(),
            analyzer_reply: r#"{"root_cause":"exit 1","fix_strategy":"patch","is_dependency_issue":false}"#.into(),
            calls: AtomicUsize::new(0),
        };
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let analyzer = Analyzer { backend: &backend, prompts: &prompts };
        let research = NullResearchProvider;
        let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };
        let exec = executor(&backend, &prompts, &fix_engine, tmp.path().to_path_buf());

        let mut memory = Memory::new();
        let result = exec.execute("write a script", &mut memory, Size::Small).await;

        // `false` never turns into exit 0 no matter how the file is patched,
        // so this exhausts all 3 auto-fix attempts and surfaces the failure.
        assert!(result.is_err());
        assert_eq!(memory.failures_for(AGENTIC_TASK_ID).len(), MAX_AUTO_FIX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn dangerous_background_command_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            agentic_reply: "===FILE: app.py===\nprint(1)\n===END===\n===BACKGROUND: rm -rf /===\n".into(),
            coder_reply: String::new(),
            analyzer_reply: String::new(),
            calls: AtomicUsize::new(0),
        };
        let prompts = PromptStore::load(None);
        let coder = Coder { backend: &backend, prompts: &prompts };
        let analyzer = Analyzer { backend: &backend, prompts: &prompts };
        let research = NullResearchProvider;
        let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };
        let exec = executor(&backend, &prompts, &fix_engine, tmp.path().to_path_buf());

        let mut memory = Memory::new();
        let result = exec.execute("do something dangerous", &mut memory, Size::Small).await;
        assert!(matches!(result, Err(EngineError::DangerousCommand(_))));
    }
}
