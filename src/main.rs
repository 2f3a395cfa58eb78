//! CLI entry point. A thin `clap` dispatcher over the library surface in
//! `lib.rs` — not an interactive REPL — it exists so the engine is
//! reachable from a real binary for manual smoke-testing.
//!
//! Exit codes: 0 on success, 1 on a generic failure, 2 on cancellation, 3
//! when no usable model is available.

use clap::{Parser, Subcommand};
use forge::agentic::AgenticExecutor;
use forge::classifier;
use forge::config::{Complexity, Config, Size};
use forge::dag::fix_engine::FixEngine;
use forge::dag::task::TaskStatus;
use forge::dag::{NonInteractiveEscalation, Orchestrator};
use forge::error::EngineError;
use forge::memory::Memory;
use forge::model_client::ModelClient;
use forge::research::NullResearchProvider;
use forge::roles::analyzer::Analyzer;
use forge::roles::coder::Coder;
use forge::roles::planner::Planner;
use forge::roles::prompts::PromptStore;
use forge::roles::reviewer::Reviewer;
use forge::roles::RoutedBackend;
use forge::router::Router;
use forge::session::{self, SessionView};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "forge", about = "Autonomous code-generation orchestrator for local models")]
struct Cli {
    /// Workspace root. Defaults to the current git repo root, or the cwd.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and build a full project from a natural-language request.
    Build { request: String },
    /// Run a single-shot agentic task (no DAG, no planning).
    Agent { request: String },
    /// Resume an interrupted build from the workspace's saved session.
    Resume,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let workspace_root = match forge::workspace::resolve_workspace_root(cli.workspace) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = forge::logging::setup_tracing_with_settings(forge::logging::LoggingSettings {
        level: None,
        directory: None,
        retention_days: None,
        suppress_stdout: false,
    }) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let exit_code = match cli.command {
        Command::Build { request } => run_build(&workspace_root, &request).await,
        Command::Agent { request } => run_agent(&workspace_root, &request).await,
        Command::Resume => run_resume(&workspace_root).await,
    };
    std::process::exit(exit_code);
}

async fn run_build(workspace_root: &PathBuf, request: &str) -> i32 {
    let config = match Config::load(workspace_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error loading config: {e}");
            return 1;
        }
    };
    let client = ModelClient::new(config.model_server.url.clone());
    let router = Router::new(forge::config::default_model_registry());
    let (complexity, size) =
        classifier::classify(request, workspace_root, Some((&client, classifier_model()))).await;

    let prompts = PromptStore::load(Some(&forge::paths::prompts_override_dir()));
    let backend = RoutedBackend { client: &client, router: &router, complexity };
    let planner = Planner { backend: &backend, prompts: &prompts };
    let coder = Coder { backend: &backend, prompts: &prompts };
    let reviewer = Reviewer { backend: &backend, prompts: &prompts };
    let analyzer = Analyzer { backend: &backend, prompts: &prompts };
    let research = NullResearchProvider;
    let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };

    let memory = Arc::new(Mutex::new(Memory::new()));
    let planner_context = memory.lock().await.planner_context(request, false);
    let mut plan = match planner.plan(&planner_context, size).await {
        Ok(p) => p,
        Err(e) => return report_engine_error(&e),
    };
    memory.lock().await.architecture_summary = plan.architecture_summary.clone();

    let orchestrator = Orchestrator {
        coder: &coder,
        reviewer: &reviewer,
        analyzer: &analyzer,
        fix_engine: &fix_engine,
        embedding_provider: None,
        escalation: &NonInteractiveEscalation,
        workspace_root: workspace_root.clone(),
        fanout: config.orchestrator.fanout,
        size,
    };

    let outcome = match orchestrator.run(&mut plan, &memory).await {
        Ok(o) => o,
        Err(e) => return report_engine_error(&e),
    };

    {
        let guard = memory.lock().await;
        if let Err(e) = session::save(workspace_root, &plan, &guard).await {
            tracing::warn!(error = %e, "failed to persist session state");
        }
    }

    println!(
        "verified: {}, failed: {}, skipped: {}",
        outcome.verified.len(),
        outcome.failed.len(),
        outcome.skipped.len()
    );
    if outcome.failed.is_empty() { 0 } else { 1 }
}

async fn run_agent(workspace_root: &PathBuf, request: &str) -> i32 {
    let config = match Config::load(workspace_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error loading config: {e}");
            return 1;
        }
    };
    let client = ModelClient::new(config.model_server.url.clone());
    let router = Router::new(forge::config::default_model_registry());
    let prompts = PromptStore::load(Some(&forge::paths::prompts_override_dir()));
    let backend = RoutedBackend { client: &client, router: &router, complexity: Complexity::Medium };
    let coder = Coder { backend: &backend, prompts: &prompts };
    let analyzer = Analyzer { backend: &backend, prompts: &prompts };
    let research = NullResearchProvider;
    let fix_engine = FixEngine { coder: &coder, analyzer: &analyzer, research: &research };

    let executor = AgenticExecutor {
        backend: &backend,
        prompts: &prompts,
        fix_engine: &fix_engine,
        workspace_root: workspace_root.clone(),
        run_timeout: Duration::from_secs(config.orchestrator.run_timeout_secs),
    };

    let mut memory = Memory::new();
    match executor.execute(request, &mut memory, Size::Medium).await {
        Ok(outcome) => {
            println!(
                "wrote {} files, ran {} foreground commands, {} fix attempts, succeeded: {}",
                outcome.files_written.len(),
                outcome.foreground_commands_run,
                outcome.fix_attempts,
                outcome.succeeded
            );
            0
        }
        Err(e) => report_engine_error(&e),
    }
}

async fn run_resume(workspace_root: &PathBuf) -> i32 {
    let view = match session::load(workspace_root).await {
        Ok(Some(v)) => v,
        Ok(None) => {
            eprintln!("no saved session found at {}", workspace_root.display());
            return 1;
        }
        Err(e) => {
            eprintln!("error loading session: {e}");
            return 1;
        }
    };

    let SessionView::Current { mut plan, memory } = view else {
        eprintln!("saved session was written by a newer, incompatible version of forge; loaded read-only");
        return 1;
    };

    if session::plan_fully_verified(&plan) {
        println!("workspace already fully verified; nothing to resume");
        return 0;
    }

    let config = match Config::load(workspace_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error loading config: {e}");
            return 1;
        }
    };
    let client = ModelClient::new(config.model_server.url.clone());
    let router = Router::new(forge::config::default_model_registry());
    let prompts = PromptStore::load(Some(&forge::paths::prompts_override_dir()));
    let backend = RoutedBackend { client: &client, router: &router, complexity: Complexity::Medium };
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
        workspace_root: workspace_root.clone(),
        fanout: config.orchestrator.fanout,
        size: Size::Medium,
    };

    let pending_before: usize = plan.tasks.iter().filter(|t| t.status != TaskStatus::Verified).count();
    tracing::info!(pending = pending_before, "resuming build");

    let memory = Arc::new(Mutex::new(memory));
    let outcome = match orchestrator.run(&mut plan, &memory).await {
        Ok(o) => o,
        Err(e) => return report_engine_error(&e),
    };

    {
        let guard = memory.lock().await;
        if let Err(e) = session::save(workspace_root, &plan, &guard).await {
            tracing::warn!(error = %e, "failed to persist session state");
        }
    }

    println!(
        "verified: {}, failed: {}, skipped: {}",
        outcome.verified.len(),
        outcome.failed.len(),
        outcome.skipped.len()
    );
    if outcome.failed.is_empty() { 0 } else { 1 }
}

fn classifier_model() -> &'static forge::config::ModelSpec {
    static SPEC: std::sync::OnceLock<forge::config::ModelSpec> = std::sync::OnceLock::new();
    SPEC.get_or_init(|| {
        forge::config::default_model_registry()
            .into_iter()
            .find(|m| m.category == forge::config::ModelCategory::Summarizer)
            .expect("summarizer entry present in the built-in registry")
    })
}

fn report_engine_error(e: &EngineError) -> i32 {
    eprintln!("error [{}]: {e}", e.code());
    e.exit_code()
}
