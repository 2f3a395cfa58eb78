//! Verifier: per-extension static checks, run-command detection, and
//! guarded subprocess execution.
//!
//! A conservative allowlist style — block shell metacharacters, allowlist
//! before spawn. Rust files are checked via `rustc --emit=metadata`
//! (syntax-only, no linking) when `rustc` is on PATH; unrecognized
//! extensions pass by default, the same way Python/Node checks degrade
//! when no toolchain is present.

use crate::parser::is_dangerous_command;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub path: String,
    pub line: u32,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub passed: bool,
    pub checks: Vec<(String, CheckResult)>,
    pub structured_errors: Vec<StructuredError>,
}

/// Per-extension static verification.
pub async fn verify(path: &Path) -> VerificationResult {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            return VerificationResult {
                passed: false,
                checks: vec![(
                    "read".to_string(),
                    CheckResult { passed: false, detail: e.to_string() },
                )],
                structured_errors: vec![],
            };
        }
    };

    match ext.as_str() {
        "py" => verify_python(path).await,
        "js" | "ts" | "mjs" | "cjs" => verify_node(path).await,
        "json" => verify_json(&content, path),
        "rs" => verify_rust(path).await,
        _ => VerificationResult {
            passed: true,
            checks: vec![(
                "syntax".to_string(),
                CheckResult { passed: true, detail: "no checker for this extension; passes by default".into() },
            )],
            structured_errors: vec![],
        },
    }
}

fn verify_json(content: &str, path: &Path) -> VerificationResult {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(_) => VerificationResult {
            passed: true,
            checks: vec![("parse".to_string(), CheckResult { passed: true, detail: "valid JSON".into() })],
            structured_errors: vec![],
        },
        Err(e) => VerificationResult {
            passed: false,
            checks: vec![("parse".to_string(), CheckResult { passed: false, detail: e.to_string() })],
            structured_errors: vec![StructuredError {
                path: path.display().to_string(),
                line: e.line() as u32,
                category: "json_parse".into(),
                message: e.to_string(),
            }],
        },
    }
}

async fn verify_python(path: &Path) -> VerificationResult {
    let mut checks = Vec::new();
    let syntax = run_capture("python3", &["-m", "py_compile", &path.display().to_string()]).await;
    let syntax_passed = syntax.as_ref().map(|o| o.status).unwrap_or(false);
    let syntax_detail = syntax.map(|o| o.combined).unwrap_or_else(|_| "python3 not on PATH".into());
    checks.push(("syntax".to_string(), CheckResult { passed: syntax_passed, detail: syntax_detail.clone() }));

    // Preferred linter, falling back to a second if available.
    let mut lint_passed = true;
    let mut lint_detail = String::new();
    if let Ok(out) = run_capture("ruff", &["check", &path.display().to_string()]).await {
        lint_passed = out.status;
        lint_detail = out.combined;
    } else if let Ok(out) = run_capture("flake8", &[&path.display().to_string()]).await {
        lint_passed = out.status;
        lint_detail = out.combined;
    }
    checks.push(("lint".to_string(), CheckResult { passed: lint_passed, detail: lint_detail.clone() }));

    VerificationResult {
        passed: syntax_passed,
        structured_errors: extract_structured_errors(&syntax_detail),
        checks,
    }
}

async fn verify_node(path: &Path) -> VerificationResult {
    let mut checks = Vec::new();
    let syntax = run_capture("node", &["--check", &path.display().to_string()]).await;
    let syntax_passed = syntax.as_ref().map(|o| o.status).unwrap_or(true);
    let syntax_detail = syntax
        .map(|o| o.combined)
        .unwrap_or_else(|_| "node not on PATH; skipped".into());
    checks.push(("syntax".to_string(), CheckResult { passed: syntax_passed, detail: syntax_detail.clone() }));

    // Optional style linter — never fails the check if missing.
    if let Ok(out) = run_capture("eslint", &[&path.display().to_string()]).await {
        checks.push(("lint".to_string(), CheckResult { passed: out.status, detail: out.combined }));
    }

    VerificationResult {
        passed: syntax_passed,
        structured_errors: extract_structured_errors(&syntax_detail),
        checks,
    }
}

async fn verify_rust(path: &Path) -> VerificationResult {
    let tmp = std::env::temp_dir().join(format!("forge-verify-{}", uuid::Uuid::new_v4()));
    let _ = tokio::fs::create_dir_all(&tmp).await;
    let out = run_capture(
        "rustc",
        &[
            "--edition",
            "2021",
            "--crate-type",
            "lib",
            "--emit=metadata",
            "--out-dir",
            &tmp.display().to_string(),
            &path.display().to_string(),
        ],
    )
    .await;
    let _ = tokio::fs::remove_dir_all(&tmp).await;

    match out {
        Ok(result) => VerificationResult {
            passed: result.status,
            structured_errors: extract_structured_errors(&result.combined),
            checks: vec![("syntax".to_string(), CheckResult { passed: result.status, detail: result.combined })],
        },
        Err(_) => VerificationResult {
            passed: true,
            checks: vec![(
                "syntax".to_string(),
                CheckResult { passed: true, detail: "rustc not on PATH; skipped".into() },
            )],
            structured_errors: vec![],
        },
    }
}

struct CapturedOutput {
    status: bool,
    combined: String,
}

async fn run_capture(program: &str, args: &[&str]) -> anyhow::Result<CapturedOutput> {
    let out = Command::new(program).args(args).output().await?;
    let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(CapturedOutput { status: out.status.success(), combined })
}

/// Extracts `{path, line, category, message}` from the two diagnostic
/// formats: `File "path", line N` and `path:line:col: message`.
pub fn extract_structured_errors(output: &str) -> Vec<StructuredError> {
    static PY_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static COLON_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let py_re = PY_RE.get_or_init(|| regex::Regex::new(r#"File "([^"]+)", line (\d+)"#).unwrap());
    let colon_re =
        COLON_RE.get_or_init(|| regex::Regex::new(r"^([^\s:][^:]*):(\d+):(\d+)?:?\s*(.*)$").unwrap());

    let mut errors = Vec::new();
    for line in output.lines() {
        if let Some(caps) = py_re.captures(line) {
            errors.push(StructuredError {
                path: caps[1].to_string(),
                line: caps[2].parse().unwrap_or(0),
                category: "syntax".into(),
                message: line.trim().to_string(),
            });
        } else if let Some(caps) = colon_re.captures(line) {
            let msg = caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string();
            errors.push(StructuredError {
                path: caps[1].to_string(),
                line: caps[2].parse().unwrap_or(0),
                category: "diagnostic".into(),
                message: msg,
            });
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Run-command detection
// ---------------------------------------------------------------------------

const NODE_SUBDIRS: &[&str] = &["", "server", "backend", "src", "api", "app"];
const NODE_ENTRY_FILES: &[&str] = &["app.js", "index.js", "server.js", "main.js"];

/// Detects the project's run command by search order: a Python entry file,
/// then `package.json` scripts/`main`, then known Node entry files in
/// common subdirectories, then an HTML entry, then any `.py` file. A
/// malformed `package.json` is logged but not fatal.
pub fn detect_run_command(workspace: &Path) -> Option<String> {
    for entry in ["main.py", "app.py"] {
        if workspace.join(entry).exists() {
            return Some(format!("python3 {entry}"));
        }
    }

    if let Some(cmd) = detect_from_package_json(workspace) {
        return Some(cmd);
    }

    for subdir in NODE_SUBDIRS {
        let base = workspace.join(subdir);
        for entry in NODE_ENTRY_FILES {
            if base.join(entry).exists() {
                let rel = if subdir.is_empty() {
                    entry.to_string()
                } else {
                    format!("{subdir}/{entry}")
                };
                return Some(format!("node {rel}"));
            }
        }
    }

    for entry in ["index.html", "public/index.html"] {
        if workspace.join(entry).exists() {
            return Some(format!("open {entry}"));
        }
    }

    if let Ok(entries) = std::fs::read_dir(workspace) {
        for entry in entries.flatten() {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("py") {
                return Some(format!("python3 {}", entry.file_name().to_string_lossy()));
            }
        }
    }

    None
}

fn detect_from_package_json(workspace: &Path) -> Option<String> {
    let path = workspace.join("package.json");
    let content = std::fs::read_to_string(&path).ok()?;
    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed package.json; ignoring for run-command detection");
            return None;
        }
    };
    let scripts = value.get("scripts")?;
    for key in ["start", "dev"] {
        if scripts.get(key).is_some() {
            return Some(format!("npm run {key}"));
        }
    }
    if let Some(main) = value.get("main").and_then(|m| m.as_str()) {
        return Some(format!("node {main}"));
    }
    None
}

// ---------------------------------------------------------------------------
// Guarded subprocess execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

const DISPLAY_TRUNCATE_LINES: usize = 20;

/// Runs `command` synchronously, guarded by the unconditional safety filter
/// shared with the Response Parser and Agentic Executor (spec.md §5). Never
/// shells out to a user/model-supplied command without this check.
pub async fn run(command: &str, cwd: &Path, run_timeout: Duration) -> anyhow::Result<RunOutcome> {
    if let Some(pattern) = is_dangerous_command(command) {
        anyhow::bail!("refused to run dangerous command (matched `{pattern}`): {command}");
    }

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let read_output = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let _ = stdout_pipe.read_to_string(&mut stdout).await;
        let _ = stderr_pipe.read_to_string(&mut stderr).await;
        (stdout, stderr)
    };

    match timeout(run_timeout, read_output).await {
        Ok((stdout, stderr)) => {
            let status = child.wait().await?;
            Ok(RunOutcome {
                exit_code: status.code(),
                truncated: false,
                stdout: truncate_display(&stdout),
                stderr: truncate_display(&stderr),
            })
        }
        Err(_) => {
            // Grace period before the hard kill: ask the child to exit, then
            // give it 5s to do so. `kill_on_drop` guarantees it's gone by the
            // time `child` is dropped even if this also times out.
            let _ = child.start_kill();
            let _ = timeout(Duration::from_secs(5), child.wait()).await;
            anyhow::bail!("subprocess timed out after {run_timeout:?}: {command}");
        }
    }
}

/// Truncates captured output to `DISPLAY_TRUNCATE_LINES` lines for display,
/// per spec.md §4.4.
fn truncate_display(s: &str) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= DISPLAY_TRUNCATE_LINES {
        return s.to_string();
    }
    let mut out = lines[..DISPLAY_TRUNCATE_LINES].join("\n");
    out.push_str(&format!("\n... ({} more lines truncated)", lines.len() - DISPLAY_TRUNCATE_LINES));
    out
}
