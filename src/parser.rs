//! Response Parser: extracts file writes and shell commands from
//! free-form model output under four format variants, plus the
//! unconditional dangerous-command safety filter shared with the
//! Verifier and Agentic Executor.
//!
//! Each strategy is an independent pure function over `&str`, tried in
//! order by [`parse`], which stops at the first strategy yielding `>= 1`
//! file-write rather than merging them into one regex.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Foreground(String),
    Background(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub files: Vec<FileWrite>,
    pub commands: Vec<ShellCommand>,
    pub display_text: String,
}

const FENCE_LANGS: &[&str] = &["json", "javascript", "python", "typescript", "bash", ""];

/// Top-level entry point: runs the four file-block strategies in order,
/// stopping at the first with `>= 1` match; parses commands independently;
/// computes display text as the input with every recognized block removed.
pub fn parse(text: &str) -> ParsedResponse {
    let files = strategy_1_strict_markers(text)
        .filter(|v| !v.is_empty())
        .or_else(|| strategy_2_marker_fenced(text).filter(|v| !v.is_empty()))
        .or_else(|| strategy_3_heading_style(text).filter(|v| !v.is_empty()))
        .or_else(|| strategy_4_marker_no_end(text).filter(|v| !v.is_empty()))
        .unwrap_or_default();

    let files: Vec<FileWrite> = files
        .into_iter()
        .map(|mut f| {
            f.content = strip_fence(&f.content);
            f
        })
        .collect();

    let commands = parse_commands(text);
    let display_text = strip_blocks(text);

    ParsedResponse { files, commands, display_text }
}

// ---------------------------------------------------------------------------
// Strategy 1: strict markers `===FILE: path=== ... ===END===`
// ---------------------------------------------------------------------------

fn strategy_1_strict_markers(text: &str) -> Option<Vec<FileWrite>> {
    let re = file_end_re();
    let out: Vec<FileWrite> = re
        .captures_iter(text)
        .map(|c| FileWrite {
            path: PathBuf::from(c[1].trim()),
            content: strip_one_leading_newline(&c[2]),
        })
        .collect();
    Some(out)
}

fn file_end_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?s)===FILE:\s*(.+?)\s*===\r?\n(.*?)===END===\r?\n?").unwrap()
    })
}

// ---------------------------------------------------------------------------
// Strategy 2: marker immediately followed by a fenced code block
// ---------------------------------------------------------------------------

fn strategy_2_marker_fenced(text: &str) -> Option<Vec<FileWrite>> {
    let marker_re = marker_re();
    let mut out = Vec::new();
    for caps in marker_re.captures_iter(text) {
        let path = caps[1].trim().to_string();
        let after = &text[caps.get(0)?.end()..];
        let trimmed = after.trim_start_matches(['\r', '\n']);
        if !trimmed.starts_with("```") {
            continue;
        }
        if let Some((body, _rest)) = extract_fenced_body(trimmed) {
            out.push(FileWrite { path: PathBuf::from(path), content: body });
        }
    }
    Some(out)
}

fn marker_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"===FILE:\s*(.+?)\s*===\r?\n").unwrap())
}

/// Extracts the body of a fenced code block starting at `text` (which must
/// begin with a fence line). Returns `(body, rest_after_closing_fence)`.
fn extract_fenced_body(text: &str) -> Option<(String, &str)> {
    let mut lines = text.lines();
    let _opening = lines.next()?; // ```lang
    let mut body = String::new();
    let mut consumed = 0usize;
    let opening_len = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    consumed += opening_len;
    let remainder = &text[opening_len..];
    for line in remainder.lines() {
        if line.trim_end() == "```" {
            let line_len = line.len() + 1;
            consumed += line_len;
            let rest = if consumed <= text.len() { &text[consumed..] } else { "" };
            return Some((body, rest));
        }
        body.push_str(line);
        body.push('\n');
        consumed += line.len() + 1;
    }
    // Unterminated fence: treat remainder as the whole body.
    Some((body, ""))
}

// ---------------------------------------------------------------------------
// Strategy 3: markdown heading / bold-only line naming a path, then a fence
// ---------------------------------------------------------------------------

fn strategy_3_heading_style(text: &str) -> Option<Vec<FileWrite>> {
    let heading_re = heading_re();
    let mut out = Vec::new();
    for caps in heading_re.captures_iter(text) {
        let candidate = caps[1].trim().to_string();
        if !looks_like_path(&candidate) {
            continue;
        }
        let after = &text[caps.get(0)?.end()..];
        let trimmed = after.trim_start_matches(['\r', '\n']);
        if !trimmed.starts_with("```") {
            continue;
        }
        if let Some((body, _rest)) = extract_fenced_body(trimmed) {
            out.push(FileWrite { path: PathBuf::from(candidate), content: body });
        }
    }
    Some(out)
}

fn heading_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    // Matches `### path`, `## path`, or `**path**` as a standalone line.
    RE.get_or_init(|| {
        regex::Regex::new(r"(?m)^(?:#{1,6}\s*|\*\*)([^\n*]+?)(?:\*\*)?\s*$").unwrap()
    })
}

fn looks_like_path(candidate: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    let has_extension = candidate
        .rsplit('.')
        .next()
        .map(|ext| ext.len() <= 5 && !ext.is_empty() && ext != candidate)
        .unwrap_or(false);
    let plausible_chars = candidate
        .chars()
        .all(|c| c.is_alphanumeric() || "._-/".contains(c));
    plausible_chars && has_extension && candidate.len() < 200
}

// ---------------------------------------------------------------------------
// Strategy 4: marker with no terminating `===END===`
// ---------------------------------------------------------------------------

fn strategy_4_marker_no_end(text: &str) -> Option<Vec<FileWrite>> {
    let marker_re = marker_re();
    let matches: Vec<_> = marker_re.captures_iter(text).collect();
    let mut out = Vec::new();
    for (i, caps) in matches.iter().enumerate() {
        let path = caps[1].trim().to_string();
        let start = caps.get(0)?.end();
        let end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(text.len());
        if start > end {
            continue;
        }
        let mut body = text[start..end].to_string();
        // Drop a trailing ===END=== line if present so strategy 4 still
        // degrades correctly when mixed with strategy-1-style blocks.
        if let Some(stripped) = body.strip_suffix("===END===\n") {
            body = stripped.to_string();
        } else if let Some(stripped) = body.strip_suffix("===END===") {
            body = stripped.to_string();
        }
        out.push(FileWrite { path: PathBuf::from(path), content: body });
    }
    Some(out)
}

fn strip_one_leading_newline(s: &str) -> String {
    s.strip_prefix('\n').unwrap_or(s).to_string()
}

// ---------------------------------------------------------------------------
// Fence stripping (applied after extraction, regardless of strategy)
// ---------------------------------------------------------------------------

/// If the captured body begins with a fenced code block whose language tag
/// is one of the recognized set, strips the fences.
pub fn strip_fence(body: &str) -> String {
    let trimmed = body.trim_start_matches(['\r', '\n']);
    if !trimmed.starts_with("```") {
        return body.to_string();
    }
    let first_line_end = trimmed.find('\n').unwrap_or(trimmed.len());
    let lang = trimmed[3..first_line_end].trim();
    if !FENCE_LANGS.contains(&lang) {
        return body.to_string();
    }
    let after_open = &trimmed[(first_line_end + 1).min(trimmed.len())..];
    if let Some((inner, _rest)) = extract_fenced_body(&format!("```{lang}\n{after_open}")) {
        inner
    } else {
        body.to_string()
    }
}

// ---------------------------------------------------------------------------
// Shell command blocks
// ---------------------------------------------------------------------------

fn parse_commands(text: &str) -> Vec<ShellCommand> {
    static RUN_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static BG_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let run_re = RUN_RE.get_or_init(|| regex::Regex::new(r"===RUN:\s*(.+?)\s*===").unwrap());
    let bg_re = BG_RE.get_or_init(|| regex::Regex::new(r"===BACKGROUND:\s*(.+?)\s*===").unwrap());

    // Collect both kinds with their byte offsets so the original ordering
    // in the model's output is preserved.
    let mut hits: Vec<(usize, ShellCommand)> = Vec::new();
    for caps in run_re.captures_iter(text) {
        let m = caps.get(0).unwrap();
        hits.push((m.start(), ShellCommand::Foreground(caps[1].to_string())));
    }
    for caps in bg_re.captures_iter(text) {
        let m = caps.get(0).unwrap();
        hits.push((m.start(), ShellCommand::Background(caps[1].to_string())));
    }
    hits.sort_by_key(|(pos, _)| *pos);
    hits.into_iter().map(|(_, c)| c).collect()
}

fn strip_blocks(text: &str) -> String {
    let mut out = file_end_re().replace_all(text, "").to_string();
    out = marker_re().replace_all(&out, "").to_string();
    static RUN_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static BG_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let run_re = RUN_RE.get_or_init(|| regex::Regex::new(r"===RUN:\s*(.+?)\s*===\r?\n?").unwrap());
    let bg_re = BG_RE.get_or_init(|| regex::Regex::new(r"===BACKGROUND:\s*(.+?)\s*===\r?\n?").unwrap());
    out = run_re.replace_all(&out, "").to_string();
    out = bg_re.replace_all(&out, "").to_string();
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Safety filter (unconditional, every mode)
// ---------------------------------------------------------------------------

const DANGEROUS_PATTERNS: &[&str] = &["rm -rf /", "sudo rm", "mkfs", "dd if="];
const FORK_BOMB: &str = ":(){:|:&};:";

/// Returns the matched dangerous pattern, if any. Checked unconditionally
/// before every subprocess dispatch in the crate.
pub fn is_dangerous_command(cmd: &str) -> Option<&'static str> {
    let normalized: String = cmd.chars().filter(|c| !c.is_whitespace()).collect();
    let fork_bomb_normalized: String = FORK_BOMB.chars().filter(|c| !c.is_whitespace()).collect();
    if normalized.contains(&fork_bomb_normalized) {
        return Some(":(){:|:&};:");
    }
    for pattern in DANGEROUS_PATTERNS {
        if cmd.contains(pattern) {
            return Some(pattern);
        }
    }
    None
}
