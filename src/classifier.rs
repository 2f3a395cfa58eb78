//! Classifier: maps a request + workspace snapshot to `(complexity, size)`
//! via two-phase fusion — keyword scoring (Phase A) fused with a single
//! fast-model call (Phase B), the higher of the two winning per axis
//! ("err toward more resources").
//!
//! The keyword tables are data, not match arms, so the signal sets can
//! grow without touching control flow.

use crate::config::{Complexity, ModelSpec, Role, Size};
use crate::model_client::{CancelFlag, Message, ModelClient};
use std::path::Path;

/// A keyword signal entry: the phrase to match (case-insensitively, as a
/// substring) and the axis it votes for.
pub struct Signal {
    pub phrase: &'static str,
    pub complexity: Complexity,
    pub size: Size,
}

/// HEAVY signals: app-clone patterns and domain tokens implying a large,
/// multi-entity system.
pub const HEAVY_SIGNALS: &[&str] = &[
    "like tinder",
    "tinder",
    "uber for",
    "a spotify",
    "social network",
    "marketplace",
    "dating app",
    "matching system",
    "recommendation engine",
    "booking",
    "saas",
    "fintech",
];

/// MEDIUM signals: generic app/domain tokens.
pub const MEDIUM_SIGNALS: &[&str] = &[
    "web app",
    "mobile app",
    "game",
    "analytics",
    "profile",
    "search",
    "forum",
];

/// SIMPLE signals: explicit simplicity markers.
pub const SIMPLE_SIGNALS: &[&str] = &["simple", "basic", "calculator", "todo", "landing page"];

/// BUILD intent patterns that multiply the matched weight by 1.5 and
/// deterministically break ties against chat intent.
pub const BUILD_SIGNALS: &[&str] = &["build", "create", "make me"];

const BUILD_MULTIPLIER: f32 = 1.5;

/// Phase A: keyword scoring over the prompt alone, lowercased. Returns the
/// winning `(Complexity, Size)` signal pair, or `None` if nothing matched.
pub fn classify_keywords(prompt: &str) -> Option<(Complexity, Size)> {
    let lower = prompt.to_lowercase();
    let build_multiplier = if BUILD_SIGNALS.iter().any(|p| lower.contains(p)) {
        BUILD_MULTIPLIER
    } else {
        1.0
    };

    let heavy_weight = HEAVY_SIGNALS.iter().filter(|p| lower.contains(**p)).count() as f32
        * build_multiplier;
    let medium_weight = MEDIUM_SIGNALS.iter().filter(|p| lower.contains(**p)).count() as f32
        * build_multiplier;
    let simple_weight = SIMPLE_SIGNALS.iter().filter(|p| lower.contains(**p)).count() as f32
        * build_multiplier;

    if heavy_weight <= 0.0 && medium_weight <= 0.0 && simple_weight <= 0.0 {
        return None;
    }

    // Err toward more resources: heavy beats medium beats simple whenever
    // any of its signals matched at all, regardless of relative counts.
    if heavy_weight > 0.0 {
        Some((Complexity::Heavy, Size::Large))
    } else if medium_weight > 0.0 {
        Some((Complexity::Medium, Size::Medium))
    } else {
        Some((Complexity::Simple, Size::Small))
    }
}

/// Workspace-size signal: file count buckets into small/medium/large.
pub fn size_from_file_count(file_count: usize) -> Size {
    match file_count {
        0..=3 => Size::Small,
        4..=10 => Size::Medium,
        _ => Size::Large,
    }
}

fn count_workspace_files(workspace_root: &Path) -> usize {
    walk_count(workspace_root)
}

fn walk_count(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') || name == "target" || name == "node_modules" {
                continue;
            }
        }
        if path.is_dir() {
            count += walk_count(&path);
        } else {
            count += 1;
        }
    }
    count
}

/// Phase B: a single LLM call, using the fastest available model from the
/// same registry the Router consults (category `summarizer` or `general`,
/// smallest tier) rather than a second, parallel model list.
pub async fn classify_via_model(
    prompt: &str,
    client: &ModelClient,
    spec: &ModelSpec,
) -> Option<(Complexity, Size)> {
    let system = "You are a request classifier. Reply with exactly one label from this set and \
        nothing else: heavy/small, heavy/medium, heavy/large, medium/small, medium/medium, \
        medium/large, simple/small, simple/medium, simple/large.";
    let messages = vec![
        Message::system(system),
        Message::user(format!("Classify this request: {prompt}")),
    ];
    let outcome = client
        .call(Role::Classifier, messages, spec, Size::Small, &CancelFlag::new())
        .await
        .ok()?;
    parse_label(outcome.text.trim())
}

fn parse_label(label: &str) -> Option<(Complexity, Size)> {
    let lower = label.to_lowercase();
    let (c, s) = lower.split_once('/')?;
    let complexity = match c.trim() {
        "heavy" => Complexity::Heavy,
        "medium" => Complexity::Medium,
        "simple" => Complexity::Simple,
        _ => return None,
    };
    let size = match s.trim() {
        "small" => Size::Small,
        "medium" => Size::Medium,
        "large" => Size::Large,
        _ => return None,
    };
    Some((complexity, size))
}

/// Fuse two optional signals, axis by axis, the higher winning. `None`
/// inputs are treated as absent (don't drag the result down).
fn fuse(a: Option<(Complexity, Size)>, b: Option<(Complexity, Size)>) -> Option<(Complexity, Size)> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x),
        (Some((c1, s1)), Some((c2, s2))) => Some((c1.max(c2), s1.max(s2))),
    }
}

/// Full two-phase fusion classifier. `model` is `None` when no model server
/// is available, in which case Phase A is used alone. Default when no
/// signals match at all: `medium/medium` (never `simple/small`).
pub async fn classify(
    prompt: &str,
    workspace_root: &Path,
    model: Option<(&ModelClient, &ModelSpec)>,
) -> (Complexity, Size) {
    let phase_a = classify_keywords(prompt);
    let phase_b = match model {
        Some((client, spec)) => classify_via_model(prompt, client, spec).await,
        None => None,
    };

    let keyword_result = fuse(phase_a, phase_b).unwrap_or((Complexity::Medium, Size::Medium));
    let workspace_size = size_from_file_count(count_workspace_files(workspace_root));

    (keyword_result.0, keyword_result.1.max(workspace_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_defaults_to_medium_medium() {
        assert_eq!(classify_keywords(""), None);
    }

    #[test]
    fn heavy_app_clone_promotes_complexity() {
        let (c, s) = classify_keywords("build a tinder for linkedin").unwrap();
        assert_eq!(c, Complexity::Heavy);
        assert_eq!(s, Size::Large);
    }

    #[test]
    fn simple_signal_without_heavy_or_medium() {
        let (c, s) = classify_keywords("make a simple todo app").unwrap();
        // "todo" is both a SIMPLE signal; no HEAVY/MEDIUM signals present.
        assert_eq!(c, Complexity::Simple);
        assert_eq!(s, Size::Small);
    }

    #[test]
    fn heavy_beats_simple_when_both_present() {
        let (c, _) = classify_keywords("build a simple marketplace").unwrap();
        assert_eq!(c, Complexity::Heavy);
    }

    #[test]
    fn file_count_buckets() {
        assert_eq!(size_from_file_count(0), Size::Small);
        assert_eq!(size_from_file_count(3), Size::Small);
        assert_eq!(size_from_file_count(4), Size::Medium);
        assert_eq!(size_from_file_count(10), Size::Medium);
        assert_eq!(size_from_file_count(11), Size::Large);
    }

    #[test]
    fn fuse_takes_higher_per_axis() {
        let a = Some((Complexity::Simple, Size::Large));
        let b = Some((Complexity::Heavy, Size::Small));
        assert_eq!(fuse(a, b), Some((Complexity::Heavy, Size::Large)));
    }

    #[test]
    fn parse_label_roundtrip() {
        assert_eq!(parse_label("heavy/large"), Some((Complexity::Heavy, Size::Large)));
        assert_eq!(parse_label("nonsense"), None);
    }

    #[tokio::test]
    async fn default_with_no_signals_and_no_model_is_medium_medium() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s) = classify("", tmp.path(), None).await;
        assert_eq!(c, Complexity::Medium);
        assert_eq!(s, Size::Medium);
    }

    #[tokio::test]
    async fn large_workspace_promotes_size_even_with_simple_prompt() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..12 {
            std::fs::write(tmp.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let (_, s) = classify("a simple todo", tmp.path(), None).await;
        assert_eq!(s, Size::Large);
    }
}
