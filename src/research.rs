//! Opaque "research" provider: web-search enrichment is an external
//! collaborator out of scope for the core, modeled here as a trait so
//! Fix Engine strategy E is fully exercised in tests without a real
//! web-search integration.

use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone)]
pub struct ResearchQuery {
    pub error_pattern: String,
    pub context: String,
}

#[derive(Debug, Clone, Default)]
pub struct ResearchResult {
    pub guidance: Vec<String>,
}

pub trait ResearchProvider: Send + Sync {
    fn research<'a>(&'a self, query: ResearchQuery) -> Pin<Box<dyn Future<Output = ResearchResult> + Send + 'a>>;
}

/// Default provider: returns empty results deterministically, mirroring
/// the embedding layer's "absent embeddings" contract — no fallback
/// guidance is fabricated when research isn't wired up.
pub struct NullResearchProvider;

impl ResearchProvider for NullResearchProvider {
    fn research<'a>(&'a self, _query: ResearchQuery) -> Pin<Box<dyn Future<Output = ResearchResult> + Send + 'a>> {
        Box::pin(async { ResearchResult::default() })
    }
}

/// Classifies a verifier error excerpt into a short pattern tag, used to
/// build the [`ResearchQuery`] for the research-backed fix strategy.
pub fn classify_error_pattern(verifier_excerpt: &str) -> String {
    let lower = verifier_excerpt.to_lowercase();
    if lower.contains("importerror") || lower.contains("modulenotfounderror") || lower.contains("cannot find module") {
        "missing_dependency".to_string()
    } else if lower.contains("syntaxerror") || lower.contains("unexpected token") {
        "syntax_error".to_string()
    } else if lower.contains("typeerror") || lower.contains("mismatched types") {
        "type_error".to_string()
    } else {
        "unknown".to_string()
    }
}
