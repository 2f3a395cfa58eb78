//! Optional file-embedding memory layer.
//!
//! Present only when an embedding-capable model is registered; otherwise
//! the retrieval API returns empty results deterministically — no
//! bag-of-tokens fallback vector is invented for the no-embeddings case.
//! Absence of embeddings must not change any other observable behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEmbedding {
    pub path: PathBuf,
    pub content_hash: u64,
    pub vector: Vec<f32>,
}

/// A provider that turns file content into an embedding vector. Only a real
/// embedding model implements this in production; tests may use a
/// deterministic stub.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, content: &str) -> Vec<f32>;
}

fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// The embedding index. `provider` is `None` when no embedding-capable
/// model is available — the whole index then behaves as permanently empty.
#[derive(Default)]
pub struct EmbeddingIndex {
    entries: HashMap<PathBuf, FileEmbedding>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-indexes `path` if the content hash changed: a file hash change
    /// invalidates the associated embedding.
    pub fn update(&mut self, provider: &dyn EmbeddingProvider, path: &Path, content: &str) {
        let hash = content_hash(content);
        if let Some(existing) = self.entries.get(path) {
            if existing.content_hash == hash {
                return;
            }
        }
        let vector = provider.embed(content);
        self.entries.insert(
            path.to_path_buf(),
            FileEmbedding { path: path.to_path_buf(), content_hash: hash, vector },
        );
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries, for session persistence.
    pub fn snapshot(&self) -> Vec<FileEmbedding> {
        self.entries.values().cloned().collect()
    }

    /// Rebuilds an index from a persisted snapshot.
    pub fn from_snapshot(entries: Vec<FileEmbedding>) -> Self {
        Self { entries: entries.into_iter().map(|e| (e.path.clone(), e)).collect() }
    }

    /// Top-k semantically related files by cosine similarity. Returns an
    /// empty vec deterministically when no provider has ever populated the
    /// index.
    pub fn top_k(&self, query_vector: &[f32], k: usize) -> Vec<PathBuf> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(f32, &PathBuf)> = self
            .entries
            .values()
            .map(|e| (cosine_similarity(query_vector, &e.vector), &e.path))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, p)| p.clone()).collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
