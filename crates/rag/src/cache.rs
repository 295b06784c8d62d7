//! Two-level Semantic Cache: exact-key caching for votes, semantic-key
//! (embedding cosine) caching for retrieval (spec.md §4.3).
//!
//! Grounded on `original_source/apps/orchestrator/cache_semantic.py`'s
//! `get_from_cache`/`set_in_cache` (cosine scan over `MAX_SCAN` entries,
//! `sha256`-prefixed key, threshold-gated hit) for the semantic-key
//! semantics, with the backing store generalized to the
//! `orchestrator_core::CacheBackend` trait seam instead of a hardcoded
//! Redis client. The in-process implementation uses `dashmap`, the
//! teacher's default choice for a concurrent map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use orchestrator_core::{CacheBackend, CacheEntry, Embedder, FusedDocument};

use crate::embedder::cosine;

struct Slot {
    value: String,
    expires_at: Instant,
}

/// Default in-process `CacheBackend`: a `DashMap` with stored expiry
/// instants. Passive eviction only (spec.md §3's "eviction is passive
/// expiry"); a lazily-swept map is an acceptable MVP store, matching the
/// scope spec.md §1 draws around "the search backends themselves."
#[derive(Default)]
pub struct InMemoryCacheBackend {
    store: DashMap<String, Slot>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Option<String> {
        let slot = self.store.get(key)?;
        if slot.expires_at < Instant::now() {
            drop(slot);
            self.store.remove(key);
            return None;
        }
        Some(slot.value.clone())
    }

    async fn setex(&self, key: &str, ttl_s: u64, value: String) {
        self.store.insert(
            key.to_string(),
            Slot { value, expires_at: Instant::now() + Duration::from_secs(ttl_s) },
        );
    }

    async fn scan_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        let now = Instant::now();
        self.store
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().expires_at >= now)
            .take(limit)
            .map(|e| e.value().value.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SemanticRecord {
    query_text: String,
    embedding: Vec<f32>,
    answer: String,
    #[serde(default)]
    sources: Vec<FusedDocument>,
    stored_at: chrono::DateTime<chrono::Utc>,
}

pub struct SemanticHit {
    pub answer: String,
    pub sources: Vec<FusedDocument>,
    pub cosine: f32,
}

/// Semantic Cache facade over a `CacheBackend` + `Embedder` pair. Every
/// public operation degrades to a miss/no-op on any internal failure —
/// caching is a performance optimization, never a correctness requirement
/// (spec.md §4.3 invariant).
pub struct SemanticCache {
    backend: Arc<dyn CacheBackend>,
    embedder: Arc<dyn Embedder>,
    ttl_s: u64,
    threshold: f32,
    max_scan: usize,
}

const EXACT_PREFIX: &str = "exact";
const SEMANTIC_PREFIX: &str = "semantic";

impl SemanticCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        embedder: Arc<dyn Embedder>,
        ttl_s: u64,
        threshold: f32,
        max_scan: usize,
    ) -> Self {
        Self { backend, embedder, ttl_s, threshold, max_scan }
    }

    /// Exact-key lookup for vote caching (spec.md §4.3): `key` is the
    /// caller-computed hash over `{prompt, context, mode, config-fingerprint}`.
    pub async fn exact_get(&self, key: &str) -> Option<CacheEntry> {
        let raw = self.backend.get(&format!("{EXACT_PREFIX}:{key}")).await?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn exact_set(&self, key: &str, value: &CacheEntry, ttl_s: u64) {
        if let Ok(raw) = serde_json::to_string(value) {
            self.backend.setex(&format!("{EXACT_PREFIX}:{key}"), ttl_s, raw).await;
        }
    }

    /// Semantic-key lookup: embed `query_text`, scan at most `max_scan`
    /// stored entries, return the best cosine match if it clears
    /// `threshold`. Any failure is a miss, never an error (spec.md §4.3).
    pub async fn semantic_get(&self, query_text: &str) -> Option<SemanticHit> {
        let query_vec = self.embedder.embed(query_text).ok()?;

        let raw_entries = self
            .backend
            .scan_prefix(&format!("{SEMANTIC_PREFIX}:"), self.max_scan)
            .await;

        let mut best: Option<(f32, SemanticRecord)> = None;
        for raw in raw_entries {
            let Ok(rec) = serde_json::from_str::<SemanticRecord>(&raw) else { continue };
            let sim = cosine(&query_vec, &rec.embedding);
            if best.as_ref().map(|(s, _)| sim > *s).unwrap_or(true) {
                best = Some((sim, rec));
            }
        }

        match best {
            Some((sim, rec)) if sim >= self.threshold => {
                Some(SemanticHit { answer: rec.answer, sources: rec.sources, cosine: sim })
            }
            _ => None,
        }
    }

    /// Store under a key derived from a prefix of `sha256(query_text)`
    /// (spec.md §4.3).
    pub async fn semantic_set(&self, query_text: &str, answer: &str, sources: &[FusedDocument]) {
        let Ok(embedding) = self.embedder.embed(query_text) else { return };
        let rec = SemanticRecord {
            query_text: query_text.to_string(),
            embedding,
            answer: answer.to_string(),
            sources: sources.to_vec(),
            stored_at: chrono::Utc::now(),
        };
        let Ok(raw) = serde_json::to_string(&rec) else { return };

        let mut hasher = Sha256::new();
        hasher.update(query_text.as_bytes());
        let digest = hasher.finalize();
        let key_suffix = hex_prefix(&digest, 16);

        self.backend
            .setex(&format!("{SEMANTIC_PREFIX}:{key_suffix}"), self.ttl_s, raw)
            .await;
    }
}

fn hex_prefix(bytes: &[u8], n_hex_chars: usize) -> String {
    let mut s = String::with_capacity(n_hex_chars);
    for b in bytes {
        use std::fmt::Write;
        write!(s, "{:02x}", b).ok();
        if s.len() >= n_hex_chars {
            break;
        }
    }
    s.truncate(n_hex_chars);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn cache() -> SemanticCache {
        SemanticCache::new(
            Arc::new(InMemoryCacheBackend::new()),
            Arc::new(HashingEmbedder::new(64)),
            3600,
            0.93,
            200,
        )
    }

    #[tokio::test]
    async fn exact_roundtrip() {
        let c = cache();
        let entry = CacheEntry {
            query_text: "q".into(),
            embedding: vec![],
            answer: "a".into(),
            sources: vec![],
            stored_at: chrono::Utc::now(),
        };
        c.exact_set("k1", &entry, 60).await;
        let got = c.exact_get("k1").await.unwrap();
        assert_eq!(got.answer, "a");
    }

    #[tokio::test]
    async fn exact_miss_on_unknown_key() {
        let c = cache();
        assert!(c.exact_get("nope").await.is_none());
    }

    #[tokio::test]
    async fn semantic_get_after_set_hits_with_self_similarity_one() {
        let c = cache();
        c.semantic_set("quelle est la capitale de la France", "Paris", &[]).await;
        let hit = c.semantic_get("quelle est la capitale de la France").await.unwrap();
        assert_eq!(hit.answer, "Paris");
        assert!((hit.cosine - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn semantic_get_misses_below_threshold() {
        let c = cache();
        c.semantic_set("quelle est la capitale de la France", "Paris", &[]).await;
        let hit = c.semantic_get("complètement autre chose sans rapport").await;
        assert!(hit.is_none());
    }
}
