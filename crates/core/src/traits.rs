//! Pluggable backend seams. Every component that talks to the outside world
//! (LLM serving, retrieval backends, the cache store, the embedder) sits
//! behind a trait so the Consensus Engine and MoME Router can be tested
//! against hand-written fakes instead of live services, and so the
//! composition root (`orchestrator-server::main`) is the only place a
//! concrete backend is named.

use async_trait::async_trait;

use crate::document::Document;

/// A single text-generation backend. Contract (spec.md §4.1): returns a
/// non-empty, trimmed string on success; errors are typed here and turned
/// into the `[ERROR ...]` / `[TIMEOUT_<s>s]` sentinel strings only at the
/// Consensus Engine boundary, not inside the adapter itself.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: GenerateOptions,
        timeout_s: f32,
    ) -> Result<String, crate::Error>;

    /// Best-effort warm-up: send a trivial request to each model id, ignore
    /// all failures. Used to pay model-load latency before the deadline
    /// clock starts.
    async fn prewarm(&self, model_ids: &[String]);

    async fn health_check(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.2,
            top_p: 0.9,
            repetition_penalty: 1.1,
        }
    }
}

/// A single retrieval source. Contract (spec.md §4.5): never propagates
/// errors — a failed search returns an empty vec, which is a first-class
/// value, not an error.
#[async_trait]
pub trait RetrievalExpert: Send + Sync {
    /// `lexical` | `semantic` | `temporal` | `graph`.
    fn expert_tag(&self) -> &'static str;

    async fn search(&self, query: &str, k: usize) -> Vec<Document>;
}

/// A fixed-dimension sentence embedder shared by the Semantic Cache and the
/// semantic retrieval expert.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, crate::Error>;

    fn dimension(&self) -> usize;
}

/// Key/value store backing the Semantic Cache: `get`, `setex`, prefix
/// `scan`. Redis-shaped per spec.md §6, but any store satisfying this
/// contract works.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn setex(&self, key: &str, ttl_s: u64, value: String);

    /// All non-expired values whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str, limit: usize) -> Vec<String>;
}
