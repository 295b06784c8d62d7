//! Fusion Kernel, Retrieval Experts and Semantic Cache (spec.md §4.3–§4.5).
//!
//! - [`fusion`]: score normalization, weighted reciprocal-rank-fusion,
//!   dedup and MMR diversification.
//! - [`experts`]: the four `RetrievalExpert` implementations
//!   (lexical/semantic/temporal/graph).
//! - [`embedder`]: the fixed-dimension sentence embedder shared by the
//!   semantic cache and the semantic expert.
//! - [`cache`]: the two-level Semantic Cache (exact-key + semantic-key).

pub mod cache;
pub mod embedder;
pub mod experts;
pub mod fusion;

pub use cache::{InMemoryCacheBackend, SemanticCache};
pub use embedder::HashingEmbedder;
pub use experts::{GraphExpert, LexicalExpert, SemanticExpert, TemporalExpert};
pub use fusion::{dedup, mmr_select, normalize_scores, weighted_rrf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<RagError> for orchestrator_core::Error {
    fn from(err: RagError) -> Self {
        orchestrator_core::Error::Rag(err.to_string())
    }
}
