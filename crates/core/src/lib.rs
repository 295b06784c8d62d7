//! Core traits and types for the retrieval-augmented LLM orchestrator.
//!
//! Two request types are served on top of these types: a consensus vote
//! (`vote::VoteOutcome`) and a retrieval route (`document::FusedDocument`).
//! Both share the cache types in `cache` and the pluggable backends in
//! `traits`.

pub mod cache;
pub mod document;
pub mod query;
pub mod traits;
pub mod vote;

pub use cache::CacheEntry;
pub use document::{Document, ExpertBucket, FusedDocument, FusionWeights, QueryClass};
pub use query::{Heuristics, Mode, Query};
pub use traits::{CacheBackend, Embedder, LanguageModel, RetrievalExpert};
pub use vote::{CommitteeMember, ModeConfig, Vote, VoteOutcome, VoteStatus};

use thiserror::Error;

/// Error type every crate in the workspace ultimately converges on at its
/// outer boundary. Internal crates keep their own `thiserror` enum and
/// convert into this one only where they cross into shared code.
#[derive(Error, Debug)]
pub enum Error {
    #[error("llm error: {0}")]
    Llm(String),

    #[error("rag error: {0}")]
    Rag(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("engine error: {0}")]
    Engine(String),
}
