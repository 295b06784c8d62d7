//! Shared semantic-cache entry shape. The storage mechanics (exact-key vs.
//! semantic-key lookup, TTL, eviction) live in `orchestrator-rag::cache`;
//! this is the value both lookup paths agree on.

use serde::{Deserialize, Serialize};

use crate::document::FusedDocument;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_text: String,
    pub embedding: Vec<f32>,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<FusedDocument>,
    pub stored_at: chrono::DateTime<chrono::Utc>,
}
