//! The four `RetrievalExpert` implementations (spec.md §4.5): lexical and
//! temporal against a Meilisearch-shaped `POST /indexes/<name>/search`
//! backend, semantic against a Qdrant-shaped
//! `POST /collections/<name>/points/search` backend, graph as a documented
//! Phase-2 stub. Grounded on `original_source/core/mome_router.py`'s
//! `_search_lexical`/`_search_temporal`/`_search_graph` (same backend
//! shapes, same "never propagate, return empty on failure" contract).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use orchestrator_core::{Document, RetrievalExpert};

/// Lexical expert: plain keyword search against the Meilisearch-shaped
/// index, best-first as returned by the backend.
pub struct LexicalExpert {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    timeout_s: f32,
}

impl LexicalExpert {
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>, timeout_s: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            index: index.into(),
            timeout_s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LexicalHit {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize)]
struct LexicalResponse {
    #[serde(default)]
    hits: Vec<LexicalHit>,
}

async fn search_index(
    client: &reqwest::Client,
    endpoint: &str,
    index: &str,
    query: &str,
    k: usize,
    sort_desc_time: bool,
    timeout_s: f32,
    expert_tag: &'static str,
) -> Vec<Document> {
    let mut body = json!({ "q": query, "limit": k });
    if sort_desc_time {
        body["sort"] = json!(["timestamp:desc"]);
    }

    let fut = client
        .post(format!("{endpoint}/indexes/{index}/search"))
        .json(&body)
        .send();

    let resp = match tokio::time::timeout(std::time::Duration::from_secs_f32(timeout_s), fut).await {
        Ok(Ok(r)) if r.status().is_success() => r,
        Ok(Ok(r)) => {
            tracing::debug!(expert_tag, status = %r.status(), "search backend returned error status");
            return Vec::new();
        }
        Ok(Err(e)) => {
            tracing::debug!(expert_tag, error = %e, "search backend request failed");
            return Vec::new();
        }
        Err(_) => {
            tracing::debug!(expert_tag, timeout_s, "search backend timed out");
            return Vec::new();
        }
    };

    let parsed: LexicalResponse = match resp.json().await {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(expert_tag, error = %e, "search backend returned unparseable body");
            return Vec::new();
        }
    };

    parsed
        .hits
        .into_iter()
        .enumerate()
        .map(|(i, hit)| {
            let doc_id = if hit.id.is_empty() { format!("{expert_tag}_{i}") } else { hit.id };
            let text = hit.content.or(hit.text).unwrap_or_default();
            Document {
                doc_id,
                text,
                source_uri: hit.source,
                score: 1.0 / (i as f32 + 1.0),
                expert_tag: expert_tag.to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl RetrievalExpert for LexicalExpert {
    fn expert_tag(&self) -> &'static str {
        "lexical"
    }

    async fn search(&self, query: &str, k: usize) -> Vec<Document> {
        search_index(
            &self.client,
            &self.endpoint,
            &self.index,
            query,
            k,
            false,
            self.timeout_s,
            "lexical",
        )
        .await
    }
}

/// Temporal expert: identical to the lexical expert except it asks the
/// backend for descending-time ordering (spec.md §4.5).
pub struct TemporalExpert {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    timeout_s: f32,
}

impl TemporalExpert {
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>, timeout_s: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            index: index.into(),
            timeout_s,
        }
    }
}

#[async_trait]
impl RetrievalExpert for TemporalExpert {
    fn expert_tag(&self) -> &'static str {
        "temporal"
    }

    async fn search(&self, query: &str, k: usize) -> Vec<Document> {
        search_index(
            &self.client,
            &self.endpoint,
            &self.index,
            query,
            k,
            true,
            self.timeout_s,
            "temporal",
        )
        .await
    }
}

/// Semantic expert: Qdrant-shaped vector search. Embeds the query with the
/// shared [`orchestrator_core::Embedder`] and posts the vector.
pub struct SemanticExpert {
    client: reqwest::Client,
    endpoint: String,
    collection: String,
    timeout_s: f32,
    embedder: std::sync::Arc<dyn orchestrator_core::Embedder>,
}

impl SemanticExpert {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        timeout_s: f32,
        embedder: std::sync::Arc<dyn orchestrator_core::Embedder>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            collection: collection.into(),
            timeout_s,
            embedder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VectorHit {
    id: serde_json::Value,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorResponse {
    #[serde(default)]
    result: Vec<VectorHit>,
}

#[async_trait]
impl RetrievalExpert for SemanticExpert {
    fn expert_tag(&self) -> &'static str {
        "semantic"
    }

    async fn search(&self, query: &str, k: usize) -> Vec<Document> {
        let vector = match self.embedder.embed(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "semantic expert embedding failed");
                return Vec::new();
            }
        };

        let body = json!({ "vector": vector, "limit": k, "with_payload": true });
        let fut = self
            .client
            .post(format!("{}/collections/{}/points/search", self.endpoint, self.collection))
            .json(&body)
            .send();

        let resp = match tokio::time::timeout(std::time::Duration::from_secs_f32(self.timeout_s), fut).await
        {
            Ok(Ok(r)) if r.status().is_success() => r,
            _ => return Vec::new(),
        };

        let parsed: VectorResponse = match resp.json().await {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };

        parsed
            .result
            .into_iter()
            .map(|hit| {
                let doc_id = match &hit.id {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let text = hit
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let source_uri = hit
                    .payload
                    .get("source")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                Document {
                    doc_id,
                    text,
                    source_uri,
                    score: hit.score,
                    expert_tag: "semantic".to_string(),
                }
            })
            .collect()
    }
}

/// Graph expert: documented Phase-2 stub. The source's `_search_graph` is
/// explicitly unimplemented and carried forward unchanged rather than
/// dropped (spec.md §4.5, SPEC_FULL.md §4.5).
pub struct GraphExpert;

#[async_trait]
impl RetrievalExpert for GraphExpert {
    fn expert_tag(&self) -> &'static str {
        "graph"
    }

    async fn search(&self, _query: &str, _k: usize) -> Vec<Document> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn graph_expert_always_returns_empty() {
        let e = GraphExpert;
        assert!(e.search("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn lexical_expert_returns_empty_on_unreachable_backend() {
        let e = LexicalExpert::new("http://127.0.0.1:1", "docs", 0.2);
        let results = e.search("test query", 5).await;
        assert!(results.is_empty());
    }
}
