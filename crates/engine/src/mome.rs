//! MoME Router (spec.md §4.6): query classification, fixed weight table,
//! adaptive override, parallel expert dispatch, fusion invocation and
//! deterministic answer framing.
//!
//! Grounded on `original_source/core/mome_router.py`'s `run_mome`
//! end-to-end shape (classify → per-expert weight-gated dispatch →
//! `_reciprocal_rank_fusion` → `_generate_answer`), reimplemented with
//! typed `QueryClass`/`FusionWeights` and `futures::future::join_all`
//! fan-out instead of the source's sequential `httpx.Client` calls.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use orchestrator_core::{Embedder, ExpertBucket, FusedDocument, FusionWeights, Heuristics, Query, QueryClass, RetrievalExpert};
use orchestrator_rag::{dedup, mmr_select, weighted_rrf};

/// Fixed per-class weight table (spec.md §4.6).
fn weight_table(class: QueryClass) -> FusionWeights {
    match class {
        QueryClass::Factual => FusionWeights { lexical: 0.4, semantic: 0.3, temporal: 0.2, graph: 0.1 },
        QueryClass::Conceptual => FusionWeights { lexical: 0.2, semantic: 0.5, temporal: 0.15, graph: 0.15 },
        QueryClass::Recent => FusionWeights { lexical: 0.25, semantic: 0.2, temporal: 0.5, graph: 0.05 },
        QueryClass::Default => FusionWeights { lexical: 0.35, semantic: 0.35, temporal: 0.2, graph: 0.1 },
    }
}

/// Deterministic keyword classification on lowercased query text
/// (spec.md §4.6).
pub fn classify(query: &str) -> QueryClass {
    let q = query.to_lowercase();

    const RECENT: [&str; 5] = ["récent", "dernier", "nouveau", "aujourd'hui", "2025"];
    const RECENT_EXTRA_YEARS: [&str; 1] = ["2024"];
    if RECENT.iter().any(|kw| q.contains(kw)) || RECENT_EXTRA_YEARS.iter().any(|kw| q.contains(kw)) {
        return QueryClass::Recent;
    }

    const FACTUAL: [&str; 5] = ["qui est", "qu'est-ce", "définition", "combien", "quand"];
    if FACTUAL.iter().any(|kw| q.contains(kw)) {
        return QueryClass::Factual;
    }

    const CONCEPTUAL: [&str; 4] = ["pourquoi", "comment", "expliquer", "concept"];
    const CONCEPTUAL_EXTRA: [&str; 1] = ["principe"];
    if CONCEPTUAL.iter().any(|kw| q.contains(kw)) || CONCEPTUAL_EXTRA.iter().any(|kw| q.contains(kw)) {
        return QueryClass::Conceptual;
    }

    QueryClass::Default
}

/// Adaptive override for the two-expert (lexical/semantic) variant
/// (spec.md §4.6): very short queries favor lexical, longer ones favor
/// semantic. Used by [`MomeRouter::route_two_expert`].
pub fn adaptive_two_expert_weights(query: &Query, heuristics: &Heuristics) -> (f32, f32) {
    let is_short = query.char_len() <= heuristics.short_query_chars || query.token_len() <= heuristics.short_query_tokens;
    if is_short {
        (heuristics.boost_lexical_on_short, 1.0 - heuristics.boost_lexical_on_short)
    } else {
        (1.0 - heuristics.boost_semantic_on_long, heuristics.boost_semantic_on_long)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub answer: String,
    pub sources: Vec<FusedDocument>,
    pub experts_used: Vec<String>,
    pub query_type: QueryClass,
    pub fusion_method: String,
    pub fusion_weights: HashMap<String, f32>,
}

pub struct MomeRouter {
    experts: Vec<Arc<dyn RetrievalExpert>>,
    rrf_k: f32,
    top_k: usize,
    mmr: Option<MmrConfig>,
    heuristics: Heuristics,
}

struct MmrConfig {
    embedder: Arc<dyn Embedder>,
    lambda: f32,
}

impl MomeRouter {
    pub fn new(experts: Vec<Arc<dyn RetrievalExpert>>, rrf_k: f32, top_k: usize) -> Self {
        Self { experts, rrf_k, top_k, mmr: None, heuristics: Heuristics::default() }
    }

    /// Enables the optional MMR diversification pass (spec.md §4.4):
    /// the fused candidate pool is re-ranked with `embedder`-derived
    /// vectors instead of taking the raw RRF order.
    pub fn with_mmr(mut self, embedder: Arc<dyn Embedder>, lambda: f32) -> Self {
        self.mmr = Some(MmrConfig { embedder, lambda });
        self
    }

    /// Overrides the short/long-query thresholds [`route_two_expert`]
    /// reads its adaptive weights from.
    ///
    /// [`route_two_expert`]: MomeRouter::route_two_expert
    pub fn with_heuristics(mut self, heuristics: Heuristics) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// `route(query, k)`: classify, dispatch every expert whose weight > 0
    /// in parallel, fuse, keep top-K, frame a deterministic answer
    /// (spec.md §4.6).
    pub async fn route(&self, query: &str, k: usize) -> RouteResponse {
        let class = classify(query);
        let weights = weight_table(class);

        let active: Vec<&Arc<dyn RetrievalExpert>> = self
            .experts
            .iter()
            .filter(|e| weights.get(e.expert_tag()) > 0.0)
            .collect();

        let futures = active.iter().map(|expert| {
            let expert = Arc::clone(expert);
            let query = query.to_string();
            async move {
                let bucket: ExpertBucket = expert.search(&query, k).await;
                (expert.expert_tag().to_string(), bucket)
            }
        });

        let results = futures::future::join_all(futures).await;
        let experts_used: Vec<String> = results.iter().map(|(tag, _)| tag.clone()).collect();
        let buckets: HashMap<String, ExpertBucket> = results.into_iter().collect();

        let fused = dedup(weighted_rrf(&buckets, &weights, self.rrf_k));
        let top_k = self.select_top_k(fused, self.top_k.min(k));
        let answer = frame_answer(query, &top_k);

        RouteResponse {
            answer,
            sources: top_k,
            experts_used,
            query_type: class,
            fusion_method: "rrf_adaptive".to_string(),
            fusion_weights: weights.as_map(),
        }
    }

    /// Two-expert adaptive variant (spec.md §4.6 "Adaptive override"):
    /// dispatches only the lexical and semantic experts (if present),
    /// weighting them by query length/token-count via
    /// [`adaptive_two_expert_weights`] instead of the fixed four-expert
    /// class table [`route`] uses.
    ///
    /// [`route`]: MomeRouter::route
    pub async fn route_two_expert(&self, query: &Query, k: usize) -> RouteResponse {
        let (lexical, semantic) = adaptive_two_expert_weights(query, &self.heuristics);
        let weights = FusionWeights { lexical, semantic, temporal: 0.0, graph: 0.0 };

        let active: Vec<&Arc<dyn RetrievalExpert>> = self
            .experts
            .iter()
            .filter(|e| matches!(e.expert_tag(), "lexical" | "semantic"))
            .collect();

        let futures = active.iter().map(|expert| {
            let expert = Arc::clone(expert);
            let text = query.prompt.clone();
            async move {
                let bucket: ExpertBucket = expert.search(&text, k).await;
                (expert.expert_tag().to_string(), bucket)
            }
        });

        let results = futures::future::join_all(futures).await;
        let experts_used: Vec<String> = results.iter().map(|(tag, _)| tag.clone()).collect();
        let buckets: HashMap<String, ExpertBucket> = results.into_iter().collect();

        let fused = dedup(weighted_rrf(&buckets, &weights, self.rrf_k));
        let top_k = self.select_top_k(fused, self.top_k.min(k));
        let answer = frame_answer(&query.prompt, &top_k);

        RouteResponse {
            answer,
            sources: top_k,
            experts_used,
            query_type: QueryClass::Default,
            fusion_method: "rrf_adaptive_two_expert".to_string(),
            fusion_weights: weights.as_map(),
        }
    }

    /// Applies the optional MMR diversification pass, falling back to
    /// plain RRF order if an embedding fails, then truncates to `keep`.
    fn select_top_k(&self, fused: Vec<FusedDocument>, keep: usize) -> Vec<FusedDocument> {
        match &self.mmr {
            Some(mmr) => {
                let embeddings: Vec<Vec<f32>> = fused
                    .iter()
                    .map(|d| mmr.embedder.embed(&d.document.text).unwrap_or_default())
                    .collect();
                if embeddings.iter().any(Vec::is_empty) {
                    // An embedding failure degrades to plain RRF order
                    // rather than panicking on a length mismatch.
                    fused.into_iter().take(keep).collect()
                } else {
                    mmr_select(&fused, &embeddings, keep, mmr.lambda)
                }
            }
            None => fused.into_iter().take(keep).collect(),
        }
    }
}

/// Deterministic framing string quoting the top-3 sources, each trimmed to
/// ~200 chars (spec.md §4.6). A placeholder until a live LLM is wired into
/// the retrieval route — required for testability per spec.md.
fn frame_answer(query: &str, sources: &[FusedDocument]) -> String {
    let quoted: Vec<String> = sources
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, doc)| {
            let text = &doc.document.text;
            let trimmed: String = text.chars().take(200).collect();
            format!("[{}] {}", i + 1, trimmed)
        })
        .collect();

    format!(
        "Based on the available sources, here is an answer for '{}':\n\n{}",
        query,
        quoted.join("\n\n")
    )
}
