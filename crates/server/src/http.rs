//! HTTP surface: the six endpoints spec.md §6 names, composed into one
//! `axum::Router`. Grounded on the teacher's `http::create_router` (CORS +
//! trace + compression layering, config read via a scoped lock release
//! before building the router).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use orchestrator_config::load_mode_config;
use orchestrator_core::{Mode, Query as InboundQuery, VoteOutcome};
use orchestrator_engine::{predict, SchedulePlan};

use crate::metrics::{record_heavy_gate, record_route, record_vote};
use crate::state::AppState;
use crate::ServerError;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/route", get(route_query))
        .route("/vote", post(vote))
        .route("/schedule/predict", get(schedule_predict))
        .route("/models/swap", post(models_swap))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn mode_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Precision => "precision",
        Mode::Interactive => "interactive",
    }
}

#[derive(Debug, Serialize)]
struct DepsStatus {
    meili: &'static str,
    qdrant: &'static str,
    llm: &'static str,
    cache: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    deps: DepsStatus,
    suggested_mode: &'static str,
}

async fn ping(url: &str) -> bool {
    let fut = reqwest::get(url);
    matches!(
        tokio::time::timeout(std::time::Duration::from_secs(1), fut).await,
        Ok(Ok(resp)) if resp.status().is_success() || resp.status().as_u16() == 404
    )
}

/// `GET /health` → `{status, deps, suggested_mode}` (spec.md §6). Every
/// backend is a best-effort reachability probe — an unreachable search
/// backend degrades the response, never fails the request.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (lexical_endpoint, semantic_endpoint) = {
        let settings = state.settings.read();
        (settings.rag.lexical_endpoint.clone(), settings.rag.semantic_endpoint.clone())
    };

    let llm_ok = state.llm.health_check().await;
    let meili_ok = ping(&lexical_endpoint).await;
    let qdrant_ok = ping(&semantic_endpoint).await;
    let gate_metrics = state.gate.metrics();
    record_heavy_gate(gate_metrics.in_use, gate_metrics.waiters);

    let status = if llm_ok { "healthy" } else { "degraded" };
    let suggested_mode = if llm_ok && gate_metrics.in_use == 0 { "precision" } else { "interactive" };

    Json(HealthResponse {
        status,
        deps: DepsStatus {
            meili: if meili_ok { "ok" } else { "unreachable" },
            qdrant: if qdrant_ok { "ok" } else { "unreachable" },
            llm: if llm_ok { "ok" } else { "unreachable" },
            cache: "ok",
        },
        suggested_mode,
    })
}

#[derive(Debug, Deserialize)]
struct RouteParams {
    q: String,
    #[serde(default = "default_k")]
    k: usize,
    /// `two_expert` selects the adaptive lexical/semantic-only variant
    /// (spec.md §4.6) instead of the default classification-driven route.
    #[serde(default)]
    variant: Option<String>,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
struct RouteHttpResponse {
    answer: String,
    sources: Vec<orchestrator_core::FusedDocument>,
    experts_used: Vec<String>,
    query_type: orchestrator_core::QueryClass,
    fusion_method: String,
    fusion_weights: std::collections::HashMap<String, f32>,
    cache_hit: bool,
}

/// `GET /route?q=<string>&k=<int>` → MoME response (spec.md §4.6), served
/// through the shared Semantic Cache first (spec.md §2's route data flow).
async fn route_query(State(state): State<AppState>, Query(params): Query<RouteParams>) -> Json<RouteHttpResponse> {
    if let Some(hit) = state.route_cache.semantic_get(&params.q).await {
        let query_type = orchestrator_engine::classify(&params.q);
        record_route(&query_type.to_string(), true);
        return Json(RouteHttpResponse {
            answer: hit.answer,
            sources: hit.sources,
            experts_used: Vec::new(),
            query_type,
            fusion_method: "cache".to_string(),
            fusion_weights: std::collections::HashMap::new(),
            cache_hit: true,
        });
    }

    let resp = if params.variant.as_deref() == Some("two_expert") {
        state.mome.route_two_expert(&InboundQuery::new(params.q.clone()), params.k).await
    } else {
        state.mome.route(&params.q, params.k).await
    };
    state.route_cache.semantic_set(&params.q, &resp.answer, &resp.sources).await;
    record_route(&resp.query_type.to_string(), false);

    Json(RouteHttpResponse {
        answer: resp.answer,
        sources: resp.sources,
        experts_used: resp.experts_used,
        query_type: resp.query_type,
        fusion_method: resp.fusion_method,
        fusion_weights: resp.fusion_weights,
        cache_hit: false,
    })
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    prompt: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    mode: Option<Mode>,
}

/// `POST /vote` body `{prompt, context?, mode?}` → VoteOutcome (spec.md
/// §4.7). Configuration errors (missing/malformed mode config) are the only
/// failure class surfaced as a 4xx; everything else the Consensus Engine
/// itself already absorbs into the outcome.
async fn vote(State(state): State<AppState>, Json(req): Json<VoteRequest>) -> Result<Json<VoteOutcome>, ServerError> {
    let mode = req.mode.unwrap_or(Mode::Interactive);
    let context = req.context.unwrap_or_default();

    let mode_cfg = load_mode_config(&state.consensus_config_path, mode_name(mode))
        .map_err(|e| ServerError::Config(e.to_string()))?;

    let outcome = state
        .consensus
        .vote(&req.prompt, &context, mode, &state.consensus_config_path, &mode_cfg)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    record_vote(mode_name(mode), mode_name_for_status(&outcome), outcome.elapsed_s, outcome.cache_hit);
    Ok(Json(outcome))
}

fn mode_name_for_status(outcome: &VoteOutcome) -> &'static str {
    match outcome.status {
        orchestrator_core::VoteStatus::Ok => "ok",
        orchestrator_core::VoteStatus::Timeout => "timeout",
    }
}

/// `GET /schedule/predict` → predictive plan (spec.md §4.9), evaluated at
/// the current local hour.
async fn schedule_predict() -> Json<SchedulePlan> {
    use chrono::Timelike;
    let hour = chrono::Local::now().hour();
    Json(predict(hour))
}

#[derive(Debug, Deserialize)]
struct SwapRequest {
    prewarm: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SwapResponse {
    ok: bool,
    models: Vec<String>,
}

/// `POST /models/swap` body `{prewarm: [model-id]}` → `{ok, models}`
/// (spec.md §6): best-effort warm-up, never fails the request.
async fn models_swap(State(state): State<AppState>, Json(req): Json<SwapRequest>) -> Json<SwapResponse> {
    state.llm.prewarm(&req.prewarm).await;
    Json(SwapResponse { ok: true, models: req.prewarm })
}

/// `GET /metrics` → process metrics in Prometheus text-exposition format
/// (spec.md §6).
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics_handle.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use orchestrator_config::Settings;
    use orchestrator_core::traits::GenerateOptions;
    use orchestrator_core::{CacheBackend, LanguageModel};
    use orchestrator_engine::{ConsensusEngine, ContextBuilder, MomeRouter};
    use orchestrator_llm::HeavyGate;
    use orchestrator_rag::{GraphExpert, HashingEmbedder, InMemoryCacheBackend, SemanticCache};

    struct NoopLlm;

    #[async_trait]
    impl LanguageModel for NoopLlm {
        async fn generate(
            &self,
            model_id: &str,
            _prompt: &str,
            _options: GenerateOptions,
            _timeout_s: f32,
        ) -> Result<String, orchestrator_core::Error> {
            Ok(format!("answer from {model_id}"))
        }
        async fn prewarm(&self, _model_ids: &[String]) {}
        async fn health_check(&self) -> bool {
            true
        }
    }

    fn test_state() -> AppState {
        let llm: Arc<dyn LanguageModel> = Arc::new(NoopLlm);
        let gate = Arc::new(HeavyGate::new(1, vec!["32b".to_string()]));
        let cache_backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::new());
        let embedder = Arc::new(HashingEmbedder::new(64));
        let route_cache = Arc::new(SemanticCache::new(cache_backend.clone(), embedder, 3600, 0.93, 200));
        let ctx = Arc::new(ContextBuilder::new("config/glossary.yaml".to_string()));
        let consensus = Arc::new(ConsensusEngine::new(llm.clone(), gate.clone(), cache_backend, ctx, vec![], 3600));
        let mome = Arc::new(MomeRouter::new(vec![Arc::new(GraphExpert)], 60.0, 5));

        AppState {
            settings: Arc::new(parking_lot::RwLock::new(Settings::default())),
            consensus,
            mome,
            route_cache,
            llm,
            gate,
            consensus_config_path: "config/consensus_models.yaml".to_string(),
            metrics_handle: crate::metrics::init_metrics(),
        }
    }

    #[tokio::test]
    async fn router_builds_and_health_responds() {
        let state = test_state();
        let _ = create_router(state);
    }

    #[tokio::test]
    async fn route_handler_returns_empty_sources_for_graph_only_experts() {
        let state = test_state();
        let resp = route_query(
            State(state),
            Query(RouteParams { q: "bonjour".to_string(), k: 5, variant: None }),
        )
        .await;
        assert!(resp.sources.is_empty());
        assert!(!resp.cache_hit);
    }

    #[tokio::test]
    async fn route_handler_two_expert_variant_skips_graph_only_experts() {
        let state = test_state();
        let resp = route_query(
            State(state),
            Query(RouteParams { q: "or".to_string(), k: 5, variant: Some("two_expert".to_string()) }),
        )
        .await;
        assert_eq!(resp.fusion_method, "rrf_adaptive_two_expert");
        assert!(resp.experts_used.is_empty());
        assert!(resp.sources.is_empty());
    }
}
