//! Composition root: load settings, init tracing and metrics, wire the
//! embedder/cache/LLM-adapter/retrieval-experts/heavy-gate into the
//! Consensus Engine and MoME Router, bind, serve with graceful shutdown.
//! Grounded on the teacher's `main.rs` composition-root shape.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use orchestrator_config::{load_settings, Settings};
use orchestrator_core::{CacheBackend, Embedder, LanguageModel, RetrievalExpert};
use orchestrator_engine::{ConsensusEngine, ContextBuilder, MomeRouter};
use orchestrator_llm::{HeavyGate, HttpLlmBackend, LlmBackendConfig};
use orchestrator_rag::{
    GraphExpert, HashingEmbedder, InMemoryCacheBackend, LexicalExpert, SemanticCache, SemanticExpert,
    TemporalExpert,
};
use orchestrator_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("ORCHESTRATOR_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("Loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting orchestrator server");
    tracing::info!(environment = ?settings.environment, "Configuration loaded");

    let metrics_handle = init_metrics();
    tracing::info!("Initialized Prometheus metrics at /metrics");

    let llm: Arc<dyn LanguageModel> = Arc::new(HttpLlmBackend::new(LlmBackendConfig {
        endpoint: settings.llm_endpoint.clone(),
        ..LlmBackendConfig::default()
    }));

    let gate = Arc::new(HeavyGate::new(settings.heavy_gate.max_heavy, settings.heavy_gate.heavy_hints.clone()));

    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(settings.rag.embedding_dim));
    let cache_backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCacheBackend::new());

    let route_cache = Arc::new(SemanticCache::new(
        cache_backend.clone(),
        embedder.clone(),
        settings.cache.ttl_s,
        settings.cache.similarity_threshold,
        settings.cache.max_scan,
    ));

    let experts: Vec<Arc<dyn RetrievalExpert>> = vec![
        Arc::new(LexicalExpert::new(
            settings.rag.lexical_endpoint.clone(),
            settings.rag.lexical_index.clone(),
            settings.rag.expert_timeout_s,
        )),
        Arc::new(SemanticExpert::new(
            settings.rag.semantic_endpoint.clone(),
            settings.rag.semantic_collection.clone(),
            settings.rag.expert_timeout_s,
            embedder.clone(),
        )),
        Arc::new(TemporalExpert::new(
            settings.rag.lexical_endpoint.clone(),
            settings.rag.lexical_index.clone(),
            settings.rag.expert_timeout_s,
        )),
        Arc::new(GraphExpert),
    ];

    let mut mome_router = MomeRouter::new(experts, settings.rag.rrf_k, settings.rag.final_top_k);
    if settings.rag.mmr_enabled {
        mome_router = mome_router.with_mmr(embedder.clone(), settings.rag.mmr_lambda);
    }
    let mome = Arc::new(mome_router);

    let context_builder = Arc::new(ContextBuilder::new(settings.glossary_path.clone()));
    let consensus = Arc::new(ConsensusEngine::new(
        llm.clone(),
        gate.clone(),
        cache_backend,
        context_builder,
        Vec::new(),
        settings.cache.ttl_s,
    ));

    let consensus_config_path = settings.consensus_config_path.clone();
    let server_config = settings.server.clone();

    let state = AppState {
        settings: Arc::new(parking_lot::RwLock::new(settings)),
        consensus,
        mome,
        route_cache,
        llm,
        gate,
        consensus_config_path,
        metrics_handle,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracing(settings: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("orchestrator={},tower_http=debug", settings.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &settings.observability.otlp_endpoint {
        if settings.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(otlp_endpoint))
                .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
                    opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "orchestrator-server"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                    return;
                }
                Err(e) => eprintln!("Failed to initialize OpenTelemetry: {e}. Falling back."),
            }
        }
    }
    subscriber.with(fmt_layer).init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("orchestrator={},tower_http=debug", settings.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
