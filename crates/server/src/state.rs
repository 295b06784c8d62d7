//! Application state: the composition root's `Arc`-wrapped services, shared
//! read-only across every handler.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;

use orchestrator_config::Settings;
use orchestrator_core::LanguageModel;
use orchestrator_engine::{ConsensusEngine, MomeRouter};
use orchestrator_llm::HeavyGate;
use orchestrator_rag::SemanticCache;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RwLock<Settings>>,
    pub consensus: Arc<ConsensusEngine>,
    pub mome: Arc<MomeRouter>,
    pub route_cache: Arc<SemanticCache>,
    pub llm: Arc<dyn LanguageModel>,
    pub gate: Arc<HeavyGate>,
    pub consensus_config_path: String,
    pub metrics_handle: PrometheusHandle,
}
