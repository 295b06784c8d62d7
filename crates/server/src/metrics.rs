//! Prometheus metrics installation (spec.md §6's `GET /metrics`,
//! SPEC_FULL.md §2's ambient observability stack). Grounded on the
//! teacher's `init_metrics`/`metrics_handler` pair: a process-wide
//! `PrometheusHandle` installed once at startup, rendered on demand by the
//! `/metrics` handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder and returns the handle the `/metrics`
/// handler renders from. Call exactly once, at startup.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once per process")
}

pub fn record_vote(mode: &str, status: &str, elapsed_s: f64, cache_hit: bool) {
    metrics::counter!("orchestrator_votes_total", "mode" => mode.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!("orchestrator_vote_latency_seconds", "mode" => mode.to_string())
        .record(elapsed_s);
    if cache_hit {
        metrics::counter!("orchestrator_cache_hits_total", "request_type" => "vote").increment(1);
    } else {
        metrics::counter!("orchestrator_cache_misses_total", "request_type" => "vote").increment(1);
    }
}

pub fn record_route(query_type: &str, cache_hit: bool) {
    metrics::counter!("orchestrator_routes_total", "query_type" => query_type.to_string()).increment(1);
    if cache_hit {
        metrics::counter!("orchestrator_cache_hits_total", "request_type" => "route").increment(1);
    } else {
        metrics::counter!("orchestrator_cache_misses_total", "request_type" => "route").increment(1);
    }
}

pub fn record_heavy_gate(in_use: usize, waiters: usize) {
    metrics::gauge!("orchestrator_heavy_gate_in_use").set(in_use as f64);
    metrics::gauge!("orchestrator_heavy_gate_waiters").set(waiters as f64);
}
