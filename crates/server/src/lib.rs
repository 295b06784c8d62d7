//! HTTP surface for the retrieval-augmented LLM orchestrator: composes the
//! Consensus Engine and MoME Router behind six endpoints (spec.md §6).

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Per spec.md §7: configuration errors are the only failure class the
/// server surfaces as a 4xx; everything else reaching this boundary is an
/// unexpected internal failure.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Config(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
