//! Unified client to the text-generation backend, plus the heavy-model
//! concurrency gate (spec.md §4.1, §4.2).

pub mod backend;
pub mod gate;

pub use backend::{HttpLlmBackend, LlmBackendConfig};
pub use gate::{GateMetrics, HeavyGate, HeavyGuard};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),

    #[error("request timed out after {0}s")]
    Timeout(f32),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.to_string())
    }
}

impl From<LlmError> for orchestrator_core::Error {
    fn from(err: LlmError) -> Self {
        orchestrator_core::Error::Llm(err.to_string())
    }
}

/// Classify a model id as heavy (spec.md §4.2): case-insensitive substring
/// match against a known set of size hints.
pub fn is_heavy(model_id: &str, hints: &[String]) -> bool {
    let lower = model_id.to_lowercase();
    hints.iter().any(|h| lower.contains(&h.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_heavy_by_substring() {
        let hints = vec!["32b".to_string(), "mixtral-8x7b".to_string()];
        assert!(is_heavy("Qwen32B-Instruct", &hints));
        assert!(is_heavy("mixtral-8x7b-instruct-q4", &hints));
        assert!(!is_heavy("llama3.2:3b-instruct", &hints));
    }
}
