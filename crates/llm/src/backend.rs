//! HTTP implementation of [`orchestrator_core::LanguageModel`] against the
//! `POST /api/generate` / `GET /api/tags` backend shape (spec.md §6),
//! modeled on the teacher's `OllamaBackend`: a `reqwest::Client` built once
//! with connect/request timeouts, a linear-backoff retry loop for
//! transient failures, and best-effort prewarm/health-check helpers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use orchestrator_core::traits::GenerateOptions;
use orchestrator_core::LanguageModel;

use crate::LlmError;

#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    pub endpoint: String,
    pub connect_timeout: Duration,
    /// At most one retry on transient failure (spec.md §4.1).
    pub max_retries: u32,
    pub retry_backoff_base: Duration,
}

impl Default for LlmBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://ollama:11434".to_string(),
            connect_timeout: Duration::from_secs(5),
            max_retries: 1,
            retry_backoff_base: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptionsWire,
}

#[derive(Debug, Serialize)]
struct GenerateOptionsWire {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

impl From<GenerateOptions> for GenerateOptionsWire {
    fn from(o: GenerateOptions) -> Self {
        Self {
            num_predict: o.max_tokens,
            temperature: o.temperature,
            top_p: o.top_p,
            repeat_penalty: o.repetition_penalty,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[allow(dead_code)]
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

pub struct HttpLlmBackend {
    client: reqwest::Client,
    config: LlmBackendConfig,
}

impl HttpLlmBackend {
    pub fn new(config: LlmBackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .expect("reqwest client builder should not fail with static config");
        Self { client, config }
    }

    fn is_retryable(err: &LlmError) -> bool {
        matches!(err, LlmError::Http(_))
    }

    async fn execute_once(
        &self,
        model_id: &str,
        prompt: &str,
        options: GenerateOptions,
        timeout_s: f32,
    ) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model: model_id,
            prompt,
            stream: false,
            options: options.into(),
        };

        let fut = self
            .client
            .post(format!("{}/api/generate", self.config.endpoint))
            .json(&body)
            .send();

        let resp = tokio::time::timeout(Duration::from_secs_f32(timeout_s), fut)
            .await
            .map_err(|_| LlmError::Timeout(timeout_s))??;

        if !resp.status().is_success() {
            return Err(LlmError::Http(format!("status {}", resp.status())));
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text = parsed.response.trim_end().to_string();
        if text.is_empty() {
            return Err(LlmError::Http("empty response body".to_string()));
        }
        Ok(text)
    }

    /// Linear backoff retry: ~`retry_backoff_base * attempt`. Hard timeouts
    /// are not retried (spec.md §4.1).
    async fn generate_with_retry(
        &self,
        model_id: &str,
        prompt: &str,
        options: GenerateOptions,
        timeout_s: f32,
    ) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.execute_once(model_id, prompt, options, timeout_s).await {
                Ok(text) => return Ok(text),
                Err(LlmError::Timeout(s)) => return Err(LlmError::Timeout(s)),
                Err(e) if attempt < self.config.max_retries && Self::is_retryable(&e) => {
                    attempt += 1;
                    tracing::debug!(model_id, attempt, "llm request failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff_base * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLlmBackend {
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        options: GenerateOptions,
        timeout_s: f32,
    ) -> Result<String, orchestrator_core::Error> {
        self.generate_with_retry(model_id, prompt, options, timeout_s)
            .await
            .map_err(Into::into)
    }

    /// Sends a trivial 1-token request to each unique model id concurrently
    /// (spec.md §4.1, §4.7 step 3 — "call prewarm concurrently"); every
    /// failure is swallowed, never surfaced to the caller.
    async fn prewarm(&self, model_ids: &[String]) {
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<&String> = model_ids.iter().filter(|m| seen.insert(m.as_str())).collect();

        let opts = GenerateOptions {
            max_tokens: 1,
            ..GenerateOptions::default()
        };
        let futures = unique.into_iter().map(|model_id| async move {
            if let Err(e) = self.execute_once(model_id, "ping", opts, 5.0).await {
                tracing::debug!(model_id, error = %e, "prewarm failed, ignoring");
            }
        });
        futures::future::join_all(futures).await;
    }

    async fn health_check(&self) -> bool {
        let fut = self
            .client
            .get(format!("{}/api/tags", self.config.endpoint))
            .send();
        match tokio::time::timeout(Duration::from_secs(3), fut).await {
            Ok(Ok(resp)) if resp.status().is_success() => {
                resp.json::<TagsResponse>().await.is_ok()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_wire_shape() {
        let opts = GenerateOptions {
            max_tokens: 128,
            temperature: 0.3,
            top_p: 0.8,
            repetition_penalty: 1.2,
        };
        let wire: GenerateOptionsWire = opts.into();
        assert_eq!(wire.num_predict, 128);
        assert_eq!(wire.repeat_penalty, 1.2);
    }

    #[test]
    fn retryable_only_on_http_errors() {
        assert!(HttpLlmBackend::is_retryable(&LlmError::Http("x".into())));
        assert!(!HttpLlmBackend::is_retryable(&LlmError::Timeout(1.0)));
    }
}
