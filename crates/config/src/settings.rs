//! Process-wide `Settings`, loaded once at the composition root.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    Development,
    Staging,
    Production,
}

impl Default for RuntimeEnvironment {
    fn default() -> Self {
        RuntimeEnvironment::Development
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_json: bool,
    pub tracing_enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            tracing_enabled: false,
            otlp_endpoint: None,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// Semantic/exact cache tuning (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_s: u64,
    pub similarity_threshold: f32,
    pub max_scan: usize,
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_s: 3600,
            similarity_threshold: 0.93,
            max_scan: 200,
            redis_url: None,
        }
    }
}

/// Fusion Kernel + Retrieval Expert tuning (spec.md §4.4 / §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub rrf_k: f32,
    pub final_top_k: usize,
    pub mmr_enabled: bool,
    pub mmr_lambda: f32,
    pub expert_timeout_s: f32,
    pub embedding_dim: usize,
    pub lexical_endpoint: String,
    pub semantic_endpoint: String,
    pub lexical_index: String,
    pub semantic_collection: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            final_top_k: 5,
            mmr_enabled: false,
            mmr_lambda: 0.5,
            expert_timeout_s: 3.0,
            embedding_dim: 384,
            lexical_endpoint: "http://meili:7700".to_string(),
            semantic_endpoint: "http://qdrant:6333".to_string(),
            lexical_index: "orchestrator_docs".to_string(),
            semantic_collection: "orchestrator_docs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeavyGateConfig {
    pub max_heavy: usize,
    pub heavy_hints: Vec<String>,
}

impl Default for HeavyGateConfig {
    fn default() -> Self {
        Self {
            max_heavy: 1,
            heavy_hints: vec![
                "32b".to_string(),
                "70b".to_string(),
                "72b".to_string(),
                "mixtral-8x7b".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub heavy_gate: HeavyGateConfig,
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    #[serde(default = "default_consensus_config_path")]
    pub consensus_config_path: String,
    #[serde(default = "default_glossary_path")]
    pub glossary_path: String,
}

fn default_llm_endpoint() -> String {
    "http://ollama:11434".to_string()
}

fn default_consensus_config_path() -> String {
    "config/consensus_models.yaml".to_string()
}

fn default_glossary_path() -> String {
    "config/glossary.yaml".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            cache: CacheConfig::default(),
            rag: RagConfig::default(),
            heavy_gate: HeavyGateConfig::default(),
            llm_endpoint: default_llm_endpoint(),
            consensus_config_path: default_consensus_config_path(),
            glossary_path: default_glossary_path(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_rag()?;
        self.validate_cache()?;
        self.validate_server()?;
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        if self.rag.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.rrf_k".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        if self.rag.final_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.final_top_k".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.rag.mmr_lambda) {
            return Err(ConfigError::InvalidValue {
                field: "rag.mmr_lambda".to_string(),
                message: "must be in [0, 1]".to_string(),
            });
        }
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "cache.similarity_threshold".to_string(),
                message: "must be in [0, 1]".to_string(),
            });
        }
        if self.cache.max_scan == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_scan".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "must be nonzero".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings, layering `config/default.{yaml,toml}` →
/// `config/{env}.{yaml,toml}` → environment variables prefixed
/// `ORCHESTRATOR__` (double underscore as the nesting separator), matching
/// the teacher's `load_settings` layering.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let env_name = env
        .map(str::to_string)
        .or_else(|| std::env::var("ORCHESTRATOR_ENV").ok())
        .unwrap_or_else(|| "development".to_string());

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{}", env_name)).required(false))
        .add_source(
            config::Environment::with_prefix("ORCHESTRATOR")
                .separator("__")
                .try_parsing(true),
        );

    let raw = builder.build()?;
    let settings: Settings = raw.try_deserialize().unwrap_or_default();
    settings.validate()?;
    Ok(settings)
}
