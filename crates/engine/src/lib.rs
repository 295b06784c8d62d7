//! Consensus Voting Engine, MoME Retrieval Router, Grounding/Context Builder
//! and Predictive Scheduler — the orchestration layer sitting on top of
//! `orchestrator-llm` and `orchestrator-rag`.

pub mod consensus;
pub mod context;
pub mod mome;
pub mod scheduler;

pub use consensus::ConsensusEngine;
pub use context::{ContextBuilder, Glossary, GlossaryNotes, GlossaryTerm};
pub use mome::{adaptive_two_expert_weights, classify, MomeRouter, RouteResponse};
pub use scheduler::{predict, SchedulePlan};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("glossary error: {0}")]
    Glossary(String),

    #[error("context build error: {0}")]
    Context(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<EngineError> for orchestrator_core::Error {
    fn from(err: EngineError) -> Self {
        orchestrator_core::Error::Engine(err.to_string())
    }
}

impl From<orchestrator_config::ConfigError> for EngineError {
    fn from(err: orchestrator_config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}
