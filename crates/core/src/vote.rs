//! Consensus Engine types: the committee, the per-mode deadline policy, and
//! the outcome of a vote.

use serde::{Deserialize, Serialize};

use crate::query::Mode;

/// One voice in a committee. Multiple roles may share a `model_id`.
///
/// `deny_unknown_fields` per spec.md Design Notes §9's "typed schema,
/// reject unknown fields" guidance: a typo in a committee entry's field
/// name should fail config load, not silently fall back to a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitteeMember {
    pub role: String,
    pub model_id: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,
    #[serde(default = "default_per_call_timeout")]
    pub per_call_timeout_s: f32,
}

fn default_max_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.2
}
fn default_top_p() -> f32 {
    0.9
}
fn default_repetition_penalty() -> f32 {
    1.1
}
fn default_per_call_timeout() -> f32 {
    12.0
}

/// The deadline policy and committee for one named mode, loaded from the
/// config file at `config-path` (spec.md §6).
///
/// Invariant: `0 < soft_deadline_s <= soft_deadline_s + grace_s <= hard_deadline_s`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub committee: Vec<CommitteeMember>,
    pub soft_deadline_s: f32,
    pub grace_s: f32,
    pub hard_deadline_s: f32,
    pub require_heavy: bool,
    pub conductor: CommitteeMember,
}

impl ModeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.soft_deadline_s <= 0.0 {
            return Err("soft_deadline_s must be > 0".to_string());
        }
        if self.soft_deadline_s + self.grace_s > self.hard_deadline_s {
            return Err(
                "soft_deadline_s + grace_s must be <= hard_deadline_s".to_string(),
            );
        }
        Ok(())
    }
}

/// One committee member's contribution to a vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub role: String,
    pub model_id: String,
    pub answer: String,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    Ok,
    Timeout,
}

/// The result of `Engine::vote`.
///
/// Invariants: `status == Timeout` implies `require_heavy` was set and no
/// heavy model produced a successful vote; `confidence` is in `[0.55, 0.95]`
/// when `status == Ok`, `0.0` when `status == Timeout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub status: VoteStatus,
    pub final_answer: String,
    pub votes: Vec<Vote>,
    pub confidence: f32,
    pub elapsed_s: f64,
    pub mode: Mode,
    pub cache_hit: bool,
}
