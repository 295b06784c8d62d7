//! Request-shaped types: the inbound query and the heuristics that tune
//! expert weighting for very short or very long queries.

use serde::{Deserialize, Serialize};

/// Vote mode. `Precision` requires a heavy model to produce a successful
/// answer before the deadline state machine can close; `Interactive` does
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Precision,
    Interactive,
}

/// An inbound request: free text plus optional prior context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub prompt: String,
    #[serde(default)]
    pub context: String,
    #[serde(default = "default_mode")]
    pub mode: Mode,
}

fn default_mode() -> Mode {
    Mode::Precision
}

impl Query {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: String::new(),
            mode: Mode::Precision,
        }
    }

    /// Character length of the prompt, used by the MoME adaptive weight
    /// override.
    pub fn char_len(&self) -> usize {
        self.prompt.chars().count()
    }

    /// Whitespace-token count of the prompt, used by the MoME adaptive
    /// weight override.
    pub fn token_len(&self) -> usize {
        self.prompt.split_whitespace().count()
    }
}

/// Thresholds controlling the MoME Router's adaptive weight override for
/// very short or very long queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Heuristics {
    pub short_query_chars: usize,
    pub short_query_tokens: usize,
    pub boost_lexical_on_short: f32,
    pub boost_semantic_on_long: f32,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            short_query_chars: 20,
            short_query_tokens: 3,
            boost_lexical_on_short: 0.7,
            boost_semantic_on_long: 0.7,
        }
    }
}
