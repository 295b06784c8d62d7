//! Retrieval-side types: documents as they come back from a single expert,
//! and as they come out of the Fusion Kernel.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A single retrieved document from one expert.
///
/// `doc_id` must be unique within a single expert's bucket and stable
/// across calls for the same underlying document (see
/// [`Document::stable_id`] for the `id`/`doc-id`/`text` fallback chain the
/// Fusion Kernel relies on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    #[serde(default)]
    pub source_uri: String,
    pub score: f32,
    pub expert_tag: String,
}

impl Document {
    /// `id`, else `doc-id`, else `text` — the fallback chain spec.md's
    /// Fusion Kernel names for picking a fusion key when an expert's
    /// backend doesn't hand back a real id.
    pub fn stable_id(&self) -> &str {
        if !self.doc_id.is_empty() {
            &self.doc_id
        } else {
            &self.text
        }
    }
}

/// An ordered sequence of documents from one retriever, ranked best-first.
pub type ExpertBucket = Vec<Document>;

/// A document after fusion: the original plus a final score and the set of
/// experts that contributed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedDocument {
    #[serde(flatten)]
    pub document: Document,
    pub final_score: f32,
    pub contributing_experts: HashSet<String>,
}

/// Deterministic keyword classification outcome for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClass {
    Factual,
    Conceptual,
    Recent,
    Default,
}

impl std::fmt::Display for QueryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryClass::Factual => "factual",
            QueryClass::Conceptual => "conceptual",
            QueryClass::Recent => "recent",
            QueryClass::Default => "default",
        };
        f.write_str(s)
    }
}

/// Per-expert weight for a fusion pass. Fields sum to ~1.0, not enforced
/// exactly (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub lexical: f32,
    pub semantic: f32,
    pub temporal: f32,
    pub graph: f32,
}

impl FusionWeights {
    pub fn get(&self, expert_tag: &str) -> f32 {
        match expert_tag {
            "lexical" => self.lexical,
            "semantic" => self.semantic,
            "temporal" => self.temporal,
            "graph" => self.graph,
            _ => 0.0,
        }
    }

    /// Wire representation: a plain `expert-tag -> weight` map, the shape
    /// spec.md §3 describes for `WeightVector`.
    pub fn as_map(&self) -> HashMap<String, f32> {
        HashMap::from([
            ("lexical".to_string(), self.lexical),
            ("semantic".to_string(), self.semantic),
            ("temporal".to_string(), self.temporal),
            ("graph".to_string(), self.graph),
        ])
    }
}
