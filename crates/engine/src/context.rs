//! Grounding / Context Builder (spec.md §4.8): a pure function that
//! prefixes every committee/conductor prompt with glossary terms, the
//! user's own context, and the project's fixed constraints.
//!
//! Grounded on `original_source/configs/grounding.py`'s `make_context`,
//! rearchitected per spec.md Design Notes §9: the source's module-level
//! `_GLOSS` global becomes an explicit, per-instance `OnceCell` so nothing
//! leaks state across tests — callers own a `ContextBuilder` rather than
//! reaching for a process-wide static.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub name: String,
    pub full: String,
    pub definition: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlossaryNotes {
    #[serde(default)]
    pub constraints: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Glossary {
    #[serde(default)]
    pub terms: HashMap<String, GlossaryTerm>,
    #[serde(default)]
    pub notes: GlossaryNotes,
}

/// Loads the glossary file at most once per instance, then serves every
/// `build_context` call from memory (spec.md §4.8: "caches process-wide").
pub struct ContextBuilder {
    glossary_path: String,
    glossary: OnceCell<Glossary>,
}

impl ContextBuilder {
    pub fn new(glossary_path: impl Into<String>) -> Self {
        Self { glossary_path: glossary_path.into(), glossary: OnceCell::new() }
    }

    fn glossary(&self) -> Result<&Glossary, EngineError> {
        if let Some(g) = self.glossary.get() {
            return Ok(g);
        }
        if !Path::new(&self.glossary_path).exists() {
            return Err(EngineError::Glossary(format!(
                "glossary file not found: {}",
                self.glossary_path
            )));
        }
        let raw = std::fs::read_to_string(&self.glossary_path)
            .map_err(|e| EngineError::Glossary(e.to_string()))?;
        let parsed: Glossary =
            serde_yaml::from_str(&raw).map_err(|e| EngineError::Glossary(e.to_string()))?;
        Ok(self.glossary.get_or_init(|| parsed))
    }

    /// `build-context(user-context, [term-keys]) -> string` (spec.md §4.8).
    /// Deterministic: same inputs and glossary file produce the same
    /// output, section order fixed.
    pub fn build_context(&self, user_context: &str, term_keys: &[String]) -> Result<String, EngineError> {
        let glossary = self.glossary()?;

        let mut glossary_lines = Vec::new();
        for key in term_keys {
            if let Some(term) = glossary.terms.get(key) {
                glossary_lines.push(format!(
                    "- {} ({}): {}",
                    term.name, term.full, term.definition
                ));
            }
        }

        let mut out = String::new();
        out.push_str("[Glossary]\n");
        out.push_str(&glossary_lines.join("\n"));
        out.push_str("\n[User context]\n");
        out.push_str(user_context.trim());
        if !glossary.notes.constraints.is_empty() {
            out.push_str("\n[Constraints]\n");
            out.push_str(&glossary.notes.constraints);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_glossary(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const SAMPLE: &str = r#"
terms:
  mome:
    name: MoME
    full: Mixture of Memory Experts
    definition: multiple retrieval experts fused per query
  rrf:
    name: RRF
    full: Reciprocal Rank Fusion
    definition: rank aggregation assigning 1/(k+rank) per source
notes:
  constraints: "Answer concisely. Do not invent acronyms."
"#;

    #[test]
    fn builds_deterministic_sections() {
        let f = write_glossary(SAMPLE);
        let builder = ContextBuilder::new(f.path().to_str().unwrap());
        let ctx = builder
            .build_context("user prefers French", &["mome".to_string(), "rrf".to_string()])
            .unwrap();
        assert!(ctx.starts_with("[Glossary]\n"));
        assert!(ctx.contains("MoME (Mixture of Memory Experts)"));
        assert!(ctx.contains("[User context]\nuser prefers French"));
        assert!(ctx.contains("[Constraints]\nAnswer concisely"));
    }

    #[test]
    fn caches_after_first_load() {
        let f = write_glossary(SAMPLE);
        let builder = ContextBuilder::new(f.path().to_str().unwrap());
        let first = builder.build_context("a", &[]).unwrap();
        std::fs::remove_file(f.path()).unwrap();
        // second call must not hit the filesystem again
        let second = builder.build_context("a", &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_an_error() {
        let builder = ContextBuilder::new("/no/such/glossary.yaml");
        assert!(builder.build_context("x", &[]).is_err());
    }
}
