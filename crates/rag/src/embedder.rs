//! Fixed-dimension sentence embedder shared by the Semantic Cache and the
//! semantic retrieval expert (spec.md §4.3, §9).
//!
//! Default build uses a deterministic hashing-based embedder: no network
//! or model-file dependency, suitable for tests and the default feature
//! set (an explicit Open Question decision, recorded in DESIGN.md). A
//! `candle`-feature-gated real sentence embedder is available behind the
//! same [`orchestrator_core::Embedder`] trait seam.

use orchestrator_core::Embedder;

use crate::RagError;

/// Deterministic bag-of-trigrams hashing embedder. Not semantically
/// meaningful beyond lexical overlap, but stable, dependency-free, and
/// enough to exercise cosine-threshold cache logic in tests.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, orchestrator_core::Error> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding("cannot embed empty text".to_string()).into());
        }
        let normalized = text.to_lowercase();
        let mut vec = vec![0.0f32; self.dim];
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() < 3 {
            let bucket = fnv1a(normalized.as_bytes()) as usize % self.dim;
            vec[bucket] += 1.0;
        } else {
            for window in chars.windows(3) {
                let s: String = window.iter().collect();
                let bucket = fnv1a(s.as_bytes()) as usize % self.dim;
                vec[bucket] += 1.0;
            }
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vec)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity, `a . b / (||a|| * ||b|| or 1.0)` (spec.md §4.3
/// invariant). Returns `0.0` for mismatched lengths rather than panicking,
/// since cache entries are allowed to come from a differently-configured
/// embedder without crashing the lookup path.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = if norm_a * norm_b == 0.0 { 1.0 } else { norm_a * norm_b };
    dot / denom
}

#[cfg(feature = "candle")]
pub mod candle_embedder {
    //! Placeholder seam for a real sentence-embedding backend, in the shape
    //! the teacher's `candle_embeddings.rs` uses (BERT-family encoder + mean
    //! pooling over SafeTensors weights, CPU-bound inference offloaded to
    //! `tokio::task::spawn_blocking`).
    //!
    //! Left as a documented stub rather than wired to real `candle`/`hf-hub`
    //! crates: picking a concrete model id, tokenizer and weights source is
    //! a deployment decision, not a fusion-kernel one. Once that decision is
    //! made, add the `candle-core`/`candle-nn`/`candle-transformers`/
    //! `safetensors`/`hf-hub`/`tokenizers` dependencies back to this
    //! feature and implement `embed` against them.
    use orchestrator_core::Embedder;

    pub struct CandleSentenceEmbedder {
        dim: usize,
    }

    impl CandleSentenceEmbedder {
        pub fn new(dim: usize) -> Self {
            Self { dim }
        }
    }

    impl Embedder for CandleSentenceEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, orchestrator_core::Error> {
            Err(orchestrator_core::Error::Rag(
                "candle sentence embedder requires model weights; configure a model path before use"
                    .to_string(),
            ))
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_similarity_is_one() {
        let e = HashingEmbedder::new(64);
        let v = e.embed("the quick brown fox").unwrap();
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn different_text_is_not_identical() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("bonjour le monde").unwrap();
        let b = e.embed("completely unrelated text about gold loans").unwrap();
        assert!(cosine(&a, &b) < 0.99);
    }

    #[test]
    fn rejects_empty_text() {
        let e = HashingEmbedder::new(64);
        assert!(e.embed("").is_err());
    }
}
