//! Score normalization, weighted Reciprocal Rank Fusion and MMR
//! diversification (spec.md §4.4).
//!
//! Grounded on the teacher's `retriever::HybridRetriever::rrf_fusion`
//! (fuse-and-dedup via a `HashMap<id, (score, doc)>`) and
//! `original_source/core/memory/memory_fusion.py`'s
//! `normalize_scores`/`rrf_merge`/`dedup` trio, extended with the MMR step
//! spec.md adds.

use std::collections::{HashMap, HashSet};

use orchestrator_core::{Document, ExpertBucket, FusedDocument, FusionWeights};

/// Min-max normalize a slice of scores to `[0, 1]`. If the spread is below
/// `1e-9`, every score collapses to `0.5` (spec.md §4.4).
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max - min < 1e-9 {
        return vec![0.5; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Canonical expert iteration order, fixed so fusion is independent of the
/// caller's `HashMap`/insertion order (spec.md §8 invariant 5).
const EXPERT_ORDER: [&str; 4] = ["lexical", "semantic", "temporal", "graph"];

fn ordered_experts<'a>(
    buckets: &'a HashMap<String, ExpertBucket>,
) -> Vec<(&'a str, &'a ExpertBucket)> {
    let mut out = Vec::new();
    for tag in EXPERT_ORDER {
        if let Some(bucket) = buckets.get(tag) {
            out.push((tag, bucket));
        }
    }
    // Any expert tag outside the canonical four still participates,
    // ordered alphabetically after the known ones, so no bucket is dropped.
    let mut extra: Vec<&str> = buckets
        .keys()
        .map(String::as_str)
        .filter(|k| !EXPERT_ORDER.contains(k))
        .collect();
    extra.sort_unstable();
    for tag in extra {
        out.push((tag, buckets.get(tag).unwrap()));
    }
    out
}

/// Weighted RRF (spec.md §4.4): `score[doc] += weight[expert] / (k + rank)`
/// summed over every expert bucket the doc appears in, 1-indexed rank.
/// Ties broken by first appearance in canonical expert order, then by rank.
pub fn weighted_rrf(
    buckets: &HashMap<String, ExpertBucket>,
    weights: &FusionWeights,
    k: f32,
) -> Vec<FusedDocument> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut doc_map: HashMap<String, Document> = HashMap::new();
    let mut contributors: HashMap<String, HashSet<String>> = HashMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut order_counter = 0usize;

    for (expert_tag, bucket) in ordered_experts(buckets) {
        let weight = weights.get(expert_tag);
        for (idx, doc) in bucket.iter().enumerate() {
            let rank = idx + 1;
            let id = doc.stable_id().to_string();
            *scores.entry(id.clone()).or_insert(0.0) += weight * (1.0 / (k + rank as f32));
            contributors
                .entry(id.clone())
                .or_default()
                .insert(expert_tag.to_string());
            doc_map.entry(id.clone()).or_insert_with(|| doc.clone());
            first_seen.entry(id).or_insert_with(|| {
                let v = order_counter;
                order_counter += 1;
                v
            });
        }
    }

    let mut ids: Vec<String> = scores.keys().cloned().collect();
    ids.sort_by(|a, b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| first_seen[a].cmp(&first_seen[b]))
    });

    ids.into_iter()
        .map(|id| {
            let document = doc_map.remove(&id).expect("id came from doc_map keys");
            FusedDocument {
                final_score: scores[&id],
                contributing_experts: contributors.remove(&id).unwrap_or_default(),
                document,
            }
        })
        .collect()
}

/// Dedup by `doc_id`/stable id, first occurrence wins (spec.md §4.4).
/// Idempotent: `dedup(dedup(x)) == dedup(x)`.
pub fn dedup(docs: Vec<FusedDocument>) -> Vec<FusedDocument> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(d.document.stable_id().to_string()))
        .collect()
}

/// Greedy MMR selection (spec.md §4.4): pick `top_k` maximizing
/// `(1 - lambda) * rel - lambda * max_sim(cand, selected)`. The first pick
/// uses pure relevance (no diversity penalty, since `selected` is empty).
/// `embeddings` must contain one vector per candidate, aligned by index.
pub fn mmr_select(
    candidates: &[FusedDocument],
    embeddings: &[Vec<f32>],
    top_k: usize,
    lambda: f32,
) -> Vec<FusedDocument> {
    assert_eq!(candidates.len(), embeddings.len());
    if candidates.is_empty() {
        return Vec::new();
    }

    let raw_scores: Vec<f32> = candidates.iter().map(|d| d.final_score).collect();
    let rel = normalize_scores(&raw_scores);

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::new();

    while !remaining.is_empty() && selected.len() < top_k {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &cand) in remaining.iter().enumerate() {
            let diversity_penalty = selected
                .iter()
                .map(|&s| cosine(&embeddings[cand], &embeddings[s]))
                .fold(0.0f32, f32::max);
            let mmr_score = (1.0 - lambda) * rel[cand] - lambda * diversity_penalty;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = pos;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    selected.into_iter().map(|i| candidates[i].clone()).collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = if norm_a * norm_b == 0.0 { 1.0 } else { norm_a * norm_b };
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, expert: &str, score: f32) -> Document {
        Document {
            doc_id: id.to_string(),
            text: format!("text-{id}"),
            source_uri: String::new(),
            score,
            expert_tag: expert.to_string(),
        }
    }

    fn weights(lexical: f32, semantic: f32, temporal: f32, graph: f32) -> FusionWeights {
        FusionWeights { lexical, semantic, temporal, graph }
    }

    #[test]
    fn normalize_handles_empty_spread() {
        let out = normalize_scores(&[1.0, 1.0, 1.0]);
        assert_eq!(out, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn normalize_handles_min_max() {
        let out = normalize_scores(&[0.0, 5.0, 10.0]);
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn rrf_golden_scenario() {
        // Two buckets {lex:[d1,d2,d3], sem:[d3,d1,d4]}, equal weights,
        // k=60, 1-indexed rank. Per-doc scores:
        //   d1 = 0.5/61 + 0.5/62 = 0.0162612  (lex rank1, sem rank2)
        //   d3 = 0.5/63 + 0.5/61 = 0.0161332  (lex rank3, sem rank1)
        //   d2 = 0.5/62          = 0.0080645  (lex rank2 only)
        //   d4 = 0.5/63          = 0.0079365  (sem rank3 only)
        // d1 > d3 > d2 > d4.
        let mut buckets = HashMap::new();
        buckets.insert(
            "lexical".to_string(),
            vec![doc("d1", "lexical", 1.0), doc("d2", "lexical", 0.9), doc("d3", "lexical", 0.8)],
        );
        buckets.insert(
            "semantic".to_string(),
            vec![doc("d3", "semantic", 1.0), doc("d1", "semantic", 0.9), doc("d4", "semantic", 0.8)],
        );
        let w = weights(0.5, 0.5, 0.0, 0.0);
        let fused = weighted_rrf(&buckets, &w, 60.0);
        let order: Vec<&str> = fused.iter().map(|d| d.document.doc_id.as_str()).collect();
        assert_eq!(order, vec!["d1", "d3", "d2", "d4"]);

        let d1_score = fused.iter().find(|d| d.document.doc_id == "d1").unwrap().final_score;
        let d3_score = fused.iter().find(|d| d.document.doc_id == "d3").unwrap().final_score;
        assert!((d1_score - 0.0162612).abs() < 1e-5);
        assert!((d3_score - 0.0161332).abs() < 1e-5);
    }

    #[test]
    fn rrf_is_order_independent_of_bucket_insertion() {
        let mut a = HashMap::new();
        a.insert("lexical".to_string(), vec![doc("d1", "lexical", 1.0), doc("d2", "lexical", 0.9)]);
        a.insert("semantic".to_string(), vec![doc("d2", "semantic", 1.0), doc("d1", "semantic", 0.9)]);

        let mut b = HashMap::new();
        b.insert("semantic".to_string(), vec![doc("d2", "semantic", 1.0), doc("d1", "semantic", 0.9)]);
        b.insert("lexical".to_string(), vec![doc("d1", "lexical", 1.0), doc("d2", "lexical", 0.9)]);

        let w = weights(0.5, 0.5, 0.0, 0.0);
        let fa = weighted_rrf(&a, &w, 60.0);
        let fb = weighted_rrf(&b, &w, 60.0);
        let ids_a: Vec<&str> = fa.iter().map(|d| d.document.doc_id.as_str()).collect();
        let ids_b: Vec<&str> = fb.iter().map(|d| d.document.doc_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn rrf_all_zero_weights_yields_zero_scores() {
        let mut buckets = HashMap::new();
        buckets.insert("lexical".to_string(), vec![doc("d1", "lexical", 1.0)]);
        let w = weights(0.0, 0.0, 0.0, 0.0);
        let fused = weighted_rrf(&buckets, &w, 60.0);
        assert_eq!(fused[0].final_score, 0.0);
    }

    #[test]
    fn rrf_single_nonzero_weight_preserves_bucket_order() {
        let mut buckets = HashMap::new();
        buckets.insert("lexical".to_string(), vec![doc("d1", "lexical", 1.0), doc("d2", "lexical", 0.9)]);
        buckets.insert("semantic".to_string(), vec![doc("d2", "semantic", 1.0), doc("d1", "semantic", 0.9)]);
        let w = weights(1.0, 0.0, 0.0, 0.0);
        let fused = weighted_rrf(&buckets, &w, 60.0);
        let order: Vec<&str> = fused.iter().map(|d| d.document.doc_id.as_str()).collect();
        assert_eq!(order, vec!["d1", "d2"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut buckets = HashMap::new();
        buckets.insert(
            "lexical".to_string(),
            vec![doc("d1", "lexical", 1.0), doc("d1", "lexical", 0.5)],
        );
        let w = weights(1.0, 0.0, 0.0, 0.0);
        let fused = weighted_rrf(&buckets, &w, 60.0);
        let once = dedup(fused.clone());
        let twice = dedup(once.clone());
        assert_eq!(once.len(), twice.len());
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn mmr_first_pick_is_pure_relevance() {
        let docs = vec![
            FusedDocument { document: doc("d1", "lexical", 1.0), final_score: 0.5, contributing_experts: HashSet::new() },
            FusedDocument { document: doc("d2", "lexical", 1.0), final_score: 0.9, contributing_experts: HashSet::new() },
        ];
        let embeds = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let selected = mmr_select(&docs, &embeds, 2, 0.5);
        assert_eq!(selected[0].document.doc_id, "d2");
    }
}
