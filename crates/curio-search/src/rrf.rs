//! Reciprocal Rank Fusion (RRF) for combining search rankings.
//!
//! Fusion is a set-union outer join over the two source rankings: a candidate
//! present in only one ranking keeps a nonzero fused score, and no candidate
//! from either source is dropped before the final truncation.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{RetrievalCandidate, SearchHit};

/// Weights and damping for RRF fusion.
#[derive(Debug, Clone)]
pub struct RankerWeights {
    /// Weight applied to the lexical ranking's contribution.
    pub lexical: f32,
    /// Weight applied to the vector ranking's contribution.
    pub vector: f32,
    /// Damping constant added to each rank before inversion.
    pub rrf_k: f32,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            lexical: 1.0,
            vector: 1.0,
            rrf_k: defaults::RRF_K,
        }
    }
}

struct CandidateAcc {
    lexical_rank: Option<usize>,
    vector_rank: Option<usize>,
    title: Option<String>,
    snippet: Option<String>,
}

/// Fuse a lexical ranking and a vector ranking into one candidate list.
///
/// Ranks are 1-based positions in each source list. A missing rank
/// contributes 0 to its term. Output is sorted descending by fused score and
/// truncated to `k`.
pub fn rrf_fuse(
    lexical: Vec<SearchHit>,
    vector: Vec<SearchHit>,
    weights: &RankerWeights,
    k: usize,
) -> Vec<RetrievalCandidate> {
    let (lexical_len, vector_len) = (lexical.len(), vector.len());
    let mut acc: HashMap<Uuid, CandidateAcc> = HashMap::new();

    for (idx, hit) in lexical.into_iter().enumerate() {
        acc.insert(
            hit.item_id,
            CandidateAcc {
                lexical_rank: Some(idx + 1),
                vector_rank: None,
                title: hit.title,
                snippet: hit.snippet,
            },
        );
    }

    for (idx, hit) in vector.into_iter().enumerate() {
        let entry = acc.entry(hit.item_id).or_insert(CandidateAcc {
            lexical_rank: None,
            vector_rank: None,
            title: hit.title,
            snippet: hit.snippet,
        });
        entry.vector_rank = Some(idx + 1);
    }

    let mut candidates: Vec<RetrievalCandidate> = acc
        .into_iter()
        .map(|(item_id, c)| {
            let lex_term = c
                .lexical_rank
                .map(|r| weights.lexical / (weights.rrf_k + r as f32))
                .unwrap_or(0.0);
            let vec_term = c
                .vector_rank
                .map(|r| weights.vector / (weights.rrf_k + r as f32))
                .unwrap_or(0.0);
            RetrievalCandidate {
                item_id,
                lexical_rank: c.lexical_rank,
                vector_rank: c.vector_rank,
                fused_score: lex_term + vec_term,
                title: c.title,
                snippet: c.snippet,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);

    debug!(
        subsystem = "search",
        component = "rrf",
        lexical_hits = lexical_len,
        vector_hits = vector_len,
        result_count = candidates.len(),
        "RRF fusion complete"
    );

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: Uuid, score: f32) -> SearchHit {
        SearchHit {
            item_id: id,
            score,
            snippet: Some("snippet".to_string()),
            title: Some("Title".to_string()),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_fuse_union_keeps_single_source_candidates() {
        let lex_only = Uuid::new_v4();
        let vec_only = Uuid::new_v4();

        let fused = rrf_fuse(
            vec![hit(lex_only, 0.9)],
            vec![hit(vec_only, 0.8)],
            &RankerWeights::default(),
            10,
        );

        assert_eq!(fused.len(), 2);
        let lex = fused.iter().find(|c| c.item_id == lex_only).unwrap();
        let vec_ = fused.iter().find(|c| c.item_id == vec_only).unwrap();
        assert!(lex.fused_score > 0.0);
        assert!(vec_.fused_score > 0.0);
        assert_eq!(lex.lexical_rank, Some(1));
        assert_eq!(lex.vector_rank, None);
        assert_eq!(vec_.vector_rank, Some(1));
    }

    #[test]
    fn test_fuse_both_sources_beats_one() {
        let both = Uuid::new_v4();
        let lex_only = Uuid::new_v4();

        let fused = rrf_fuse(
            vec![hit(both, 0.9), hit(lex_only, 0.8)],
            vec![hit(both, 0.95)],
            &RankerWeights::default(),
            10,
        );

        assert_eq!(fused[0].item_id, both);
        let both_score = fused[0].fused_score;
        let lex_score = fused
            .iter()
            .find(|c| c.item_id == lex_only)
            .unwrap()
            .fused_score;
        assert!(both_score > lex_score);
    }

    #[test]
    fn test_fuse_score_formula() {
        let id = Uuid::new_v4();
        let weights = RankerWeights {
            lexical: 2.0,
            vector: 1.0,
            rrf_k: 50.0,
        };

        let fused = rrf_fuse(vec![hit(id, 1.0)], vec![hit(id, 1.0)], &weights, 10);

        // rank 1 in both lists: 2/(50+1) + 1/(50+1)
        let expected = 2.0 / 51.0 + 1.0 / 51.0;
        assert!((fused[0].fused_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_monotonic_in_rank() {
        // Moving an item closer to rank 1 in one source never decreases
        // its fused score.
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();
        let weights = RankerWeights::default();

        let at_rank_2 = rrf_fuse(
            vec![hit(other, 0.9), hit(target, 0.8)],
            vec![],
            &weights,
            10,
        );
        let at_rank_1 = rrf_fuse(
            vec![hit(target, 0.9), hit(other, 0.8)],
            vec![],
            &weights,
            10,
        );

        let score_rank_2 = at_rank_2
            .iter()
            .find(|c| c.item_id == target)
            .unwrap()
            .fused_score;
        let score_rank_1 = at_rank_1
            .iter()
            .find(|c| c.item_id == target)
            .unwrap()
            .fused_score;
        assert!(score_rank_1 >= score_rank_2);
        assert!(score_rank_1 > score_rank_2);
    }

    #[test]
    fn test_fuse_empty_sources() {
        let fused = rrf_fuse(vec![], vec![], &RankerWeights::default(), 10);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_fuse_respects_limit() {
        let lexical: Vec<SearchHit> = (0..40).map(|i| hit(Uuid::new_v4(), 1.0 - i as f32 * 0.01)).collect();
        let fused = rrf_fuse(lexical, vec![], &RankerWeights::default(), 10);
        assert_eq!(fused.len(), 10);
    }

    #[test]
    fn test_fuse_sorted_descending() {
        let lexical: Vec<SearchHit> = (0..20).map(|i| hit(Uuid::new_v4(), 1.0 - i as f32 * 0.01)).collect();
        let vector: Vec<SearchHit> = (0..20).map(|i| hit(Uuid::new_v4(), 1.0 - i as f32 * 0.01)).collect();
        let fused = rrf_fuse(lexical, vector, &RankerWeights::default(), 40);
        for pair in fused.windows(2) {
            assert!(pair[0].fused_score >= pair[1].fused_score);
        }
    }

    #[test]
    fn test_fuse_keeps_metadata() {
        let id = Uuid::new_v4();
        let fused = rrf_fuse(vec![hit(id, 0.9)], vec![], &RankerWeights::default(), 10);
        assert_eq!(fused[0].title.as_deref(), Some("Title"));
        assert_eq!(fused[0].snippet.as_deref(), Some("snippet"));
    }

    #[test]
    fn test_no_candidate_dropped_before_truncation() {
        let lexical: Vec<SearchHit> = (0..5).map(|i| hit(Uuid::new_v4(), 1.0 - i as f32 * 0.1)).collect();
        let vector: Vec<SearchHit> = (0..5).map(|i| hit(Uuid::new_v4(), 1.0 - i as f32 * 0.1)).collect();
        let fused = rrf_fuse(lexical, vector, &RankerWeights::default(), 100);
        assert_eq!(fused.len(), 10);
    }
}
