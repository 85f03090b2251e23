//! Hybrid ranker combining lexical and vector-similarity rankings.

use std::sync::Arc;
use std::time::Instant;

use pgvector::Vector;
use tracing::{debug, warn};
use uuid::Uuid;

use curio_core::defaults;
use curio_core::{LexicalIndex, Result, RetrievalCandidate, SearchHit, VectorIndex};

use crate::rrf::{rrf_fuse, RankerWeights};

/// Configuration for the hybrid ranker.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// RRF weights and damping.
    pub weights: RankerWeights,
    /// Cap on candidates fetched per ranking source (before doubling for
    /// fusion headroom).
    pub candidate_cap: i64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights: RankerWeights::default(),
            candidate_cap: defaults::RANK_CANDIDATE_CAP,
        }
    }
}

impl RankerConfig {
    /// Set RRF weights.
    pub fn with_weights(mut self, weights: RankerWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the per-source candidate cap.
    pub fn with_candidate_cap(mut self, cap: i64) -> Self {
        self.candidate_cap = cap;
        self
    }
}

/// Hybrid ranker fusing a lexical ranking with a vector ranking via RRF.
///
/// A failing ranking source degrades that source's contribution to empty
/// rather than failing the whole call; only losing *both* sources yields an
/// empty result.
pub struct HybridRanker {
    lexical: Arc<dyn LexicalIndex>,
    vectors: Arc<dyn VectorIndex>,
    config: RankerConfig,
}

impl HybridRanker {
    /// Create a hybrid ranker over the given ranking sources.
    pub fn new(lexical: Arc<dyn LexicalIndex>, vectors: Arc<dyn VectorIndex>) -> Self {
        Self {
            lexical,
            vectors,
            config: RankerConfig::default(),
        }
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: RankerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fused search over a workspace. The vector ranking is skipped entirely
    /// when `query_vector` is absent (degraded retrieval).
    pub async fn search(
        &self,
        workspace_id: Uuid,
        query: &str,
        query_vector: Option<&Vector>,
        k: usize,
    ) -> Vec<RetrievalCandidate> {
        let start = Instant::now();
        let fetch_limit = (k as i64).min(self.config.candidate_cap) * 2;

        let lexical_fut = self.lexical.search(workspace_id, query, fetch_limit);
        let lexical_hits = match query_vector {
            Some(vector) => {
                let vector_fut = self.vectors.rank(workspace_id, vector, fetch_limit);
                let (lexical_res, vector_res) = tokio::join!(lexical_fut, vector_fut);
                let vector_hits = Self::degrade("vector", vector_res);
                let lexical_hits = Self::degrade("lexical", lexical_res);
                let fused = rrf_fuse(lexical_hits, vector_hits, &self.config.weights, k);
                debug!(
                    subsystem = "search",
                    component = "hybrid_ranker",
                    op = "search",
                    duration_ms = start.elapsed().as_millis() as u64,
                    result_count = fused.len(),
                    "Hybrid search complete"
                );
                return fused;
            }
            None => Self::degrade("lexical", lexical_fut.await),
        };

        let fused = rrf_fuse(lexical_hits, Vec::new(), &self.config.weights, k);
        debug!(
            subsystem = "search",
            component = "hybrid_ranker",
            op = "search",
            duration_ms = start.elapsed().as_millis() as u64,
            result_count = fused.len(),
            "Lexical-only search complete (no query vector)"
        );
        fused
    }

    /// Single-signal similarity search: items whose cosine similarity to
    /// `query_vector` exceeds `threshold`.
    pub async fn similar(
        &self,
        workspace_id: Uuid,
        query_vector: &Vector,
        threshold: f32,
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        self.vectors
            .threshold_search(workspace_id, query_vector, threshold, limit)
            .await
    }

    fn degrade(source: &str, result: Result<Vec<SearchHit>>) -> Vec<SearchHit> {
        match result {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    subsystem = "search",
                    component = "hybrid_ranker",
                    source = source,
                    error = %e,
                    "Ranking source failed, degrading its contribution to empty"
                );
                Vec::new()
            }
        }
    }
}
