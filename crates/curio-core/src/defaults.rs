//! Centralized default constants for curio.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. When adding new constants, place them in the appropriate
//! section and document the rationale for the chosen value.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding vector dimension (multimodal encoder).
pub const EMBED_DIMENSION: usize = 1024;

/// Maximum inputs per encoder call. Image inputs make payloads large, so the
/// batch is kept small enough that a single request stays tractable.
pub const ENCODE_BATCH_MAX: usize = 50;

/// Character budget per encoder input. Text beyond this is truncated before
/// encoding to bound request cost.
pub const ENCODE_CHAR_BUDGET: usize = 6000;

/// Timeout for encoder requests (seconds).
pub const ENCODE_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// RRF damping constant. Higher values flatten the contribution curve so deep
/// ranks still matter; 50 keeps the top of each source list dominant without
/// letting rank 1 drown everything else.
pub const RRF_K: f32 = 50.0;

/// Cap on candidates fetched per ranking source, before multiplying by 2 for
/// fusion headroom.
pub const RANK_CANDIDATE_CAP: i64 = 30;

/// Default result count for search calls.
pub const SEARCH_LIMIT: i64 = 10;

/// Similarity floor for the single-purpose similar-items endpoint.
pub const SIMILAR_ITEMS_THRESHOLD: f32 = 0.7;

/// Similarity floor for chat-grounding session retrieval. Deliberately loose:
/// a marginally related past conversation is still useful grounding.
pub const SESSION_GROUNDING_THRESHOLD: f32 = 0.25;

/// How many recently updated items to fall back to when the encoder is
/// unavailable and no ranking can be computed.
pub const RECENCY_FALLBACK_LIMIT: i64 = 5;

/// Character budget per context entry when assembling the grounding block.
pub const CONTEXT_ENTRY_BUDGET: usize = 800;

/// Maximum grounding images forwarded to the chat model per turn.
pub const CONTEXT_IMAGE_MAX: usize = 5;

// =============================================================================
// DIALOGUE LOOP
// =============================================================================

/// Hard bound on tool-call rounds within one user turn.
pub const MAX_TOOL_ROUNDS: usize = 10;

/// Number of prior turns replayed into the model context.
pub const TURN_WINDOW: i64 = 30;

/// Timeout for chat model requests (seconds).
pub const CHAT_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// PROJECTION
// =============================================================================

/// Number of principal components extracted for the 3D map.
pub const PROJECTION_COMPONENTS: usize = 3;

/// Fixed iteration count for power iteration. Sufficient for the small item
/// counts (N up to a few thousand) this runs against.
pub const POWER_ITERATIONS: usize = 50;

/// Eigenvalues at or below this are treated as "no signal on this axis".
pub const EIGENVALUE_EPSILON: f32 = 1e-12;

/// Coordinates are rescaled so the maximum absolute value maps to this bound.
pub const PROJECTION_BOUND: f32 = 3.0;

/// Cosine similarity must strictly exceed this for a map edge to be emitted.
pub const EDGE_SIMILARITY_THRESHOLD: f32 = 0.5;

// =============================================================================
// JOBS
// =============================================================================

/// Default polling interval for the job worker (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum concurrent background jobs.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Maximum retries for failed jobs.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Hard ceiling on a single job execution (seconds). Covers a slow external
/// scrape plus one encoder call with margin.
pub const JOB_TIMEOUT_SECS: u64 = 180;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default worker-event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Buffer size of the per-turn chat event channel.
pub const CHAT_CHANNEL_CAPACITY: usize = 64;

/// Default page size for list endpoints.
pub const PAGE_LIMIT: i64 = 50;

#[cfg(test)]
mod tests {
    use super::*;

    // Threshold regression tests: these two values intentionally diverge per
    // call-site. Changing either requires revisiting both retrieval paths.
    #[test]
    fn test_similar_items_threshold_pinned() {
        assert_eq!(SIMILAR_ITEMS_THRESHOLD, 0.7);
    }

    #[test]
    fn test_session_grounding_threshold_pinned() {
        assert_eq!(SESSION_GROUNDING_THRESHOLD, 0.25);
    }

    #[test]
    fn test_rrf_damping_constant() {
        assert_eq!(RRF_K, 50.0);
    }

    #[test]
    fn test_edge_threshold_matches_projection_contract() {
        assert_eq!(EDGE_SIMILARITY_THRESHOLD, 0.5);
        assert_eq!(PROJECTION_BOUND, 3.0);
    }
}
