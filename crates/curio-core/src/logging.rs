//! Structured logging schema and field name constants for curio.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (search hits, deltas) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "inference", "jobs", "chat"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hybrid_ranker", "encoder", "turn_loop", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "encode", "run_turn", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Item UUID being operated on.
pub const ITEM_ID: &str = "item_id";

/// Session UUID being operated on.
pub const SESSION_ID: &str = "session_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Workspace UUID scoping the operation.
pub const WORKSPACE_ID: &str = "workspace_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of inputs sent to the encoder.
pub const INPUT_COUNT: &str = "input_count";

/// Number of tool-call rounds consumed by a turn.
pub const TOOL_ROUNDS: &str = "tool_rounds";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Number of lexical hits before fusion.
pub const LEXICAL_HITS: &str = "lexical_hits";

/// Number of vector hits before fusion.
pub const VECTOR_HITS: &str = "vector_hits";
