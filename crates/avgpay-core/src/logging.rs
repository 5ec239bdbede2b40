//! Structured logging field name constants for the enrichment service.
//!
//! All crates use these names for `tracing` fields so that log queries
//! (Loki, Elasticsearch) can filter by the same keys across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, job completions, sweeper results |
//! | DEBUG | Decision points (trigger reasons, chain entry selection) |
//! | TRACE | Raw prompt/response sizes |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID for an HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "queue", "fallback", "processor", "sweeper", "trigger"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_next", "generate", "recover_failed", "backfill"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Enrichment job UUID.
pub const JOB_ID: &str = "job_id";

/// Entity type ("company", "city", "job").
pub const ENTITY_TYPE: &str = "entity_type";

/// Entity UUID.
pub const ENTITY_ID: &str = "entity_id";

/// Trigger source tag supplied by the caller.
pub const SOURCE: &str = "source";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or jobs affected.
pub const RESULT_COUNT: &str = "result_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Provider family ("anthropic", "openai").
pub const PROVIDER: &str = "provider";

/// Model name used for inference.
pub const MODEL: &str = "model";

/// Position of the entry in the fallback chain (1-based).
pub const ATTEMPT: &str = "attempt";

/// Failure classification ("malformed_json", "api_error", "model_error", "low_quality").
pub const FAILURE_KIND: &str = "failure_kind";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
