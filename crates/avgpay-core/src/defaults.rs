//! Centralized default constants for the enrichment service.
//!
//! Config structs in the other crates fall back to these values when the
//! matching environment variable is unset.

// =============================================================================
// TRIGGERS
// =============================================================================

/// Analysis older than this many days is considered stale.
pub const STALE_ANALYSIS_DAYS: i64 = 90;

/// Every Nth salary submission on an entity triggers a refresh.
pub const REFRESH_EVERY_N_SUBMISSIONS: i64 = 25;

// =============================================================================
// QUEUE / SWEEPER
// =============================================================================

/// Fixed backoff before a failed job becomes eligible for recovery.
pub const RECOVERY_BACKOFF_SECS: u64 = 60 * 60;

/// Jobs with this many attempts are no longer revived. Zero disables the cutoff.
pub const MAX_ATTEMPTS: i32 = 5;

/// A job left in `processing` longer than this is considered abandoned.
pub const STALLED_AFTER_SECS: u64 = 15 * 60;

/// Default number of failed jobs revived per sweep.
pub const RECOVERY_BATCH_LIMIT: i64 = 50;

/// Default page size for the recent-jobs diagnostics listing.
pub const RECENT_JOBS_LIMIT: i64 = 20;

/// Upper bound for the recent-jobs listing.
pub const RECENT_JOBS_MAX: i64 = 100;

// =============================================================================
// PROCESSOR
// =============================================================================

/// Maximum jobs handled by one `process_all_pending` call.
pub const PROCESS_ALL_CAP: usize = 50;

/// Request-duration budget for the cron route.
pub const CRON_BUDGET_SECS: u64 = 240;

// =============================================================================
// BACKFILL
// =============================================================================

/// Default number of jobs enqueued by one backfill call.
pub const BACKFILL_CEILING: i64 = 100;

/// Hard maximum a caller may request for one backfill call.
pub const BACKFILL_CEILING_MAX: i64 = 500;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default fallback chain, highest priority first.
pub const MODEL_CHAIN: &str = "anthropic:claude-3-5-haiku-latest,openai:gpt-4o-mini";

/// HTTP timeout for a single provider call.
pub const LLM_TIMEOUT_SECS: u64 = 120;

/// Maximum tokens requested from a provider.
pub const LLM_MAX_TOKENS: u32 = 2048;

/// Sampling temperature for analysis generation.
pub const LLM_TEMPERATURE: f32 = 0.4;

// =============================================================================
// QUALITY GATE
// =============================================================================

/// Minimum trimmed length of each required narrative section.
pub const MIN_SECTION_CHARS: usize = 40;

/// Disclaimer stored when the model omits one.
pub const DEFAULT_DISCLAIMER: &str = "This analysis is generated from aggregated, self-reported \
salary submissions and may not reflect every employer or role. Verify figures before making \
compensation decisions.";
