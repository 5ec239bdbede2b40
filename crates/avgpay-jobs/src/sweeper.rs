//! Recovery sweeper: revive failed jobs after a fixed backoff window and
//! requeue jobs stranded in `processing`.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, instrument};

use avgpay_core::defaults::{MAX_ATTEMPTS, RECOVERY_BACKOFF_SECS, STALLED_AFTER_SECS};
use avgpay_core::{EnrichmentQueue, Error, Result};

/// Configuration for the recovery sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Seconds a failed job waits before it may be retried.
    pub backoff_secs: u64,
    /// Jobs with this many attempts are no longer revived. `None` retries
    /// forever.
    pub max_attempts: Option<i32>,
    /// Seconds after which a `processing` job counts as stalled.
    pub stalled_after_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            backoff_secs: RECOVERY_BACKOFF_SECS,
            max_attempts: Some(MAX_ATTEMPTS),
            stalled_after_secs: STALLED_AFTER_SECS,
        }
    }
}

impl SweeperConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ENRICHMENT_BACKOFF_SECS` | `3600` | Fixed retry window for failed jobs |
    /// | `ENRICHMENT_MAX_ATTEMPTS` | `5` | Attempt cutoff; `0` disables it |
    /// | `ENRICHMENT_STALLED_SECS` | `900` | Age at which processing jobs are requeued |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backoff_secs = std::env::var("ENRICHMENT_BACKOFF_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.backoff_secs);

        let max_attempts = match std::env::var("ENRICHMENT_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
        {
            Some(n) if n <= 0 => None,
            Some(n) => Some(n),
            None => defaults.max_attempts,
        };

        let stalled_after_secs = std::env::var("ENRICHMENT_STALLED_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.stalled_after_secs);

        Self {
            backoff_secs,
            max_attempts,
            stalled_after_secs,
        }
    }

    pub fn with_backoff_secs(mut self, secs: u64) -> Self {
        self.backoff_secs = secs;
        self
    }

    pub fn with_max_attempts(mut self, max: Option<i32>) -> Self {
        self.max_attempts = max.filter(|n| *n > 0);
        self
    }

    pub fn with_stalled_after_secs(mut self, secs: u64) -> Self {
        self.stalled_after_secs = secs;
        self
    }
}

/// Windows longer than this are treated as this long (about a century).
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn seconds_ago(secs: u64) -> chrono::DateTime<Utc> {
    Utc::now() - ChronoDuration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

/// Resets failed and stalled jobs back to `pending`.
#[derive(Clone)]
pub struct RecoverySweeper {
    queue: Arc<dyn EnrichmentQueue>,
    config: SweeperConfig,
}

impl RecoverySweeper {
    pub fn new(queue: Arc<dyn EnrichmentQueue>) -> Self {
        Self {
            queue,
            config: SweeperConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SweeperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Revive up to `limit` failed jobs whose last attempt is older than the
    /// backoff window.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "sweeper", op = "recover_failed"))]
    pub async fn recover_failed(&self, limit: i64) -> Result<u64> {
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be at least 1".to_string()));
        }

        let recovered = self
            .queue
            .recover_failed(
                seconds_ago(self.config.backoff_secs),
                self.config.max_attempts,
                limit,
            )
            .await?;

        if recovered > 0 {
            info!(
                result_count = recovered,
                backoff_secs = self.config.backoff_secs,
                "Recovered failed enrichment jobs"
            );
        }
        Ok(recovered)
    }

    /// Requeue up to `limit` jobs claimed longer ago than the stall window.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "sweeper", op = "requeue_stalled"))]
    pub async fn requeue_stalled(&self, limit: i64) -> Result<u64> {
        if limit < 1 {
            return Err(Error::InvalidInput("limit must be at least 1".to_string()));
        }

        let requeued = self
            .queue
            .requeue_stalled(seconds_ago(self.config.stalled_after_secs), limit)
            .await?;

        if requeued > 0 {
            info!(
                result_count = requeued,
                stalled_after_secs = self.config.stalled_after_secs,
                "Requeued stalled enrichment jobs"
            );
        }
        Ok(requeued)
    }
}
