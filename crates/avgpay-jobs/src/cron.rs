//! One scheduled enrichment pass: sweep, then process within a time budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument};

use avgpay_core::defaults::{CRON_BUDGET_SECS, RECOVERY_BATCH_LIMIT};
use avgpay_core::Result;

use crate::processor::{EnrichmentProcessor, StopReason};
use crate::sweeper::RecoverySweeper;

/// Result of a cron pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronSummary {
    pub recovered: u64,
    pub requeued: u64,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped_reason: StopReason,
    pub elapsed_ms: u64,
}

/// Runs recovery and processing the way the external scheduler expects.
#[derive(Clone)]
pub struct CronRunner {
    processor: Arc<EnrichmentProcessor>,
    sweeper: RecoverySweeper,
    budget: Duration,
}

impl CronRunner {
    pub fn new(processor: Arc<EnrichmentProcessor>, sweeper: RecoverySweeper) -> Self {
        Self {
            processor,
            sweeper,
            budget: Duration::from_secs(CRON_BUDGET_SECS),
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Recover failed jobs, requeue stalled ones, then process pending jobs
    /// until the queue drains, the cap is hit or the budget is spent.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "cron", op = "run"))]
    pub async fn run(&self) -> Result<CronSummary> {
        let start = Instant::now();

        let recovered = self.sweeper.recover_failed(RECOVERY_BATCH_LIMIT).await?;
        let requeued = self.sweeper.requeue_stalled(RECOVERY_BATCH_LIMIT).await?;

        let remaining_budget = self.budget.saturating_sub(start.elapsed());
        let batch = self.processor.process_all(Some(remaining_budget)).await?;

        let summary = CronSummary {
            recovered,
            requeued,
            processed: batch.total_processed,
            succeeded: batch.succeeded,
            failed: batch.failed,
            stopped_reason: batch.stopped_reason,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            recovered = summary.recovered,
            requeued = summary.requeued,
            result_count = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = summary.elapsed_ms,
            "Cron enrichment pass finished"
        );
        Ok(summary)
    }
}
