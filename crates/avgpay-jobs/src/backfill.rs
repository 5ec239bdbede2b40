//! Bulk enqueue of entities with missing or stale analysis.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use avgpay_core::defaults::{BACKFILL_CEILING_MAX, STALE_ANALYSIS_DAYS};
use avgpay_core::{trigger_reason, EnrichmentQueue, EntityRepository, EntityType, Result, TriggerInput};

/// Jobs queued per entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueuedCounts {
    pub company: u64,
    pub city: u64,
    pub job: u64,
}

impl QueuedCounts {
    fn bump(&mut self, entity_type: EntityType) {
        match entity_type {
            EntityType::Company => self.company += 1,
            EntityType::City => self.city += 1,
            EntityType::Job => self.job += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.company + self.city + self.job
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub queued: QueuedCounts,
    /// Candidates that gained an active job between the scan and the enqueue.
    pub skipped: u64,
    /// Candidates examined.
    pub scanned: u64,
}

/// Scans companies, cities and jobs (in that order) for analysis that is
/// missing or older than the staleness window.
#[derive(Clone)]
pub struct Backfill {
    queue: Arc<dyn EnrichmentQueue>,
    entities: Arc<dyn EntityRepository>,
}

impl Backfill {
    pub fn new(queue: Arc<dyn EnrichmentQueue>, entities: Arc<dyn EntityRepository>) -> Self {
        Self { queue, entities }
    }

    /// Queue at most `ceiling` jobs. The ceiling is clamped to
    /// `1..=BACKFILL_CEILING_MAX`.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "backfill", op = "run"))]
    pub async fn run(&self, ceiling: i64) -> Result<BackfillSummary> {
        let ceiling = ceiling.clamp(1, BACKFILL_CEILING_MAX) as u64;
        let now = Utc::now();
        let stale_before = now - ChronoDuration::days(STALE_ANALYSIS_DAYS);
        let mut summary = BackfillSummary::default();

        for entity_type in EntityType::ALL {
            let remaining = ceiling - summary.queued.total();
            if remaining == 0 {
                break;
            }

            let candidates = self
                .entities
                .find_needing_analysis(entity_type, stale_before, remaining as i64)
                .await?;

            for subject in candidates {
                summary.scanned += 1;
                let reason = trigger_reason(&TriggerInput::from(&subject), now)
                    .map(|r| r.as_str())
                    .unwrap_or("stale");
                let queued = self
                    .queue
                    .queue_enrichment(
                        subject.entity_type,
                        subject.id,
                        &subject.name,
                        Some(json!({ "source": "backfill", "reason": reason })),
                    )
                    .await?;
                match queued {
                    Some(_) => summary.queued.bump(entity_type),
                    None => summary.skipped += 1,
                }
            }
        }

        info!(
            result_count = summary.queued.total(),
            skipped = summary.skipped,
            scanned = summary.scanned,
            ceiling,
            "Backfill complete"
        );
        Ok(summary)
    }
}
