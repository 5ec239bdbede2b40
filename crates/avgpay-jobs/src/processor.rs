//! Enrichment processor: claim a job, generate analysis, write it back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use avgpay_core::defaults::PROCESS_ALL_CAP;
use avgpay_core::{
    EnrichmentJob, EnrichmentQueue, EnrichmentStatus, EntityRepository, EntityType, Error,
    MarketContextProvider, Result,
};
use avgpay_inference::FallbackClient;

use crate::analysis::record_from_success;
use crate::prompts::{build_prompt, SYSTEM_PROMPT};
use crate::quality::check_quality;

/// Capacity of the processor event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// CONFIG
// =============================================================================

/// Configuration for the enrichment processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Upper bound on jobs handled by one `process_all` call.
    pub process_all_cap: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            process_all_cap: PROCESS_ALL_CAP,
        }
    }
}

impl ProcessorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ENRICHMENT_PROCESS_ALL_CAP` | `50` | Max jobs per process-all call |
    pub fn from_env() -> Self {
        let process_all_cap = std::env::var("ENRICHMENT_PROCESS_ALL_CAP")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(PROCESS_ALL_CAP)
            .max(1);

        Self { process_all_cap }
    }

    pub fn with_process_all_cap(mut self, cap: usize) -> Self {
        self.process_all_cap = cap.max(1);
        self
    }
}

// =============================================================================
// EVENTS AND RESULTS
// =============================================================================

/// Event emitted by the processor.
#[derive(Debug, Clone)]
pub enum EnrichmentEvent {
    JobStarted {
        job_id: Uuid,
        entity_type: EntityType,
        entity_name: String,
    },
    JobCompleted {
        job_id: Uuid,
        entity_type: EntityType,
        provider: String,
        model: String,
        duration_ms: u64,
    },
    JobFailed {
        job_id: Uuid,
        entity_type: EntityType,
        error: String,
    },
}

/// Result of a single `process_next` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EnrichmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessOutcome {
    /// Nothing was pending.
    pub fn idle() -> Self {
        Self::default()
    }

    fn finished(job: &EnrichmentJob, status: EnrichmentStatus, error: Option<String>) -> Self {
        Self {
            processed: true,
            job_id: Some(job.id),
            status: Some(status),
            entity_type: Some(job.entity_type),
            entity_name: Some(job.entity_name.clone()),
            error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == Some(EnrichmentStatus::Completed)
    }
}

/// Why a batch run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QueueEmpty,
    CapReached,
    BudgetExhausted,
}

/// Aggregate of a `process_all` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAllSummary {
    pub total_processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pending jobs left after the run.
    pub remaining: i64,
    pub stopped_reason: StopReason,
}

struct Generated {
    provider: String,
    model: String,
}

// =============================================================================
// PROCESSOR
// =============================================================================

/// Drives jobs through `pending -> processing -> completed | failed`.
pub struct EnrichmentProcessor {
    queue: Arc<dyn EnrichmentQueue>,
    entities: Arc<dyn EntityRepository>,
    market: Arc<dyn MarketContextProvider>,
    llm: Arc<FallbackClient>,
    config: ProcessorConfig,
    event_tx: broadcast::Sender<EnrichmentEvent>,
}

impl EnrichmentProcessor {
    pub fn new(
        queue: Arc<dyn EnrichmentQueue>,
        entities: Arc<dyn EntityRepository>,
        market: Arc<dyn MarketContextProvider>,
        llm: Arc<FallbackClient>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queue,
            entities,
            market,
            llm,
            config: ProcessorConfig::default(),
            event_tx,
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Get a receiver for processor events.
    pub fn events(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.event_tx.subscribe()
    }

    /// Claim and process the oldest pending job.
    ///
    /// Per-job failures (chain exhausted, missing entity, unusable output)
    /// are written to the job and reported in the outcome. Store failures
    /// are returned as errors.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "processor", op = "process_next"))]
    pub async fn process_next(&self) -> Result<ProcessOutcome> {
        let Some(job) = self.queue.claim_next().await? else {
            debug!("No pending enrichment jobs");
            return Ok(ProcessOutcome::idle());
        };

        let start = Instant::now();
        info!(
            job_id = %job.id,
            entity_type = %job.entity_type,
            entity_id = %job.entity_id,
            attempt = job.attempts,
            "Processing enrichment job"
        );
        let _ = self.event_tx.send(EnrichmentEvent::JobStarted {
            job_id: job.id,
            entity_type: job.entity_type,
            entity_name: job.entity_name.clone(),
        });

        match self.enrich(&job).await {
            Ok(generated) => {
                self.queue.complete(job.id).await?;
                let duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    job_id = %job.id,
                    entity_type = %job.entity_type,
                    provider = %generated.provider,
                    model = %generated.model,
                    duration_ms,
                    "Enrichment job completed"
                );
                let _ = self.event_tx.send(EnrichmentEvent::JobCompleted {
                    job_id: job.id,
                    entity_type: job.entity_type,
                    provider: generated.provider,
                    model: generated.model,
                    duration_ms,
                });
                Ok(ProcessOutcome::finished(
                    &job,
                    EnrichmentStatus::Completed,
                    None,
                ))
            }
            Err(e) if e.is_infrastructure() => {
                error!(job_id = %job.id, error = %e, "Infrastructure failure during enrichment");
                // Best effort; the stalled-job sweep picks it up otherwise.
                if let Err(mark_err) = self.queue.fail(job.id, &e.to_string()).await {
                    warn!(job_id = %job.id, error = %mark_err, "Failed to mark job as failed");
                }
                Err(e)
            }
            Err(e) => {
                let message = failure_message(&e);
                self.queue.fail(job.id, &message).await?;
                warn!(
                    job_id = %job.id,
                    entity_type = %job.entity_type,
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %message,
                    "Enrichment job failed"
                );
                let _ = self.event_tx.send(EnrichmentEvent::JobFailed {
                    job_id: job.id,
                    entity_type: job.entity_type,
                    error: message.clone(),
                });
                Ok(ProcessOutcome::finished(
                    &job,
                    EnrichmentStatus::Failed,
                    Some(message),
                ))
            }
        }
    }

    /// Generate and persist analysis for a claimed job.
    async fn enrich(&self, job: &EnrichmentJob) -> Result<Generated> {
        let subject = self
            .entities
            .get_subject(job.entity_type, job.entity_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "{} {} not found",
                    job.entity_type.label(),
                    job.entity_id
                ))
            })?;

        let market_context = self.market.market_context(&subject).await?;
        let prompt = build_prompt(&subject, &market_context);
        let entity_type = job.entity_type;

        let success = self
            .llm
            .generate_with_fallback(SYSTEM_PROMPT, &prompt, |content| {
                check_quality(entity_type, content)
            })
            .await?;

        let record = record_from_success(&success, Utc::now())?;
        self.entities
            .save_analysis(job.entity_type, job.entity_id, &record)
            .await?;

        Ok(Generated {
            provider: success.provider,
            model: success.model,
        })
    }

    /// Process pending jobs until the queue is empty, the cap is reached,
    /// or `budget` (when given) has elapsed. A job already started always
    /// runs to completion.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "processor", op = "process_all"))]
    pub async fn process_all(&self, budget: Option<Duration>) -> Result<ProcessAllSummary> {
        let start = Instant::now();
        let cap = self.config.process_all_cap;
        let mut total_processed = 0;
        let mut succeeded = 0;
        let mut failed = 0;

        let stopped_reason = loop {
            if total_processed >= cap {
                break StopReason::CapReached;
            }
            if budget.is_some_and(|b| start.elapsed() >= b) {
                break StopReason::BudgetExhausted;
            }

            let outcome = self.process_next().await?;
            if !outcome.processed {
                break StopReason::QueueEmpty;
            }
            total_processed += 1;
            if outcome.succeeded() {
                succeeded += 1;
            } else {
                failed += 1;
            }
        };

        let remaining = self.queue.queue_stats().await?.pending;
        info!(
            result_count = total_processed,
            succeeded,
            failed,
            remaining,
            stopped_reason = ?stopped_reason,
            duration_ms = start.elapsed().as_millis() as u64,
            "Processed pending enrichment jobs"
        );

        Ok(ProcessAllSummary {
            total_processed,
            succeeded,
            failed,
            remaining,
            stopped_reason,
        })
    }
}

/// Message stored as `last_error` for a per-job failure.
fn failure_message(err: &Error) -> String {
    match err {
        Error::Inference(m) | Error::NotFound(m) | Error::Job(m) => m.clone(),
        other => other.to_string(),
    }
}
