//! Core traits for the enrichment pipeline.
//!
//! The processor, sweeper and triggers only see these traits, so the binary
//! can wire in Postgres and HTTP backends while tests wire in fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// QUEUE
// =============================================================================

/// Persistent enrichment job queue.
#[async_trait]
pub trait EnrichmentQueue: Send + Sync {
    /// Queue a job unless one is already pending or processing for the same
    /// entity. Returns the new job id, or `None` when skipped.
    async fn queue_enrichment(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_name: &str,
        context: Option<JsonValue>,
    ) -> Result<Option<Uuid>>;

    /// Most recent job for an entity, if any.
    async fn get_status(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Option<EnrichmentJob>>;

    /// Most recently created or processed jobs.
    async fn list_recent(&self, limit: i64) -> Result<Vec<EnrichmentJob>>;

    /// Queue depth by status.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Atomically claim the oldest pending job, marking it `processing` and
    /// incrementing its attempt counter.
    async fn claim_next(&self) -> Result<Option<EnrichmentJob>>;

    /// Mark a processing job as completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Mark a processing job as failed with an error message.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Reset up to `limit` failed jobs processed before `failed_before` back
    /// to pending. Jobs whose attempts reached `max_attempts` are left alone.
    async fn recover_failed(
        &self,
        failed_before: DateTime<Utc>,
        max_attempts: Option<i32>,
        limit: i64,
    ) -> Result<u64>;

    /// Reset up to `limit` jobs stuck in `processing` since before
    /// `claimed_before` back to pending.
    async fn requeue_stalled(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<u64>;
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Access to the company/city/job rows that receive analysis.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Load the enrichment view of an entity.
    async fn get_subject(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> Result<Option<EnrichmentSubject>>;

    /// Persist analysis and metadata onto the entity row.
    async fn save_analysis(
        &self,
        entity_type: EntityType,
        id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<()>;

    /// Entities with no analysis or analysis generated before `stale_before`,
    /// oldest first.
    async fn find_needing_analysis(
        &self,
        entity_type: EntityType,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EnrichmentSubject>>;

    /// Total vs. analysed entity counts.
    async fn coverage(&self, entity_type: EntityType) -> Result<EntityCoverage>;
}

/// Supplies the market-statistics block embedded in generation prompts.
#[async_trait]
pub trait MarketContextProvider: Send + Sync {
    /// Pre-formatted text summarizing compensation data for the subject.
    async fn market_context(&self, subject: &EnrichmentSubject) -> Result<String>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    /// Generate text with system context. An empty `system` sends none.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Provider family name ("anthropic", "openai").
    fn provider_name(&self) -> &str;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
