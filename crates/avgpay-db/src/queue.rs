//! Enrichment queue repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use avgpay_core::{EnrichmentJob, EnrichmentQueue, EntityType, Error, QueueStats, Result};

const JOB_COLUMNS: &str = "id, entity_type, entity_id, entity_name, context, status, attempts, \
                           last_error, created_at, processed_at";

/// PostgreSQL implementation of [`EnrichmentQueue`].
#[derive(Clone)]
pub struct PgEnrichmentQueue {
    pool: Pool<Postgres>,
}

impl PgEnrichmentQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a queue row into an EnrichmentJob.
    fn parse_job_row(row: PgRow) -> Result<EnrichmentJob> {
        let entity_type: String = row.get("entity_type");
        let status: String = row.get("status");
        Ok(EnrichmentJob {
            id: row.get("id"),
            entity_type: entity_type.parse()?,
            entity_id: row.get("entity_id"),
            entity_name: row.get("entity_name"),
            context: row.get("context"),
            status: status.parse()?,
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            processed_at: row.get("processed_at"),
        })
    }

    /// Run a guarded terminal transition; errors if the job is not processing.
    async fn finish(&self, job_id: Uuid, status: &str, error: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = $1, last_error = $2, processed_at = $3
             WHERE id = $4 AND status = 'processing'",
        )
        .bind(status)
        .bind(error)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Job(format!(
                "job {} is not processing; cannot mark {}",
                job_id, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EnrichmentQueue for PgEnrichmentQueue {
    #[instrument(
        skip(self, context),
        fields(subsystem = "db", component = "queue", op = "queue_enrichment")
    )]
    async fn queue_enrichment(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_name: &str,
        context: Option<JsonValue>,
    ) -> Result<Option<Uuid>> {
        // idx_enrichment_queue_one_active arbitrates concurrent enqueues: the
        // loser of the race hits the conflict and returns no row.
        let job_id = Uuid::now_v7();
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO enrichment_queue
                 (id, entity_type, entity_id, entity_name, context, status, attempts, created_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6)
             ON CONFLICT (entity_type, entity_id) WHERE status IN ('pending', 'processing')
             DO NOTHING
             RETURNING id",
        )
        .bind(job_id)
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(entity_name)
        .bind(&context)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match inserted {
            Some(id) => debug!(job_id = %id, %entity_type, %entity_id, "Enrichment job queued"),
            None => debug!(%entity_type, %entity_id, "Active enrichment job exists, skipped"),
        }
        Ok(inserted)
    }

    async fn get_status(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Option<EnrichmentJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM enrichment_queue
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY created_at DESC
             LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<EnrichmentJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM enrichment_queue
             ORDER BY COALESCE(processed_at, created_at) DESC
             LIMIT $1",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_job_row).collect()
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) AS total
             FROM enrichment_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            processing: row.get::<i64, _>("processing"),
            completed: row.get::<i64, _>("completed"),
            failed: row.get::<i64, _>("failed"),
            total: row.get::<i64, _>("total"),
        })
    }

    #[instrument(skip(self), fields(subsystem = "db", component = "queue", op = "claim_next"))]
    async fn claim_next(&self) -> Result<Option<EnrichmentJob>> {
        // FOR UPDATE SKIP LOCKED lets overlapping cron invocations claim
        // different rows instead of racing for the same one.
        let row = sqlx::query(&format!(
            "UPDATE enrichment_queue
             SET status = 'processing', attempts = attempts + 1, processed_at = $1
             WHERE id = (
                 SELECT id FROM enrichment_queue
                 WHERE status = 'pending'
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        self.finish(job_id, "completed", None).await
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.finish(job_id, "failed", Some(error)).await
    }

    #[instrument(skip(self), fields(subsystem = "db", component = "queue", op = "recover_failed"))]
    async fn recover_failed(
        &self,
        failed_before: DateTime<Utc>,
        max_attempts: Option<i32>,
        limit: i64,
    ) -> Result<u64> {
        // Only the newest job per entity is revived; an older failure is moot
        // once a later job exists for the same key.
        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = 'pending', processed_at = NULL
             WHERE id IN (
                 SELECT q.id FROM enrichment_queue q
                 WHERE q.status = 'failed'
                   AND q.processed_at < $1
                   AND ($2::INTEGER IS NULL OR q.attempts < $2)
                   AND NOT EXISTS (
                       SELECT 1 FROM enrichment_queue newer
                       WHERE newer.entity_type = q.entity_type
                         AND newer.entity_id = q.entity_id
                         AND newer.created_at > q.created_at
                   )
                   AND NOT EXISTS (
                       SELECT 1 FROM enrichment_queue active
                       WHERE active.entity_type = q.entity_type
                         AND active.entity_id = q.entity_id
                         AND active.status IN ('pending', 'processing')
                   )
                 ORDER BY q.processed_at ASC
                 LIMIT $3
                 FOR UPDATE SKIP LOCKED
             )",
        )
        .bind(failed_before)
        .bind(max_attempts)
        .bind(limit)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!(result_count = recovered, "Failed enrichment jobs revived");
        }
        Ok(recovered)
    }

    #[instrument(skip(self), fields(subsystem = "db", component = "queue", op = "requeue_stalled"))]
    async fn requeue_stalled(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE enrichment_queue
             SET status = 'pending', processed_at = NULL,
                 last_error = 'requeued after stalling in processing'
             WHERE id IN (
                 SELECT id FROM enrichment_queue
                 WHERE status = 'processing' AND processed_at < $1
                 ORDER BY processed_at ASC
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )",
        )
        .bind(claimed_before)
        .bind(limit)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let requeued = result.rows_affected();
        if requeued > 0 {
            info!(result_count = requeued, "Stalled enrichment jobs requeued");
        }
        Ok(requeued)
    }
}
