//! Entity repository: the company, city and job-title rows that carry analysis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use avgpay_core::{
    AnalysisRecord, EnrichmentSubject, EntityCoverage, EntityRepository, EntityType, Error, Result,
};

/// Column on `salary_submissions` referencing the given entity type.
pub(crate) fn submission_fk(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Company => "company_id",
        EntityType::City => "city_id",
        EntityType::Job => "job_title_id",
    }
}

/// SQL predicate for "has renderable analysis" on alias `e`. A JSON `null`
/// and an empty object both count as missing.
const HAS_ANALYSIS: &str =
    "(e.analysis IS NOT NULL AND e.analysis NOT IN ('null'::jsonb, '{}'::jsonb))";

/// PostgreSQL implementation of [`EntityRepository`].
#[derive(Clone)]
pub struct PgEntityRepository {
    pool: Pool<Postgres>,
}

impl PgEntityRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn subject_select(entity_type: EntityType) -> String {
        format!(
            "SELECT e.id, e.name, {has} AS has_analysis, e.analysis_generated_at,
                    (SELECT COUNT(*) FROM salary_submissions s WHERE s.{fk} = e.id) AS submission_count
             FROM {table} e",
            has = HAS_ANALYSIS,
            fk = submission_fk(entity_type),
            table = entity_type.table(),
        )
    }

    fn parse_subject_row(entity_type: EntityType, row: PgRow) -> EnrichmentSubject {
        EnrichmentSubject {
            entity_type,
            id: row.get("id"),
            name: row.get("name"),
            has_analysis: row.get("has_analysis"),
            analysis_generated_at: row.get("analysis_generated_at"),
            submission_count: row.get("submission_count"),
        }
    }
}

#[async_trait]
impl EntityRepository for PgEntityRepository {
    async fn get_subject(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> Result<Option<EnrichmentSubject>> {
        let sql = format!("{} WHERE e.id = $1", Self::subject_select(entity_type));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|r| Self::parse_subject_row(entity_type, r)))
    }

    async fn save_analysis(
        &self,
        entity_type: EntityType,
        id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET analysis = $1, analysis_metadata = $2, analysis_generated_at = $3
             WHERE id = $4",
            entity_type.table()
        );
        let result = sqlx::query(&sql)
            .bind(&record.analysis)
            .bind(&record.metadata)
            .bind(record.generated_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} {}", entity_type.label(), id)));
        }

        debug!(
            subsystem = "db",
            component = "entities",
            op = "save_analysis",
            %entity_type,
            entity_id = %id,
            "Analysis saved"
        );
        Ok(())
    }

    async fn find_needing_analysis(
        &self,
        entity_type: EntityType,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EnrichmentSubject>> {
        // Entities already holding a pending or processing job are left out so
        // they cannot fill the scan window ahead of entities with no job.
        let sql = format!(
            "{} WHERE (NOT {has}
                    OR e.analysis_generated_at IS NULL
                    OR e.analysis_generated_at < $1)
               AND NOT EXISTS (
                   SELECT 1 FROM enrichment_queue q
                   WHERE q.entity_type = $3
                     AND q.entity_id = e.id
                     AND q.status IN ('pending', 'processing')
               )
             ORDER BY e.analysis_generated_at ASC NULLS FIRST, e.name ASC
             LIMIT $2",
            Self::subject_select(entity_type),
            has = HAS_ANALYSIS,
        );
        let rows = sqlx::query(&sql)
            .bind(stale_before)
            .bind(limit)
            .bind(entity_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| Self::parse_subject_row(entity_type, r))
            .collect())
    }

    async fn coverage(&self, entity_type: EntityType) -> Result<EntityCoverage> {
        let sql = format!(
            "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE {}) AS with_analysis FROM {} e",
            HAS_ANALYSIS,
            entity_type.table()
        );
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(EntityCoverage {
            entity_type,
            total: row.get::<i64, _>("total"),
            with_analysis: row.get::<i64, _>("with_analysis"),
        })
    }
}
