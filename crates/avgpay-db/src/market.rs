//! Market statistics computed from salary submissions.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use avgpay_core::{EnrichmentSubject, EntityType, Error, MarketContextProvider, MarketStats, Result};

use crate::entities::submission_fk;

/// Number of related labels listed in the context block.
const TOP_RELATED_LIMIT: i64 = 5;

/// Entity type whose names are listed as "most reported" for a subject.
fn related_entity(entity_type: EntityType) -> EntityType {
    match entity_type {
        EntityType::Company => EntityType::Job,
        EntityType::City => EntityType::Company,
        EntityType::Job => EntityType::Company,
    }
}

/// [`MarketContextProvider`] backed by `salary_submissions` percentiles.
#[derive(Clone)]
pub struct PgMarketContext {
    pool: Pool<Postgres>,
}

impl PgMarketContext {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Compute percentiles and the most reported related entities.
    pub async fn market_stats(&self, entity_type: EntityType, id: Uuid) -> Result<MarketStats> {
        let fk = submission_fk(entity_type);

        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS sample_size,
                    percentile_cont(0.25) WITHIN GROUP (ORDER BY total_compensation) AS p25,
                    percentile_cont(0.50) WITHIN GROUP (ORDER BY total_compensation) AS median,
                    percentile_cont(0.75) WITHIN GROUP (ORDER BY total_compensation) AS p75,
                    percentile_cont(0.90) WITHIN GROUP (ORDER BY total_compensation) AS p90
             FROM salary_submissions
             WHERE {} = $1",
            fk
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let related = related_entity(entity_type);
        let top_related: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT r.name
             FROM salary_submissions s
             JOIN {table} r ON r.id = s.{related_fk}
             WHERE s.{fk} = $1
             GROUP BY r.name
             ORDER BY COUNT(*) DESC, r.name ASC
             LIMIT $2",
            table = related.table(),
            related_fk = submission_fk(related),
            fk = fk,
        ))
        .bind(id)
        .bind(TOP_RELATED_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(MarketStats {
            sample_size: row.get("sample_size"),
            p25: row.get("p25"),
            median: row.get("median"),
            p75: row.get("p75"),
            p90: row.get("p90"),
            top_related,
        })
    }
}

#[async_trait]
impl MarketContextProvider for PgMarketContext {
    async fn market_context(&self, subject: &EnrichmentSubject) -> Result<String> {
        let stats = self.market_stats(subject.entity_type, subject.id).await?;
        Ok(stats.to_context_block(subject.entity_type.label(), &subject.name))
    }
}
