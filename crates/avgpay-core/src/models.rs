//! Data models for the enrichment queue and the entities it enriches.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Kind of entity eligible for AI-generated analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    City,
    Job,
}

impl EntityType {
    /// All entity types, in the order used by health and backfill reports.
    pub const ALL: [EntityType; 3] = [EntityType::Company, EntityType::City, EntityType::Job];

    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::City => "city",
            EntityType::Job => "job",
        }
    }

    /// Human-readable label used in prompts and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Company => "Company",
            EntityType::City => "City",
            EntityType::Job => "Job",
        }
    }

    /// Table that owns rows of this entity type.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Company => "companies",
            EntityType::City => "cities",
            EntityType::Job => "job_titles",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "company" | "companies" => Ok(EntityType::Company),
            "city" | "cities" => Ok(EntityType::City),
            "job" | "jobs" => Ok(EntityType::Job),
            other => Err(Error::InvalidInput(format!("unknown entity type '{}'", other))),
        }
    }
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Enrichment job lifecycle: `pending -> processing -> {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Processing => "processing",
            EnrichmentStatus::Completed => "completed",
            EnrichmentStatus::Failed => "failed",
        }
    }

    /// Pending and processing jobs count against de-duplication.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EnrichmentStatus::Pending | EnrichmentStatus::Processing
        )
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrichmentStatus::Pending),
            "processing" => Ok(EnrichmentStatus::Processing),
            "completed" => Ok(EnrichmentStatus::Completed),
            "failed" => Ok(EnrichmentStatus::Failed),
            other => Err(Error::Serialization(format!(
                "unknown enrichment status '{}'",
                other
            ))),
        }
    }
}

/// A row in the enrichment queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    /// Display name captured at enqueue time.
    pub entity_name: String,
    pub context: Option<JsonValue>,
    pub status: EnrichmentStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl EnrichmentJob {
    /// Stable key identifying the enriched entity, e.g. `company:0190...`.
    pub fn entity_key(&self) -> String {
        entity_key(self.entity_type, self.entity_id)
    }
}

/// Build the `<type>:<id>` key for an entity.
pub fn entity_key(entity_type: EntityType, entity_id: Uuid) -> String {
    format!("{}:{}", entity_type, entity_id)
}

/// Wire shape of a job returned by status and diagnostics endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub entity_key: String,
    pub status: EnrichmentStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&EnrichmentJob> for JobView {
    fn from(job: &EnrichmentJob) -> Self {
        Self {
            id: job.id,
            entity_type: job.entity_type,
            entity_name: job.entity_name.clone(),
            entity_key: job.entity_key(),
            status: job.status,
            attempts: job.attempts,
            last_error: job.last_error.clone(),
            created_at: job.created_at,
            processed_at: job.processed_at,
        }
    }
}

impl From<EnrichmentJob> for JobView {
    fn from(job: EnrichmentJob) -> Self {
        JobView::from(&job)
    }
}

/// Queue depth by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub total: i64,
}

// =============================================================================
// ENTITY SNAPSHOTS
// =============================================================================

/// Snapshot of an entity as seen by the enrichment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSubject {
    pub entity_type: EntityType,
    pub id: Uuid,
    pub name: String,
    /// True when the entity has a stored analysis that pages can render.
    pub has_analysis: bool,
    pub analysis_generated_at: Option<DateTime<Utc>>,
    pub submission_count: i64,
}

/// Analysis written back onto an entity row after a successful job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Narrative sections keyed by name.
    pub analysis: JsonValue,
    /// FAQ, confidence, sources, disclaimer and generation provenance.
    pub metadata: JsonValue,
    pub generated_at: DateTime<Utc>,
}

/// Analysis coverage for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCoverage {
    pub entity_type: EntityType,
    pub total: i64,
    pub with_analysis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_job() -> EnrichmentJob {
        EnrichmentJob {
            id: Uuid::nil(),
            entity_type: EntityType::City,
            entity_id: Uuid::from_u128(7),
            entity_name: "Austin, TX".to_string(),
            context: None,
            status: EnrichmentStatus::Failed,
            attempts: 2,
            last_error: Some("all 2 models failed".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            processed_at: None,
        }
    }

    #[test]
    fn test_entity_type_parse_accepts_singular_and_plural() {
        assert_eq!("company".parse::<EntityType>().unwrap(), EntityType::Company);
        assert_eq!("Cities".parse::<EntityType>().unwrap(), EntityType::City);
        assert_eq!("JOB".parse::<EntityType>().unwrap(), EntityType::Job);
        assert!("region".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_entity_type_tables() {
        assert_eq!(EntityType::Company.table(), "companies");
        assert_eq!(EntityType::City.table(), "cities");
        assert_eq!(EntityType::Job.table(), "job_titles");
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!(
            "processing".parse::<EnrichmentStatus>().unwrap(),
            EnrichmentStatus::Processing
        );
        assert!("running".parse::<EnrichmentStatus>().is_err());
    }

    #[test]
    fn test_status_is_active() {
        assert!(EnrichmentStatus::Pending.is_active());
        assert!(EnrichmentStatus::Processing.is_active());
        assert!(!EnrichmentStatus::Completed.is_active());
        assert!(!EnrichmentStatus::Failed.is_active());
    }

    #[test]
    fn test_entity_key_format() {
        let job = sample_job();
        assert_eq!(
            job.entity_key(),
            "city:00000000-0000-0000-0000-000000000007"
        );
    }

    #[test]
    fn test_job_view_wire_shape() {
        let view = JobView::from(sample_job());
        let json = serde_json::to_value(&view).unwrap();

        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "attempts",
                "createdAt",
                "entityKey",
                "entityName",
                "entityType",
                "id",
                "lastError",
                "processedAt",
                "status",
            ]
        );
        assert_eq!(json["entityType"], "city");
        assert_eq!(json["status"], "failed");
        assert!(json["processedAt"].is_null());
    }

    #[test]
    fn test_coverage_serializes_camel_case() {
        let cov = EntityCoverage {
            entity_type: EntityType::Job,
            total: 10,
            with_analysis: 4,
        };
        let json = serde_json::to_value(&cov).unwrap();
        assert_eq!(json["entityType"], "job");
        assert_eq!(json["withAnalysis"], 4);
    }
}
