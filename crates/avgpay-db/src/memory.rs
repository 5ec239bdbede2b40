//! In-memory store implementing the queue, entity and market-context traits.
//!
//! Mirrors the Postgres semantics (active-job de-duplication, oldest-first
//! claim, guarded terminal transitions, newest-job-only recovery) so that
//! processor and route tests exercise the same behavior without a database.
//! Also backs local runs started with `DATABASE_URL=memory`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use avgpay_core::{
    AnalysisRecord, EnrichmentJob, EnrichmentQueue, EnrichmentStatus, EnrichmentSubject,
    EntityCoverage, EntityRepository, EntityType, Error, MarketContextProvider, MarketStats,
    QueueStats, Result,
};

#[derive(Debug, Clone)]
struct MemoryEntity {
    name: String,
    analysis: Option<AnalysisRecord>,
    submissions: Vec<f64>,
    related: Vec<String>,
}

#[derive(Default)]
struct MemoryState {
    jobs: Vec<EnrichmentJob>,
    entities: HashMap<(EntityType, Uuid), MemoryEntity>,
}

/// Thread-safe in-memory enrichment store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    // ─── Seeding and inspection ────────────────────────────────────────────

    /// Add an entity without analysis.
    pub fn add_entity(&self, entity_type: EntityType, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        self.lock().entities.insert(
            (entity_type, id),
            MemoryEntity {
                name: name.to_string(),
                analysis: None,
                submissions: Vec::new(),
                related: Vec::new(),
            },
        );
        id
    }

    /// Add an entity whose analysis was generated at `generated_at`.
    pub fn add_entity_with_analysis(
        &self,
        entity_type: EntityType,
        name: &str,
        generated_at: DateTime<Utc>,
    ) -> Uuid {
        let id = self.add_entity(entity_type, name);
        if let Some(entity) = self.lock().entities.get_mut(&(entity_type, id)) {
            entity.analysis = Some(AnalysisRecord {
                analysis: serde_json::json!({ "summary": format!("Existing analysis for {}", name) }),
                metadata: serde_json::json!({}),
                generated_at,
            });
        }
        id
    }

    /// Attach salary submissions (total compensation values) to an entity.
    pub fn add_submissions(&self, entity_type: EntityType, id: Uuid, values: &[f64]) {
        if let Some(entity) = self.lock().entities.get_mut(&(entity_type, id)) {
            entity.submissions.extend_from_slice(values);
        }
    }

    /// Set the related labels reported as "most reported" in market context.
    pub fn set_related(&self, entity_type: EntityType, id: Uuid, related: &[&str]) {
        if let Some(entity) = self.lock().entities.get_mut(&(entity_type, id)) {
            entity.related = related.iter().map(|s| s.to_string()).collect();
        }
    }

    /// Stored analysis for an entity.
    pub fn analysis(&self, entity_type: EntityType, id: Uuid) -> Option<AnalysisRecord> {
        self.lock()
            .entities
            .get(&(entity_type, id))
            .and_then(|e| e.analysis.clone())
    }

    /// Snapshot of every job, in insertion order.
    pub fn jobs(&self) -> Vec<EnrichmentJob> {
        self.lock().jobs.clone()
    }

    pub fn job(&self, job_id: Uuid) -> Option<EnrichmentJob> {
        self.lock().jobs.iter().find(|j| j.id == job_id).cloned()
    }

    /// Override a job's `processed_at`, for backoff and stall scenarios.
    pub fn set_processed_at(&self, job_id: Uuid, processed_at: DateTime<Utc>) {
        if let Some(job) = self.lock().jobs.iter_mut().find(|j| j.id == job_id) {
            job.processed_at = Some(processed_at);
        }
    }

    /// Override a job's attempt counter.
    pub fn set_attempts(&self, job_id: Uuid, attempts: i32) {
        if let Some(job) = self.lock().jobs.iter_mut().find(|j| j.id == job_id) {
            job.attempts = attempts;
        }
    }

    /// Number of mutating operations applied since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every trait call fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn subject_of(entity_type: EntityType, id: Uuid, entity: &MemoryEntity) -> EnrichmentSubject {
        EnrichmentSubject {
            entity_type,
            id,
            name: entity.name.clone(),
            has_analysis: has_renderable(entity.analysis.as_ref()),
            analysis_generated_at: entity.analysis.as_ref().map(|a| a.generated_at),
            submission_count: entity.submissions.len() as i64,
        }
    }

    fn finish(&self, job_id: Uuid, status: EnrichmentStatus, error: Option<&str>) -> Result<()> {
        self.check_available()?;
        let mut state = self.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == EnrichmentStatus::Processing)
            .ok_or_else(|| {
                Error::Job(format!(
                    "job {} is not processing; cannot mark {}",
                    job_id, status
                ))
            })?;
        job.status = status;
        job.last_error = error.map(str::to_string);
        job.processed_at = Some(Utc::now());
        drop(state);
        self.record_write();
        Ok(())
    }
}

fn has_renderable(analysis: Option<&AnalysisRecord>) -> bool {
    match analysis {
        Some(record) => match &record.analysis {
            JsonValue::Null => false,
            JsonValue::Object(map) => !map.is_empty(),
            _ => true,
        },
        None => false,
    }
}

/// Linear-interpolated percentile over sorted values, as `percentile_cont`.
fn percentile_cont(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

#[async_trait]
impl EnrichmentQueue for MemoryStore {
    async fn queue_enrichment(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_name: &str,
        context: Option<JsonValue>,
    ) -> Result<Option<Uuid>> {
        self.check_available()?;
        let mut state = self.lock();
        let active = state.jobs.iter().any(|j| {
            j.entity_type == entity_type && j.entity_id == entity_id && j.status.is_active()
        });
        if active {
            return Ok(None);
        }

        let id = Uuid::now_v7();
        state.jobs.push(EnrichmentJob {
            id,
            entity_type,
            entity_id,
            entity_name: entity_name.to_string(),
            context,
            status: EnrichmentStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        });
        drop(state);
        self.record_write();
        Ok(Some(id))
    }

    async fn get_status(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Option<EnrichmentJob>> {
        self.check_available()?;
        Ok(self
            .lock()
            .jobs
            .iter()
            .rev()
            .find(|j| j.entity_type == entity_type && j.entity_id == entity_id)
            .cloned())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<EnrichmentJob>> {
        self.check_available()?;
        let mut jobs = self.lock().jobs.clone();
        // Reversing a stable sort puts later insertions first among ties.
        jobs.sort_by_key(|j| j.processed_at.unwrap_or(j.created_at));
        jobs.reverse();
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        self.check_available()?;
        let state = self.lock();
        let mut stats = QueueStats::default();
        for job in &state.jobs {
            match job.status {
                EnrichmentStatus::Pending => stats.pending += 1,
                EnrichmentStatus::Processing => stats.processing += 1,
                EnrichmentStatus::Completed => stats.completed += 1,
                EnrichmentStatus::Failed => stats.failed += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }

    async fn claim_next(&self) -> Result<Option<EnrichmentJob>> {
        self.check_available()?;
        let mut state = self.lock();
        let next = state
            .jobs
            .iter_mut()
            .enumerate()
            .filter(|(_, j)| j.status == EnrichmentStatus::Pending)
            .min_by_key(|(idx, j)| (j.created_at, *idx))
            .map(|(_, j)| j);

        let claimed = match next {
            Some(job) => {
                job.status = EnrichmentStatus::Processing;
                job.attempts += 1;
                job.processed_at = Some(Utc::now());
                job.clone()
            }
            None => return Ok(None),
        };
        drop(state);
        self.record_write();
        Ok(Some(claimed))
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        self.finish(job_id, EnrichmentStatus::Completed, None)
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.finish(job_id, EnrichmentStatus::Failed, Some(error))
    }

    async fn recover_failed(
        &self,
        failed_before: DateTime<Utc>,
        max_attempts: Option<i32>,
        limit: i64,
    ) -> Result<u64> {
        self.check_available()?;
        let mut state = self.lock();

        let mut eligible: Vec<(DateTime<Utc>, usize)> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == EnrichmentStatus::Failed)
            .filter(|(_, j)| j.processed_at.is_some_and(|ts| ts < failed_before))
            .filter(|(_, j)| max_attempts.map_or(true, |max| j.attempts < max))
            .filter(|(_, j)| {
                !state.jobs.iter().any(|other| {
                    other.entity_type == j.entity_type
                        && other.entity_id == j.entity_id
                        && (other.created_at > j.created_at || other.status.is_active())
                })
            })
            .filter_map(|(idx, j)| j.processed_at.map(|ts| (ts, idx)))
            .collect();
        eligible.sort();
        eligible.truncate(limit.max(0) as usize);

        for (_, idx) in &eligible {
            let job = &mut state.jobs[*idx];
            job.status = EnrichmentStatus::Pending;
            job.processed_at = None;
        }
        drop(state);

        if !eligible.is_empty() {
            self.record_write();
        }
        Ok(eligible.len() as u64)
    }

    async fn requeue_stalled(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<u64> {
        self.check_available()?;
        let mut state = self.lock();

        let mut stalled: Vec<(DateTime<Utc>, usize)> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == EnrichmentStatus::Processing)
            .filter_map(|(idx, j)| j.processed_at.map(|ts| (ts, idx)))
            .filter(|(ts, _)| *ts < claimed_before)
            .collect();
        stalled.sort();
        stalled.truncate(limit.max(0) as usize);

        for (_, idx) in &stalled {
            let job = &mut state.jobs[*idx];
            job.status = EnrichmentStatus::Pending;
            job.processed_at = None;
            job.last_error = Some("requeued after stalling in processing".to_string());
        }
        drop(state);

        if !stalled.is_empty() {
            self.record_write();
        }
        Ok(stalled.len() as u64)
    }
}

#[async_trait]
impl EntityRepository for MemoryStore {
    async fn get_subject(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> Result<Option<EnrichmentSubject>> {
        self.check_available()?;
        Ok(self
            .lock()
            .entities
            .get(&(entity_type, id))
            .map(|e| Self::subject_of(entity_type, id, e)))
    }

    async fn save_analysis(
        &self,
        entity_type: EntityType,
        id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.lock();
        let entity = state
            .entities
            .get_mut(&(entity_type, id))
            .ok_or_else(|| Error::NotFound(format!("{} {}", entity_type.label(), id)))?;
        entity.analysis = Some(record.clone());
        drop(state);
        self.record_write();
        Ok(())
    }

    async fn find_needing_analysis(
        &self,
        entity_type: EntityType,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EnrichmentSubject>> {
        self.check_available()?;
        let state = self.lock();
        let mut subjects: Vec<EnrichmentSubject> = state
            .entities
            .iter()
            .filter(|((et, _), _)| *et == entity_type)
            .filter(|((et, id), _)| {
                !state.jobs.iter().any(|j| {
                    j.entity_type == *et && j.entity_id == *id && j.status.is_active()
                })
            })
            .map(|((et, id), e)| Self::subject_of(*et, *id, e))
            .filter(|s| {
                !s.has_analysis
                    || s.analysis_generated_at
                        .map_or(true, |ts| ts < stale_before)
            })
            .collect();
        // None sorts before Some, matching NULLS FIRST.
        subjects.sort_by(|a, b| {
            a.analysis_generated_at
                .cmp(&b.analysis_generated_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        subjects.truncate(limit.max(0) as usize);
        Ok(subjects)
    }

    async fn coverage(&self, entity_type: EntityType) -> Result<EntityCoverage> {
        self.check_available()?;
        let state = self.lock();
        let mut coverage = EntityCoverage {
            entity_type,
            total: 0,
            with_analysis: 0,
        };
        for ((et, _), entity) in &state.entities {
            if *et != entity_type {
                continue;
            }
            coverage.total += 1;
            if has_renderable(entity.analysis.as_ref()) {
                coverage.with_analysis += 1;
            }
        }
        Ok(coverage)
    }
}

#[async_trait]
impl MarketContextProvider for MemoryStore {
    async fn market_context(&self, subject: &EnrichmentSubject) -> Result<String> {
        self.check_available()?;
        let (mut values, related) = match self.lock().entities.get(&(subject.entity_type, subject.id))
        {
            Some(e) => (e.submissions.clone(), e.related.clone()),
            None => (Vec::new(), Vec::new()),
        };
        values.sort_by(|a, b| a.total_cmp(b));

        let stats = MarketStats {
            sample_size: values.len() as i64,
            p25: percentile_cont(&values, 0.25),
            median: percentile_cont(&values, 0.50),
            p75: percentile_cont(&values, 0.75),
            p90: percentile_cont(&values, 0.90),
            top_related: related,
        };
        Ok(stats.to_context_block(subject.entity_type.label(), &subject.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percentile_cont_interpolates() {
        let values = [100.0, 200.0, 300.0, 400.0];
        assert_eq!(percentile_cont(&values, 0.5), Some(250.0));
        assert_eq!(percentile_cont(&values, 0.0), Some(100.0));
        assert_eq!(percentile_cont(&values, 1.0), Some(400.0));
        assert_eq!(percentile_cont(&[], 0.5), None);
    }

    #[tokio::test]
    async fn test_queue_deduplicates_active_jobs() {
        let store = MemoryStore::new();
        let id = store.add_entity(EntityType::Company, "Acme");

        let first = store
            .queue_enrichment(EntityType::Company, id, "Acme", None)
            .await
            .unwrap();
        let second = store
            .queue_enrichment(EntityType::Company, id, "Acme", None)
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_allows_new_job_after_completion() {
        let store = MemoryStore::new();
        let id = store.add_entity(EntityType::City, "Denver, CO");

        store
            .queue_enrichment(EntityType::City, id, "Denver, CO", None)
            .await
            .unwrap();
        let job = store.claim_next().await.unwrap().unwrap();
        store.complete(job.id).await.unwrap();

        let again = store
            .queue_enrichment(EntityType::City, id, "Denver, CO", None)
            .await
            .unwrap();
        assert!(again.is_some());

        let latest = store.get_status(EntityType::City, id).await.unwrap().unwrap();
        assert_eq!(Some(latest.id), again);
        assert_eq!(latest.status, EnrichmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_and_increments_attempts() {
        let store = MemoryStore::new();
        let a = store.add_entity(EntityType::Job, "Staff Engineer");
        let b = store.add_entity(EntityType::Job, "Product Manager");
        store
            .queue_enrichment(EntityType::Job, a, "Staff Engineer", None)
            .await
            .unwrap();
        store
            .queue_enrichment(EntityType::Job, b, "Product Manager", None)
            .await
            .unwrap();

        let first = store.claim_next().await.unwrap().unwrap();
        assert_eq!(first.entity_id, a);
        assert_eq!(first.attempts, 1);
        assert_eq!(first.status, EnrichmentStatus::Processing);

        let second = store.claim_next().await.unwrap().unwrap();
        assert_eq!(second.entity_id, b);
        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_processing() {
        let store = MemoryStore::new();
        let id = store.add_entity(EntityType::Company, "Initech");
        let job_id = store
            .queue_enrichment(EntityType::Company, id, "Initech", None)
            .await
            .unwrap()
            .unwrap();

        let err = store.complete(job_id).await.unwrap_err();
        assert!(matches!(err, Error::Job(_)));
    }

    #[tokio::test]
    async fn test_recover_respects_window_limit_and_max_attempts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut failed = Vec::new();
        for name in ["A", "B", "C", "D"] {
            let id = store.add_entity(EntityType::Company, name);
            let job_id = store
                .queue_enrichment(EntityType::Company, id, name, None)
                .await
                .unwrap()
                .unwrap();
            store.claim_next().await.unwrap();
            store.fail(job_id, "boom").await.unwrap();
            failed.push(job_id);
        }
        // A, B, C are old; D failed just now.
        for job_id in &failed[..3] {
            store.set_processed_at(*job_id, now - Duration::hours(2));
        }
        // C has exhausted its attempts.
        store.set_attempts(failed[2], 5);

        let recovered = store
            .recover_failed(now - Duration::hours(1), Some(5), 1)
            .await
            .unwrap();
        assert_eq!(recovered, 1);

        let recovered = store
            .recover_failed(now - Duration::hours(1), Some(5), 10)
            .await
            .unwrap();
        assert_eq!(recovered, 1);

        assert_eq!(store.job(failed[0]).unwrap().status, EnrichmentStatus::Pending);
        assert_eq!(store.job(failed[1]).unwrap().status, EnrichmentStatus::Pending);
        assert_eq!(store.job(failed[2]).unwrap().status, EnrichmentStatus::Failed);
        assert_eq!(store.job(failed[3]).unwrap().status, EnrichmentStatus::Failed);
    }

    #[tokio::test]
    async fn test_recover_skips_superseded_failures() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = store.add_entity(EntityType::City, "Reno, NV");

        let old = store
            .queue_enrichment(EntityType::City, id, "Reno, NV", None)
            .await
            .unwrap()
            .unwrap();
        store.claim_next().await.unwrap();
        store.fail(old, "first failure").await.unwrap();
        store
            .queue_enrichment(EntityType::City, id, "Reno, NV", None)
            .await
            .unwrap()
            .unwrap();
        store.set_processed_at(old, now - Duration::days(1));

        let recovered = store.recover_failed(now, None, 10).await.unwrap();
        assert_eq!(recovered, 0);
    }

    #[tokio::test]
    async fn test_requeue_stalled_processing_jobs() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = store.add_entity(EntityType::Job, "SRE");
        store
            .queue_enrichment(EntityType::Job, id, "SRE", None)
            .await
            .unwrap();
        let job = store.claim_next().await.unwrap().unwrap();
        store.set_processed_at(job.id, now - Duration::minutes(30));

        let requeued = store
            .requeue_stalled(now - Duration::minutes(15), 10)
            .await
            .unwrap();
        assert_eq!(requeued, 1);

        let job = store.job(job.id).unwrap();
        assert_eq!(job.status, EnrichmentStatus::Pending);
        assert!(job.last_error.unwrap().contains("stalling"));
    }

    #[tokio::test]
    async fn test_recover_leaves_active_jobs_untouched() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let pending_id = store.add_entity(EntityType::Company, "Pending Co");
        let processing_id = store.add_entity(EntityType::Company, "Processing Co");

        let processing = store
            .queue_enrichment(EntityType::Company, processing_id, "Processing Co", None)
            .await
            .unwrap()
            .unwrap();
        store.claim_next().await.unwrap();
        let pending = store
            .queue_enrichment(EntityType::Company, pending_id, "Pending Co", None)
            .await
            .unwrap()
            .unwrap();
        store.set_processed_at(pending, now - Duration::days(2));
        store.set_processed_at(processing, now - Duration::days(2));

        let recovered = store.recover_failed(now, None, 10).await.unwrap();
        assert_eq!(recovered, 0);

        let pending = store.job(pending).unwrap();
        assert_eq!(pending.status, EnrichmentStatus::Pending);
        assert_eq!(pending.processed_at, Some(now - Duration::days(2)));
        let processing = store.job(processing).unwrap();
        assert_eq!(processing.status, EnrichmentStatus::Processing);
        assert_eq!(processing.processed_at, Some(now - Duration::days(2)));
    }

    #[tokio::test]
    async fn test_requeue_stalled_takes_oldest_claim_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut claimed = Vec::new();
        for name in ["First", "Second", "Third"] {
            let id = store.add_entity(EntityType::Job, name);
            store
                .queue_enrichment(EntityType::Job, id, name, None)
                .await
                .unwrap();
            claimed.push(store.claim_next().await.unwrap().unwrap().id);
        }
        // Insertion order is First, Second, Third; claim age is the reverse.
        store.set_processed_at(claimed[0], now - Duration::minutes(20));
        store.set_processed_at(claimed[1], now - Duration::minutes(40));
        store.set_processed_at(claimed[2], now - Duration::minutes(60));

        let requeued = store
            .requeue_stalled(now - Duration::minutes(15), 2)
            .await
            .unwrap();
        assert_eq!(requeued, 2);

        assert_eq!(store.job(claimed[0]).unwrap().status, EnrichmentStatus::Processing);
        assert_eq!(store.job(claimed[1]).unwrap().status, EnrichmentStatus::Pending);
        assert_eq!(store.job(claimed[2]).unwrap().status, EnrichmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_json_null_analysis_is_not_renderable() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = store.add_entity(EntityType::City, "Boise, ID");
        store
            .save_analysis(
                EntityType::City,
                id,
                &AnalysisRecord {
                    analysis: JsonValue::Null,
                    metadata: serde_json::json!({}),
                    generated_at: now,
                },
            )
            .await
            .unwrap();

        let subject = store.get_subject(EntityType::City, id).await.unwrap().unwrap();
        assert!(!subject.has_analysis);
        assert_eq!(store.coverage(EntityType::City).await.unwrap().with_analysis, 0);

        let subjects = store
            .find_needing_analysis(EntityType::City, now - Duration::days(90), 10)
            .await
            .unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].id, id);
    }

    #[tokio::test]
    async fn test_find_needing_analysis_skips_entities_with_active_jobs() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let queued = store.add_entity(EntityType::Company, "Alpha");
        let claimed = store.add_entity(EntityType::Company, "Beta");
        let open = store.add_entity(EntityType::Company, "Gamma");

        store
            .queue_enrichment(EntityType::Company, claimed, "Beta", None)
            .await
            .unwrap();
        store.claim_next().await.unwrap();
        store
            .queue_enrichment(EntityType::Company, queued, "Alpha", None)
            .await
            .unwrap();

        let subjects = store
            .find_needing_analysis(EntityType::Company, now - Duration::days(90), 1)
            .await
            .unwrap();
        let ids: Vec<Uuid> = subjects.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![open]);
    }

    #[tokio::test]
    async fn test_find_needing_analysis_orders_missing_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.add_entity_with_analysis(EntityType::Company, "Fresh", now);
        let stale =
            store.add_entity_with_analysis(EntityType::Company, "Stale", now - Duration::days(120));
        let missing = store.add_entity(EntityType::Company, "Missing");

        let subjects = store
            .find_needing_analysis(EntityType::Company, now - Duration::days(90), 10)
            .await
            .unwrap();

        let ids: Vec<Uuid> = subjects.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![missing, stale]);
    }

    #[tokio::test]
    async fn test_coverage_counts() {
        let store = MemoryStore::new();
        store.add_entity(EntityType::City, "Tulsa, OK");
        store.add_entity_with_analysis(EntityType::City, "Miami, FL", Utc::now());
        store.add_entity(EntityType::Company, "Globex");

        let coverage = store.coverage(EntityType::City).await.unwrap();
        assert_eq!(coverage.total, 2);
        assert_eq!(coverage.with_analysis, 1);
    }

    #[tokio::test]
    async fn test_market_context_from_submissions() {
        let store = MemoryStore::new();
        let id = store.add_entity(EntityType::Company, "Acme");
        store.add_submissions(EntityType::Company, id, &[120_000.0, 180_000.0, 150_000.0]);
        store.set_related(EntityType::Company, id, &["Software Engineer"]);
        let subject = store
            .get_subject(EntityType::Company, id)
            .await
            .unwrap()
            .unwrap();

        let block = store.market_context(&subject).await.unwrap();
        assert!(block.contains("Salary submissions: 3"));
        assert!(block.contains("Median total compensation: $150,000"));
        assert!(block.contains("Most reported: Software Engineer"));
    }

    #[tokio::test]
    async fn test_unavailable_store_returns_database_error() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.claim_next().await.unwrap_err();
        assert!(err.is_infrastructure());
    }
}
