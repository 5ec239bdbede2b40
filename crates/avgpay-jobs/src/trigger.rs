//! Opportunistic enrichment triggered from page and route handlers.
//!
//! Callers hand over the entity they are rendering and move on; the check
//! and enqueue run in a spawned task whose errors are logged and dropped.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use avgpay_core::{
    trigger_reason, EnrichmentQueue, EnrichmentSubject, EntityRepository, EntityType, Result,
    TriggerInput,
};

/// Fire-and-forget enqueue of entities whose analysis is missing or stale.
#[derive(Clone)]
pub struct EnrichmentTrigger {
    queue: Arc<dyn EnrichmentQueue>,
    entities: Arc<dyn EntityRepository>,
}

impl EnrichmentTrigger {
    pub fn new(queue: Arc<dyn EnrichmentQueue>, entities: Arc<dyn EntityRepository>) -> Self {
        Self { queue, entities }
    }

    /// Evaluate `subject` and enqueue it when it needs enrichment. Returns
    /// the new job id, or `None` when nothing was queued.
    pub async fn evaluate_and_queue(
        &self,
        source: &str,
        subject: &EnrichmentSubject,
    ) -> Result<Option<Uuid>> {
        let Some(reason) = trigger_reason(&TriggerInput::from(subject), Utc::now()) else {
            debug!(
                subsystem = "jobs",
                component = "trigger",
                source,
                entity_type = %subject.entity_type,
                entity_id = %subject.id,
                "Analysis is fresh, not queueing"
            );
            return Ok(None);
        };

        let job_id = self
            .queue
            .queue_enrichment(
                subject.entity_type,
                subject.id,
                &subject.name,
                Some(json!({ "source": source, "reason": reason.as_str() })),
            )
            .await?;

        if let Some(id) = job_id {
            info!(
                subsystem = "jobs",
                component = "trigger",
                source,
                job_id = %id,
                entity_type = %subject.entity_type,
                entity_id = %subject.id,
                reason = reason.as_str(),
                "Queued opportunistic enrichment"
            );
        }
        Ok(job_id)
    }

    /// Spawn [`evaluate_and_queue`](Self::evaluate_and_queue) for an entity
    /// the caller already loaded.
    pub fn trigger_for_subject(&self, source: &str, subject: EnrichmentSubject) -> JoinHandle<()> {
        let this = self.clone();
        let source = source.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.evaluate_and_queue(&source, &subject).await {
                warn!(
                    subsystem = "jobs",
                    component = "trigger",
                    source = %source,
                    entity_type = %subject.entity_type,
                    entity_id = %subject.id,
                    error = %e,
                    "Opportunistic enrichment failed"
                );
            }
        })
    }

    /// Spawn a lookup of the entity followed by the same evaluation.
    /// Unknown entities are ignored.
    pub fn trigger_opportunistic(
        &self,
        source: &str,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> JoinHandle<()> {
        let this = self.clone();
        let source = source.to_string();
        tokio::spawn(async move {
            let result = match this.entities.get_subject(entity_type, entity_id).await {
                Ok(Some(subject)) => this.evaluate_and_queue(&source, &subject).await.map(|_| ()),
                Ok(None) => {
                    debug!(
                        subsystem = "jobs",
                        component = "trigger",
                        source = %source,
                        entity_type = %entity_type,
                        entity_id = %entity_id,
                        "Entity not found, skipping trigger"
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(
                    subsystem = "jobs",
                    component = "trigger",
                    source = %source,
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    error = %e,
                    "Opportunistic enrichment failed"
                );
            }
        })
    }
}
