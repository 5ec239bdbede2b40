//! Rules deciding whether a rendered entity needs fresh analysis.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::{REFRESH_EVERY_N_SUBMISSIONS, STALE_ANALYSIS_DAYS};
use crate::models::EnrichmentSubject;

/// Inputs to [`should_trigger_enrichment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInput {
    pub has_renderable_analysis: bool,
    pub analysis_generated_at: Option<DateTime<Utc>>,
    pub submission_count: i64,
}

impl From<&EnrichmentSubject> for TriggerInput {
    fn from(subject: &EnrichmentSubject) -> Self {
        Self {
            has_renderable_analysis: subject.has_analysis,
            analysis_generated_at: subject.analysis_generated_at,
            submission_count: subject.submission_count,
        }
    }
}

/// Why an entity was selected for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    MissingAnalysis,
    UnknownAge,
    Stale,
    SubmissionMilestone,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::MissingAnalysis => "missing_analysis",
            TriggerReason::UnknownAge => "unknown_age",
            TriggerReason::Stale => "stale",
            TriggerReason::SubmissionMilestone => "submission_milestone",
        }
    }
}

/// First matching reason to enrich, or `None` when the analysis is current.
pub fn trigger_reason(input: &TriggerInput, now: DateTime<Utc>) -> Option<TriggerReason> {
    if !input.has_renderable_analysis {
        return Some(TriggerReason::MissingAnalysis);
    }

    let generated_at = match input.analysis_generated_at {
        Some(ts) => ts,
        None => return Some(TriggerReason::UnknownAge),
    };

    if now - generated_at > Duration::days(STALE_ANALYSIS_DAYS) {
        return Some(TriggerReason::Stale);
    }

    if input.submission_count > 0 && input.submission_count % REFRESH_EVERY_N_SUBMISSIONS == 0 {
        return Some(TriggerReason::SubmissionMilestone);
    }

    None
}

/// True when the entity's analysis is missing, stale, or due for a refresh.
pub fn should_trigger_enrichment(input: &TriggerInput, now: DateTime<Utc>) -> bool {
    trigger_reason(input, now).is_some()
}
