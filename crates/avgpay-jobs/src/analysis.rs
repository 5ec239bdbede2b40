//! Split accepted model output into core analysis and metadata.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as JsonValue};

use avgpay_core::defaults::DEFAULT_DISCLAIMER;
use avgpay_core::{AnalysisRecord, Error, Result};
use avgpay_inference::{AttemptFailure, FallbackSuccess};

/// Optional keys moved out of the core payload into metadata.
pub const METADATA_KEYS: &[&str] = &["faq", "confidence", "sources", "disclaimer"];

fn array_or_empty(value: Option<JsonValue>) -> JsonValue {
    match value {
        Some(JsonValue::Array(items)) => JsonValue::Array(items),
        _ => json!([]),
    }
}

fn confidence(value: Option<JsonValue>) -> JsonValue {
    let number = match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number.filter(|n| n.is_finite()) {
        Some(n) => json!(n.clamp(0.0, 1.0)),
        None => JsonValue::Null,
    }
}

fn disclaimer(value: Option<JsonValue>) -> JsonValue {
    match value {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => JsonValue::String(s),
        _ => JsonValue::String(DEFAULT_DISCLAIMER.to_string()),
    }
}

/// Split `content` into the record written to the entity row.
///
/// Each metadata key defaults independently when absent or of the wrong
/// type. Generation details (`model`, `provider`, `attempts`,
/// `generatedAt`) are added to the metadata.
pub fn split_analysis(
    content: &JsonValue,
    provider: &str,
    model: &str,
    attempts: &[AttemptFailure],
    generated_at: DateTime<Utc>,
) -> Result<AnalysisRecord> {
    let mut core: Map<String, JsonValue> = content
        .as_object()
        .cloned()
        .ok_or_else(|| Error::Serialization("analysis is not a JSON object".to_string()))?;

    let faq = array_or_empty(core.remove("faq"));
    let confidence = confidence(core.remove("confidence"));
    let sources = array_or_empty(core.remove("sources"));
    let disclaimer = disclaimer(core.remove("disclaimer"));

    if core.is_empty() {
        return Err(Error::Serialization(
            "analysis has no narrative content".to_string(),
        ));
    }

    let metadata = json!({
        "faq": faq,
        "confidence": confidence,
        "sources": sources,
        "disclaimer": disclaimer,
        "model": model,
        "provider": provider,
        "attempts": serde_json::to_value(attempts)?,
        "generatedAt": generated_at,
    });

    Ok(AnalysisRecord {
        analysis: JsonValue::Object(core),
        metadata,
        generated_at,
    })
}

/// [`split_analysis`] for a fallback result.
pub fn record_from_success(
    success: &FallbackSuccess,
    generated_at: DateTime<Utc>,
) -> Result<AnalysisRecord> {
    split_analysis(
        &success.content,
        &success.provider,
        &success.model,
        &success.attempts,
        generated_at,
    )
}
