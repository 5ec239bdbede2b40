//! Per-entity quality gate for generated analysis.
//!
//! A response passes when it is a JSON object holding every narrative key
//! required for its entity type, each a string of at least
//! [`MIN_SECTION_CHARS`] trimmed characters with no template placeholders.

use serde_json::Value as JsonValue;

use avgpay_core::defaults::MIN_SECTION_CHARS;
use avgpay_core::EntityType;
use avgpay_inference::QualityVerdict;

const COMPANY_KEYS: &[&str] = &[
    "summary",
    "compensationOverview",
    "careerGrowth",
    "negotiationTips",
];

const CITY_KEYS: &[&str] = &[
    "summary",
    "costOfLiving",
    "jobMarket",
    "compensationTrends",
];

const JOB_KEYS: &[&str] = &[
    "summary",
    "responsibilities",
    "compensationFactors",
    "careerPath",
];

/// Lowercased markers of unfilled template text.
const PLACEHOLDER_MARKERS: &[&str] = &["lorem ipsum", "[insert", "todo", "{{"];

/// Narrative keys required for an entity type, in prompt order.
pub fn required_keys(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Company => COMPANY_KEYS,
        EntityType::City => CITY_KEYS,
        EntityType::Job => JOB_KEYS,
    }
}

fn has_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|marker| {
        if *marker == "todo" {
            // Whole word only; "todos" or "mastodon" are fine.
            lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == "todo")
        } else {
            lower.contains(marker)
        }
    })
}

/// Check generated content against the gate for `entity_type`.
pub fn check_quality(entity_type: EntityType, content: &JsonValue) -> QualityVerdict {
    let Some(object) = content.as_object() else {
        return QualityVerdict::reject("not a JSON object");
    };

    for key in required_keys(entity_type) {
        let Some(value) = object.get(*key) else {
            return QualityVerdict::reject(format!("missing key {}", key));
        };
        let Some(text) = value.as_str() else {
            return QualityVerdict::reject(format!("key {} is not a string", key));
        };
        if text.trim().chars().count() < MIN_SECTION_CHARS {
            return QualityVerdict::reject(format!("key {} is too short", key));
        }
        if has_placeholder(text) {
            return QualityVerdict::reject(format!("key {} contains placeholder text", key));
        }
    }

    QualityVerdict::ok()
}
