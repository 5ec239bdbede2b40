//! Pull a JSON object out of free-form model output.
//!
//! Models asked for "JSON only" still wrap answers in markdown fences, prefix
//! them with a sentence, or (reasoning models) emit a `<think>...</think>`
//! block first. Extraction tries, in order:
//!
//! 1. the text with any leading think block removed,
//! 2. the body of the first fenced code block,
//! 3. the slice from the first `{` to the last `}`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value as JsonValue;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\s*\n?(.*?)```").unwrap())
}

fn think_regex() -> &'static Regex {
    static THINK: OnceLock<Regex> = OnceLock::new();
    THINK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

/// Remove `<think>...</think>` blocks.
pub fn strip_thinking(text: &str) -> String {
    think_regex().replace_all(text, "").trim().to_string()
}

/// Extract the first JSON object from `text`.
///
/// Returns a description of the problem when nothing parses to an object.
pub fn extract_json_object(text: &str) -> Result<JsonValue, String> {
    let cleaned = strip_thinking(text);
    if cleaned.is_empty() {
        return Err("response was empty".to_string());
    }

    let mut candidates: Vec<&str> = vec![cleaned.as_str()];
    if let Some(body) = fence_regex().captures(&cleaned).and_then(|c| c.get(1)) {
        candidates.push(body.as_str());
    }
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            candidates.push(&cleaned[start..=end]);
        }
    }

    let mut last_err = String::from("no JSON object found");
    for candidate in candidates {
        match serde_json::from_str::<JsonValue>(candidate.trim()) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => last_err = "response JSON is not an object".to_string(),
            Err(e) => last_err = format!("invalid JSON: {}", e),
        }
    }
    Err(last_err)
}
