//! Generation prompts for entity analysis.

use avgpay_core::{EnrichmentSubject, EntityType};

use crate::analysis::METADATA_KEYS;
use crate::quality::required_keys;

/// System prompt shared by every entity type.
pub const SYSTEM_PROMPT: &str = "You are a compensation analyst writing for AvgPay, a site \
that publishes self-reported tech-industry salary data. Ground every statement in the market \
data you are given; when the data is thin, say so instead of inventing numbers. Respond with a \
single JSON object and nothing else: no markdown fences, no commentary before or after it.";

fn key_guidance(entity_type: EntityType, key: &str) -> &'static str {
    match (entity_type, key) {
        (_, "summary") => "two or three sentences giving an overview",
        (EntityType::Company, "compensationOverview") => {
            "how pay at this company compares to the market, citing the percentiles"
        }
        (EntityType::Company, "careerGrowth") => "typical levels, promotion pace and mobility",
        (EntityType::Company, "negotiationTips") => "concrete advice for negotiating an offer",
        (EntityType::City, "costOfLiving") => "how local costs affect take-home value",
        (EntityType::City, "jobMarket") => "the main employers and demand for tech roles",
        (EntityType::City, "compensationTrends") => "where pay is heading and why",
        (EntityType::Job, "responsibilities") => "what the role does day to day",
        (EntityType::Job, "compensationFactors") => {
            "what moves pay up or down: level, location, company"
        }
        (EntityType::Job, "careerPath") => "where people in this role go next",
        _ => "a paragraph",
    }
}

/// Build the user prompt for a subject and its market-context block.
pub fn build_prompt(subject: &EnrichmentSubject, market_context: &str) -> String {
    let entity_type = subject.entity_type;
    let mut prompt = format!(
        "Write an analysis of the {} \"{}\".\n\n## Market data\n{}\n\n## Required keys\n",
        entity_type.label().to_lowercase(),
        subject.name,
        market_context.trim()
    );

    for key in required_keys(entity_type) {
        prompt.push_str(&format!(
            "- \"{}\": string, {}\n",
            key,
            key_guidance(entity_type, key)
        ));
    }

    prompt.push_str(
        "\nEach required value must be at least a full sentence of plain prose.\n\n## Optional keys\n",
    );
    for key in METADATA_KEYS {
        let description = match *key {
            "faq" => "array of {\"question\", \"answer\"} objects a job seeker would ask",
            "confidence" => "number from 0 to 1 reflecting how well the data supports the analysis",
            "sources" => "array of strings naming the data you relied on",
            "disclaimer" => "string noting limitations of the data",
            _ => "",
        };
        prompt.push_str(&format!("- \"{}\": {}\n", key, description));
    }

    prompt
}
