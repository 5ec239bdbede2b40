//! Market statistics summary fed into generation prompts.

use serde::{Deserialize, Serialize};

/// Compensation percentiles for one entity, in whole currency units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub sample_size: i64,
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    /// Most common related labels (job titles for a company, companies for a job, ...).
    pub top_related: Vec<String>,
}

impl MarketStats {
    /// Render the plain-text block embedded in prompts.
    pub fn to_context_block(&self, subject_label: &str, subject_name: &str) -> String {
        let mut lines = vec![format!("{}: {}", subject_label, subject_name)];

        if self.sample_size == 0 {
            lines.push("Salary submissions: none yet".to_string());
            lines.push(
                "No percentile data is available; describe the market qualitatively.".to_string(),
            );
            return lines.join("\n");
        }

        lines.push(format!("Salary submissions: {}", self.sample_size));
        for (label, value) in [
            ("25th percentile total compensation", self.p25),
            ("Median total compensation", self.median),
            ("75th percentile total compensation", self.p75),
            ("90th percentile total compensation", self.p90),
        ] {
            if let Some(v) = value {
                lines.push(format!("{}: {}", label, format_usd(v)));
            }
        }

        if !self.top_related.is_empty() {
            lines.push(format!("Most reported: {}", self.top_related.join(", ")));
        }

        lines.join("\n")
    }
}

/// Format a dollar amount with thousands separators, rounded to whole dollars.
pub fn format_usd(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0 {
        format!("-${}", out)
    } else {
        format!("${}", out)
    }
}
