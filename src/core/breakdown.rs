//! Compatibility breakdown
//!
//! Newer backends send the breakdown as structured JSON. Older ones only
//! embed it in the human-readable `reason` sentence ("Values: 30%, Humor:
//! 12.5%"), which [`parse_reason`] extracts as a fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::protocol::MatchResultEntry;

/// `<name>: <number>%`, name stops at separators and brackets
static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<name>[^:,;()\n]+?)\s*:\s*(?P<pct>\d+(?:\.\d+)?)\s*%")
        .expect("component regex is valid")
});

/// One named component of the compatibility score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownComponent {
    pub name: String,
    pub percent: f64,
}

/// Compatibility score split into named components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityBreakdown {
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub components: Vec<BreakdownComponent>,
}

impl CompatibilityBreakdown {
    pub fn is_empty(&self) -> bool {
        self.total.is_none() && self.components.is_empty()
    }

    /// Look up a component by case-insensitive name
    pub fn component(&self, name: &str) -> Option<f64> {
        self.components
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.percent)
    }
}

/// Extract every `<name>: <number>%` pair from a legacy reason sentence.
///
/// A component named like the overall score ("total", "compatibility",
/// "overall") becomes `total` rather than a component.
pub fn parse_reason(reason: &str) -> CompatibilityBreakdown {
    let mut breakdown = CompatibilityBreakdown::default();
    for caps in COMPONENT_RE.captures_iter(reason) {
        let name = caps["name"].trim().trim_start_matches(['-', '•', '*']).trim();
        let Ok(percent) = caps["pct"].parse::<f64>() else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        match name.to_ascii_lowercase().as_str() {
            "total" | "overall" | "compatibility" | "score" => breakdown.total = Some(percent),
            _ => breakdown.components.push(BreakdownComponent {
                name: name.to_string(),
                percent,
            }),
        }
    }
    breakdown
}

/// Breakdown for a match entry, structured data first.
///
/// Falls back to the parsed reason sentence, and fills `total` from the
/// entry's score when neither source carries one.
pub fn breakdown_for(entry: &MatchResultEntry) -> CompatibilityBreakdown {
    let mut breakdown = match &entry.breakdown {
        Some(structured) if !structured.is_empty() => structured.clone(),
        _ => parse_reason(&entry.reason),
    };
    if breakdown.total.is_none() {
        breakdown.total = entry.score;
    }
    breakdown
}
