//! Recommendation agent
//!
//! Consumes the three upstream assessments plus campaign metadata; produces
//! the executive summary, overall health, prioritized recommendations, and a
//! next-round strategy when this is not the final round.

use serde::{Deserialize, Serialize};

use crate::agents::comparison::ComparisonReport;
use crate::agents::delivery::DeliveryAnalysisReport;
use crate::agents::list_quality::ListQualityReport;
use crate::agents::{AnalysisInputs, Priority};
use crate::metrics::Trend;

/// Agent name used in logs and schema errors
pub const NAME: &str = "recommendation";

/// Top-level fields the response must carry
pub const REQUIRED_FIELDS: &[&str] = &[
    "executiveSummary",
    "overallHealth",
    "recommendations",
    "warnings",
    "opportunities",
];

/// Overall campaign health as judged across all assessments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallHealth {
    /// Health score, 0-100
    pub score: f64,
    /// One-word status, e.g. "healthy", "at-risk"
    pub status: String,
    /// Direction of movement
    pub trend: Trend,
}

/// One prioritized action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedAction {
    /// How urgent
    pub priority: Priority,
    /// What to do
    pub action: String,
}

/// Synthesized recommendation set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationReport {
    /// Executive summary paragraph
    pub executive_summary: String,
    /// Overall health verdict
    pub overall_health: OverallHealth,
    /// Actions, highest priority first
    pub recommendations: Vec<PrioritizedAction>,
    /// Warnings
    pub warnings: Vec<String>,
    /// Opportunities
    pub opportunities: Vec<String>,
    /// Strategy for the next round; absent on the final round
    #[serde(default)]
    pub next_round_strategy: Option<String>,
}

/// Deterministic prompt for one synthesis
pub fn prompt(
    inputs: &AnalysisInputs,
    list_quality: Option<&ListQualityReport>,
    delivery: Option<&DeliveryAnalysisReport>,
    comparison: Option<&ComparisonReport>,
) -> String {
    fn json_or_null<T: Serialize>(value: Option<&T>) -> String {
        value
            .and_then(|v| serde_json::to_string_pretty(v).ok())
            .unwrap_or_else(|| "null".into())
    }

    format!(
        "You are the lead analyst for an email campaign program. Synthesize \
         the assessments below into one set of recommendations.\n\n\
         Campaign: {name}, round {round} of 3{final_note}.\n\n\
         List quality assessment:\n{lq}\n\n\
         Delivery analysis:\n{da}\n\n\
         Round comparison:\n{cmp}\n\n\
         Respond with only a JSON object of this exact shape:\n\
         {{\"executiveSummary\": <string>, \
         \"overallHealth\": {{\"score\": <0-100>, \"status\": <string>, \
         \"trend\": \"improving\"|\"stable\"|\"declining\"|\"first_round\"}}, \
         \"recommendations\": [{{\"priority\": \"critical\"|\"high\"|\"medium\"|\"low\", \
         \"action\": <string>}}...], \
         \"warnings\": [<string>...], \"opportunities\": [<string>...], \
         \"nextRoundStrategy\": <string|null>}}\n\
         Order recommendations highest priority first. Set \
         nextRoundStrategy to null on the final round.",
        name = inputs.campaign_name,
        round = inputs.round_number,
        final_note = if inputs.is_final_round {
            " (final round)"
        } else {
            ""
        },
        lq = json_or_null(list_quality),
        da = json_or_null(delivery),
        cmp = json_or_null(comparison),
    )
}
