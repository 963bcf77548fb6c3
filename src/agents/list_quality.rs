//! List-quality agent
//!
//! Consumes list counters and sender reputation; produces a health score with
//! risk factors and a deliverability estimate.

use serde::{Deserialize, Serialize};

use crate::connectors::{ListStatistics, SenderReputation};

/// Agent name used in logs and schema errors
pub const NAME: &str = "list-quality";

/// Top-level fields the response must carry
pub const REQUIRED_FIELDS: &[&str] = &[
    "healthScore",
    "grade",
    "engagementRate",
    "riskFactors",
    "recommendation",
    "estimatedDeliverability",
];

/// List-quality assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQualityReport {
    /// Overall list health, 0-100
    pub health_score: f64,
    /// Letter grade
    pub grade: String,
    /// Estimated engaged share of the list, percent
    pub engagement_rate: f64,
    /// Risk factors, most important first
    pub risk_factors: Vec<String>,
    /// Overall recommendation
    pub recommendation: String,
    /// Estimated deliverability, percent
    pub estimated_deliverability: f64,
}

/// Deterministic prompt for one assessment
pub fn prompt(list_stats: &ListStatistics, reputation: &SenderReputation) -> String {
    let stats = serde_json::to_string_pretty(list_stats).unwrap_or_else(|_| "{}".into());
    let rep = serde_json::to_string_pretty(reputation).unwrap_or_else(|_| "{}".into());
    format!(
        "You are an email deliverability analyst. Assess the health of a \
         recipient list before a campaign send.\n\n\
         List statistics:\n{stats}\n\n\
         Sender reputation:\n{rep}\n\n\
         Respond with only a JSON object of this exact shape:\n\
         {{\"healthScore\": <0-100>, \"grade\": \"A\"-\"F\", \
         \"engagementRate\": <percent>, \"riskFactors\": [<string>...], \
         \"recommendation\": <string>, \"estimatedDeliverability\": <percent>}}"
    )
}
