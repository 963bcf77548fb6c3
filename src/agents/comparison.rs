//! Round-comparison agent
//!
//! Consumes the current metrics row and, when one exists, the previous
//! round's row; produces a trend, per-metric movements, and a next-round
//! prediction when confidence permits.

use serde::{Deserialize, Serialize};

use crate::metrics::{CampaignMetrics, MetricsDelta, Significance, Trend};

/// Agent name used in logs and schema errors
pub const NAME: &str = "round-comparison";

/// Top-level fields the response must carry
pub const REQUIRED_FIELDS: &[&str] = &["trend", "metricChanges"];

/// One per-metric movement as interpreted by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricChange {
    /// Metric name
    pub metric: String,
    /// current − previous, percentage points
    pub delta: f64,
    /// Movement magnitude
    pub significance: Significance,
    /// Optional interpretation
    #[serde(default)]
    pub note: Option<String>,
}

/// Predicted next-round outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPrediction {
    /// Expected delivery rate, percent
    pub expected_delivery_rate: f64,
    /// Prediction confidence, 0-1
    pub confidence: f64,
}

/// Round-over-round comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    /// Direction of movement
    pub trend: Trend,
    /// Per-metric movements
    pub metric_changes: Vec<MetricChange>,
    /// Prediction, omitted when confidence is low
    #[serde(default)]
    pub prediction: Option<RoundPrediction>,
}

/// Deterministic prompt for one comparison
pub fn prompt(
    current: &CampaignMetrics,
    previous: Option<&CampaignMetrics>,
    deltas: &[MetricsDelta],
) -> String {
    let current_json = serde_json::to_string_pretty(current).unwrap_or_else(|_| "{}".into());
    let previous_json = previous
        .and_then(|p| serde_json::to_string_pretty(p).ok())
        .unwrap_or_else(|| "null (first round)".into());
    let deltas_json = serde_json::to_string_pretty(deltas).unwrap_or_else(|_| "[]".into());
    format!(
        "You are an email campaign analyst. Compare two rounds of the same \
         campaign.\n\n\
         Current round metrics:\n{current_json}\n\n\
         Previous round metrics:\n{previous_json}\n\n\
         Computed deltas (percentage points):\n{deltas_json}\n\n\
         Respond with only a JSON object of this exact shape:\n\
         {{\"trend\": \"improving\"|\"stable\"|\"declining\"|\"first_round\", \
         \"metricChanges\": [{{\"metric\": <string>, \"delta\": <points>, \
         \"significance\": \"none\"|\"minor\"|\"moderate\"|\"major\", \
         \"note\": <string|null>}}...], \
         \"prediction\": {{\"expectedDeliveryRate\": <percent>, \
         \"confidence\": <0-1>}} or null}}\n\
         Use trend \"first_round\" when there is no previous round. Omit the \
         prediction unless the data supports one."
    )
}
