//! Delivery-analysis agent
//!
//! Consumes a metrics vector; produces a performance grade, per-metric
//! buckets, patterns, ranked issues, and recommendations.

use serde::{Deserialize, Serialize};

use crate::agents::Severity;
use crate::metrics::CampaignMetrics;

/// Agent name used in logs and schema errors
pub const NAME: &str = "delivery-analysis";

/// Top-level fields the response must carry
pub const REQUIRED_FIELDS: &[&str] = &[
    "grade",
    "score",
    "metricAssessments",
    "patterns",
    "issues",
    "recommendations",
];

/// Quality bucket for a single metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricBucket {
    /// Well above expectations
    Excellent,
    /// Within expectations
    Good,
    /// Below expectations
    Warning,
    /// Requires intervention
    Critical,
}

/// One metric with its bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAssessment {
    /// Metric name, e.g. "deliveryRate"
    pub metric: String,
    /// Observed value, percent
    pub value: f64,
    /// Bucket assigned
    pub bucket: MetricBucket,
}

/// A ranked delivery issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryIssue {
    /// How bad it is
    pub severity: Severity,
    /// What is wrong
    pub message: String,
}

/// Delivery performance analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAnalysisReport {
    /// Letter grade
    pub grade: String,
    /// Performance score, 0-100
    pub score: f64,
    /// Per-metric buckets
    pub metric_assessments: Vec<MetricAssessment>,
    /// Observed patterns
    pub patterns: Vec<String>,
    /// Issues, most severe first
    pub issues: Vec<DeliveryIssue>,
    /// Recommendations
    pub recommendations: Vec<String>,
}

/// Deterministic prompt for one analysis
pub fn prompt(metrics: &CampaignMetrics) -> String {
    let payload = serde_json::to_string_pretty(metrics).unwrap_or_else(|_| "{}".into());
    format!(
        "You are an email delivery analyst. Grade the delivery performance of \
         a campaign round from its metrics.\n\n\
         Metrics:\n{payload}\n\n\
         Respond with only a JSON object of this exact shape:\n\
         {{\"grade\": \"A\"-\"F\", \"score\": <0-100>, \
         \"metricAssessments\": [{{\"metric\": <string>, \"value\": <percent>, \
         \"bucket\": \"excellent\"|\"good\"|\"warning\"|\"critical\"}}...], \
         \"patterns\": [<string>...], \
         \"issues\": [{{\"severity\": \"critical\"|\"warning\"|\"info\", \
         \"message\": <string>}}...], \
         \"recommendations\": [<string>...]}}\n\
         Order issues most severe first."
    )
}
