//! Language-model analysis pipeline
//!
//! Five agents, each a deterministic prompt plus a fixed response shape:
//! list quality, delivery analysis, round comparison, recommendation, and
//! report formatting. The first three are independent and run concurrently;
//! recommendation consumes their outputs; formatting consumes everything.
//!
//! Agents degrade individually: a deadline overrun, an endpoint failure, or
//! three consecutive shape violations switch that agent to rule-based
//! heuristics without failing the pipeline.

pub mod comparison;
pub mod delivery;
pub mod fallback;
pub mod list_quality;
pub mod pipeline;
pub mod recommendation;
pub mod report;
pub mod schema;

pub use pipeline::AnalysisPipeline;

use serde::{Deserialize, Serialize};

use crate::connectors::{ListStatistics, SenderReputation};
use crate::metrics::{CampaignMetrics, MetricsDelta};

/// Which stage the pipeline is analyzing for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Readiness analysis before launch
    Preflight,
    /// Performance analysis after send
    Wrapup,
}

/// Issue severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the round
    Critical,
    /// Needs attention, does not block
    Warning,
    /// Informational
    Info,
}

/// Recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Act before the next send
    Critical,
    /// Act this round
    High,
    /// Act when convenient
    Medium,
    /// Nice to have
    Low,
}

/// Everything the pipeline may consume for one invocation
///
/// For wrap-up, `current_metrics` is the round just sent and
/// `previous_metrics` the round before it. For pre-flight of round N > 1 the
/// pair shifts back one round (N−1 vs N−2), since the current round has not
/// launched yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInputs {
    /// Campaign being analyzed
    pub campaign_name: String,
    /// Round being analyzed
    pub round_number: u8,
    /// Stage mode
    pub mode: AnalysisMode,
    /// List counters, when a list snapshot was taken
    pub list_stats: Option<ListStatistics>,
    /// Sender reputation, when snapshotted
    pub reputation: Option<SenderReputation>,
    /// Newer metrics row of the comparison pair
    pub current_metrics: Option<CampaignMetrics>,
    /// Older metrics row of the comparison pair
    pub previous_metrics: Option<CampaignMetrics>,
    /// Precomputed per-metric deltas for the pair
    pub deltas: Vec<MetricsDelta>,
    /// Whether this is round 3
    pub is_final_round: bool,
}

/// Combined pipeline result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Mode the pipeline ran in
    pub mode: AnalysisMode,
    /// List-quality assessment, when list inputs were available
    pub list_quality: Option<list_quality::ListQualityReport>,
    /// Delivery analysis, when metrics were available
    pub delivery: Option<delivery::DeliveryAnalysisReport>,
    /// Round comparison, when a current metrics row was available
    pub comparison: Option<comparison::ComparisonReport>,
    /// Always produced, by model or by heuristics
    pub recommendation: recommendation::RecommendationReport,
    /// Always produced, by model or by heuristics
    pub formatted: report::FormattedReport,
    /// True when any agent that had inputs fell back to heuristics
    pub degraded: bool,
}
