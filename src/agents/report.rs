//! Report-formatting agent
//!
//! Consumes the four structured outputs plus the stage mode; produces the
//! stage-appropriate summary used by the chat renderer: a readiness block for
//! pre-flight, a performance block for wrap-up, plus common insights,
//! actionable recommendations, warnings, and next steps.

use serde::{Deserialize, Serialize};

use crate::agents::comparison::ComparisonReport;
use crate::agents::delivery::DeliveryAnalysisReport;
use crate::agents::list_quality::ListQualityReport;
use crate::agents::recommendation::RecommendationReport;
use crate::agents::AnalysisMode;

/// Agent name used in logs and schema errors
pub const NAME: &str = "report-formatting";

/// Top-level fields the response must carry
pub const REQUIRED_FIELDS: &[&str] = &[
    "headline",
    "summary",
    "insights",
    "recommendations",
    "warnings",
    "nextSteps",
];

/// Stage-appropriate formatted report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedReport {
    /// One-line headline
    pub headline: String,
    /// Stage summary lines (readiness for pre-flight, performance for wrap-up)
    pub summary: Vec<String>,
    /// Insights common to both modes
    pub insights: Vec<String>,
    /// Actionable recommendations
    pub recommendations: Vec<String>,
    /// Warnings
    pub warnings: Vec<String>,
    /// Next steps
    pub next_steps: Vec<String>,
}

/// Deterministic prompt for one formatting pass
pub fn prompt(
    mode: AnalysisMode,
    list_quality: Option<&ListQualityReport>,
    delivery: Option<&DeliveryAnalysisReport>,
    comparison: Option<&ComparisonReport>,
    recommendation: &RecommendationReport,
) -> String {
    fn json_or_null<T: Serialize>(value: Option<&T>) -> String {
        value
            .and_then(|v| serde_json::to_string_pretty(v).ok())
            .unwrap_or_else(|| "null".into())
    }

    let mode_block = match mode {
        AnalysisMode::Preflight => {
            "Write the summary as a pre-launch readiness block: is this round \
             safe to send, and why."
        }
        AnalysisMode::Wrapup => {
            "Write the summary as a post-send performance block: how the \
             round performed and how it moved against the previous round."
        }
    };

    format!(
        "You are formatting an analyst report for a chat channel. Condense \
         the structured assessments below into short plain-text lines; no \
         markdown.\n\n\
         Mode: {mode:?}. {mode_block}\n\n\
         List quality:\n{lq}\n\n\
         Delivery analysis:\n{da}\n\n\
         Round comparison:\n{cmp}\n\n\
         Recommendation:\n{rec}\n\n\
         Respond with only a JSON object of this exact shape:\n\
         {{\"headline\": <string>, \"summary\": [<string>...], \
         \"insights\": [<string>...], \"recommendations\": [<string>...], \
         \"warnings\": [<string>...], \"nextSteps\": [<string>...]}}",
        lq = json_or_null(list_quality),
        da = json_or_null(delivery),
        cmp = json_or_null(comparison),
        rec = serde_json::to_string_pretty(recommendation).unwrap_or_else(|_| "{}".into()),
    )
}
