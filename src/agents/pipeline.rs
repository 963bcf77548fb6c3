//! Dependency-graph execution of the analysis agents
//!
//! ListQuality, DeliveryAnalysis, and Comparison are independent and run
//! concurrently; Recommendation waits on all three; ReportFormatting waits on
//! Recommendation. Every agent call is bounded by a per-agent deadline and
//! retried up to three times on response-shape violations before the agent
//! degrades to its heuristic fallback.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::agents::comparison::{self, ComparisonReport};
use crate::agents::delivery::{self, DeliveryAnalysisReport};
use crate::agents::list_quality::{self, ListQualityReport};
use crate::agents::recommendation::{self, RecommendationReport};
use crate::agents::report::{self, FormattedReport};
use crate::agents::{fallback, schema, AnalysisInputs, AnalysisReport};
use crate::connectors::LanguageModel;
use crate::error::{EngineError, EngineResult};

/// Per-agent wall-clock budget
const AGENT_DEADLINE: Duration = Duration::from_secs(30);
/// Consecutive shape violations tolerated before falling back
const MAX_SCHEMA_ATTEMPTS: u32 = 3;

/// Executes the five-agent assessment graph
pub struct AnalysisPipeline {
    model: Arc<dyn LanguageModel>,
    agent_deadline: Duration,
}

impl AnalysisPipeline {
    /// Pipeline with the production per-agent deadline
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self::with_deadline(model, AGENT_DEADLINE)
    }

    /// Pipeline with a custom deadline (testing)
    pub fn with_deadline(model: Arc<dyn LanguageModel>, agent_deadline: Duration) -> Self {
        Self {
            model,
            agent_deadline,
        }
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        name: &str,
        prompt: String,
        fields: &[&str],
    ) -> EngineResult<T> {
        let mut attempts = 0u32;
        loop {
            let generated =
                tokio::time::timeout(self.agent_deadline, self.model.generate(&prompt)).await;
            let text = match generated {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(EngineError::DeadlineExceeded {
                        operation: format!("agent {}", name),
                    })
                }
            };
            match schema::parse_validated::<T>(name, &text, fields) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    attempts += 1;
                    warn!(agent = name, attempt = attempts, error = %e, "agent response failed validation");
                    if attempts >= MAX_SCHEMA_ATTEMPTS {
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn run_list_quality(&self, inputs: &AnalysisInputs) -> Option<(ListQualityReport, bool)> {
        let (stats, reputation) = match (&inputs.list_stats, &inputs.reputation) {
            (Some(stats), Some(reputation)) => (stats, reputation),
            _ => return None,
        };
        match self
            .invoke(
                list_quality::NAME,
                list_quality::prompt(stats, reputation),
                list_quality::REQUIRED_FIELDS,
            )
            .await
        {
            Ok(parsed) => Some((parsed, false)),
            Err(e) => {
                warn!(agent = list_quality::NAME, error = %e, "agent degraded to heuristics");
                Some((fallback::list_quality(stats, reputation), true))
            }
        }
    }

    async fn run_delivery(&self, inputs: &AnalysisInputs) -> Option<(DeliveryAnalysisReport, bool)> {
        let metrics = inputs.current_metrics.as_ref()?;
        match self
            .invoke(
                delivery::NAME,
                delivery::prompt(metrics),
                delivery::REQUIRED_FIELDS,
            )
            .await
        {
            Ok(parsed) => Some((parsed, false)),
            Err(e) => {
                warn!(agent = delivery::NAME, error = %e, "agent degraded to heuristics");
                Some((fallback::delivery(metrics), true))
            }
        }
    }

    async fn run_comparison(&self, inputs: &AnalysisInputs) -> Option<(ComparisonReport, bool)> {
        let current = inputs.current_metrics.as_ref()?;
        match self
            .invoke(
                comparison::NAME,
                comparison::prompt(current, inputs.previous_metrics.as_ref(), &inputs.deltas),
                comparison::REQUIRED_FIELDS,
            )
            .await
        {
            Ok(parsed) => Some((parsed, false)),
            Err(e) => {
                warn!(agent = comparison::NAME, error = %e, "agent degraded to heuristics");
                Some((
                    fallback::comparison(&inputs.deltas, inputs.previous_metrics.is_some()),
                    true,
                ))
            }
        }
    }

    /// Run the full assessment graph.
    ///
    /// Never fails: whatever the agents could not produce is replaced by
    /// heuristics and the result is marked degraded.
    pub async fn run(&self, inputs: &AnalysisInputs) -> AnalysisReport {
        let (lq, da, cmp) = futures::join!(
            self.run_list_quality(inputs),
            self.run_delivery(inputs),
            self.run_comparison(inputs),
        );

        let mut degraded = false;
        let list_quality = lq.map(|(r, fell_back)| {
            degraded |= fell_back;
            r
        });
        let delivery = da.map(|(r, fell_back)| {
            degraded |= fell_back;
            r
        });
        let comparison = cmp.map(|(r, fell_back)| {
            degraded |= fell_back;
            r
        });

        let recommendation = match self
            .invoke::<RecommendationReport>(
                recommendation::NAME,
                recommendation::prompt(
                    inputs,
                    list_quality.as_ref(),
                    delivery.as_ref(),
                    comparison.as_ref(),
                ),
                recommendation::REQUIRED_FIELDS,
            )
            .await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(agent = recommendation::NAME, error = %e, "agent degraded to heuristics");
                degraded = true;
                fallback::recommendation(
                    inputs,
                    list_quality.as_ref(),
                    delivery.as_ref(),
                    comparison.as_ref(),
                )
            }
        };

        let formatted = match self
            .invoke::<FormattedReport>(
                report::NAME,
                report::prompt(
                    inputs.mode,
                    list_quality.as_ref(),
                    delivery.as_ref(),
                    comparison.as_ref(),
                    &recommendation,
                ),
                report::REQUIRED_FIELDS,
            )
            .await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(agent = report::NAME, error = %e, "agent degraded to heuristics");
                degraded = true;
                fallback::formatted(
                    inputs.mode,
                    list_quality.as_ref(),
                    delivery.as_ref(),
                    comparison.as_ref(),
                    &recommendation,
                )
            }
        };

        AnalysisReport {
            mode: inputs.mode,
            list_quality,
            delivery,
            comparison,
            recommendation,
            formatted,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AnalysisMode;
    use crate::connectors::testing::FakeLanguageModel;
    use crate::connectors::{DeliveryCounters, ListStatistics, ReputationTrend, SenderReputation};
    use crate::metrics::{compute_deltas, CampaignMetrics, Trend};
    use crate::schedule::ScheduleId;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn metrics_row(delivered: u64) -> CampaignMetrics {
        CampaignMetrics::derive(
            ScheduleId::new(),
            1,
            DeliveryCounters {
                processed: 1000,
                delivered,
                bounced: 1000 - delivered,
                hard_bounces: 10,
                soft_bounces: 5,
                opened: 300,
                clicked: 90,
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2025, 10, 2, 9, 45, 0).unwrap(),
        )
        .unwrap()
    }

    fn wrapup_inputs() -> AnalysisInputs {
        let previous = metrics_row(975);
        let current = metrics_row(960);
        let deltas = compute_deltas(&current, &previous);
        AnalysisInputs {
            campaign_name: "Q4".into(),
            round_number: 2,
            mode: AnalysisMode::Wrapup,
            list_stats: Some(ListStatistics {
                total: 1200,
                subscribed: 1150,
                unsubscribed: 40,
                blocked: 10,
                recent_bounces: 3,
            }),
            reputation: Some(SenderReputation {
                score: 92.0,
                trend: ReputationTrend::Stable,
            }),
            current_metrics: Some(current),
            previous_metrics: Some(previous),
            deltas,
            is_final_round: false,
        }
    }

    fn scripted_model() -> FakeLanguageModel {
        FakeLanguageModel::with_handler(|prompt| {
            let response = if prompt.contains("deliverability analyst") {
                r#"{"healthScore": 88, "grade": "B", "engagementRate": 60.2,
                    "riskFactors": [], "recommendation": "send",
                    "estimatedDeliverability": 97.0}"#
            } else if prompt.contains("Grade the delivery performance") {
                r#"{"grade": "A", "score": 93, "metricAssessments": [],
                    "patterns": ["steady opens"], "issues": [],
                    "recommendations": ["keep going"]}"#
            } else if prompt.contains("Compare two rounds") {
                r#"{"trend": "declining", "metricChanges":
                    [{"metric": "deliveryRate", "delta": -1.5, "significance": "minor"}],
                    "prediction": null}"#
            } else if prompt.contains("lead analyst") {
                r#"{"executiveSummary": "Round 2 slipped slightly.",
                    "overallHealth": {"score": 85, "status": "healthy", "trend": "declining"},
                    "recommendations": [{"priority": "medium", "action": "watch bounces"}],
                    "warnings": [], "opportunities": [], "nextRoundStrategy": "hold course"}"#
            } else {
                r#"{"headline": "Round 2 wrap-up", "summary": ["ok"],
                    "insights": [], "recommendations": ["watch bounces"],
                    "warnings": [], "nextSteps": ["hold course"]}"#
            };
            Ok(response.to_string())
        })
    }

    #[tokio::test]
    async fn full_graph_produces_undegraded_report() {
        let pipeline = AnalysisPipeline::new(Arc::new(scripted_model()));
        let report = pipeline.run(&wrapup_inputs()).await;

        assert!(!report.degraded);
        assert_eq!(report.comparison.unwrap().trend, Trend::Declining);
        assert_eq!(report.formatted.headline, "Round 2 wrap-up");
        assert_eq!(report.recommendation.overall_health.status, "healthy");
    }

    #[tokio::test]
    async fn model_outage_degrades_to_heuristics() {
        let pipeline = AnalysisPipeline::new(Arc::new(FakeLanguageModel::failing()));
        let report = pipeline.run(&wrapup_inputs()).await;

        assert!(report.degraded);
        // Heuristic comparison still detects the decline.
        assert_eq!(report.comparison.unwrap().trend, Trend::Declining);
        assert!(!report.recommendation.recommendations.is_empty());
        assert!(!report.formatted.headline.is_empty());
    }

    #[tokio::test]
    async fn three_shape_violations_then_fallback() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let model = FakeLanguageModel::with_handler(move |prompt| {
            if prompt.contains("Grade the delivery performance") {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok("not json at all".to_string())
            } else {
                Err(EngineError::transient("other agents out"))
            }
        });

        let mut inputs = wrapup_inputs();
        inputs.list_stats = None;
        inputs.reputation = None;
        let pipeline = AnalysisPipeline::new(Arc::new(model));
        let report = pipeline.run(&inputs).await;

        assert_eq!(calls.load(Ordering::SeqCst), MAX_SCHEMA_ATTEMPTS);
        assert!(report.degraded);
        assert!(report.delivery.is_some());
        assert!(report.list_quality.is_none());
    }

    #[tokio::test]
    async fn deadline_overrun_degrades_only_that_agent() {
        struct SlowModel {
            slow_calls: Mutex<u32>,
        }

        #[async_trait::async_trait]
        impl crate::connectors::LanguageModel for SlowModel {
            async fn generate(&self, prompt: &str) -> crate::error::EngineResult<String> {
                if prompt.contains("Compare two rounds") {
                    *self.slow_calls.lock() += 1;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Err(EngineError::transient("unused"))
            }
        }

        let pipeline = AnalysisPipeline::with_deadline(
            Arc::new(SlowModel {
                slow_calls: Mutex::new(0),
            }),
            Duration::from_millis(50),
        );
        let report = pipeline.run(&wrapup_inputs()).await;

        // The slow agent was attempted once, hit its deadline, and fell back.
        assert!(report.degraded);
        assert_eq!(report.comparison.unwrap().trend, Trend::Declining);
    }
}
