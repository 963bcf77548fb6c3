//! Wrap-up metrics collection
//!
//! Fetches post-send counters, derives and persists the immutable metrics
//! row, computes round-over-round deltas, and runs the analysis pipeline in
//! wrap-up mode.

use std::sync::Arc;
use tracing::info;

use crate::agents::{AnalysisInputs, AnalysisMode, AnalysisPipeline, AnalysisReport};
use crate::connectors::MailPlatform;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{compute_deltas, CampaignMetrics, MetricsDelta};
use crate::schedule::ScheduleId;
use crate::state::CampaignStore;
use crate::timebase::Timebase;

/// Result of one collection
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    /// The persisted metrics row
    pub persisted: CampaignMetrics,
    /// Deltas against the previous round; empty for round 1
    pub deltas: Vec<MetricsDelta>,
    /// Wrap-up analysis report
    pub report: AnalysisReport,
}

/// Collects and analyzes post-send statistics
pub struct MetricsCollector {
    store: Arc<CampaignStore>,
    mailer: Arc<dyn MailPlatform>,
    pipeline: Arc<AnalysisPipeline>,
    clock: Arc<dyn Timebase>,
}

impl MetricsCollector {
    /// Construct with injected collaborators
    pub fn new(
        store: Arc<CampaignStore>,
        mailer: Arc<dyn MailPlatform>,
        pipeline: Arc<AnalysisPipeline>,
        clock: Arc<dyn Timebase>,
    ) -> Self {
        Self {
            store,
            mailer,
            pipeline,
            clock,
        }
    }

    /// Collect statistics for a launched round.
    ///
    /// Fails with a not-launched error when the schedule has no external
    /// campaign id yet.
    pub async fn collect(&self, schedule_id: ScheduleId) -> EngineResult<CollectionOutcome> {
        let schedule = self.store.get(schedule_id)?;
        let campaign_id =
            schedule
                .external_campaign_id
                .ok_or_else(|| EngineError::NotLaunched {
                    schedule_id: schedule_id.to_string(),
                })?;

        let counters = self.mailer.get_detailed_statistics(campaign_id).await?;
        let persisted =
            CampaignMetrics::derive(schedule_id, campaign_id, counters, self.clock.now())?;
        self.store.append_metrics(&persisted)?;

        let previous = self.previous_round_metrics(&schedule.campaign_name, schedule.round_number)?;
        let deltas = match &previous {
            Some(previous) => compute_deltas(&persisted, previous),
            None => Vec::new(),
        };

        let inputs = AnalysisInputs {
            campaign_name: schedule.campaign_name.clone(),
            round_number: schedule.round_number,
            mode: AnalysisMode::Wrapup,
            list_stats: None,
            reputation: None,
            current_metrics: Some(persisted.clone()),
            previous_metrics: previous,
            deltas: deltas.clone(),
            is_final_round: schedule.round_number == 3,
        };
        let report = self.pipeline.run(&inputs).await;

        info!(
            schedule = %schedule_id,
            campaign = %schedule.campaign_name,
            round = schedule.round_number,
            delivery_rate = persisted.delivery_rate,
            degraded = report.degraded,
            "metrics collected"
        );

        Ok(CollectionOutcome {
            persisted,
            deltas,
            report,
        })
    }

    fn previous_round_metrics(
        &self,
        campaign_name: &str,
        round_number: u8,
    ) -> EngineResult<Option<CampaignMetrics>> {
        if round_number <= 1 {
            return Ok(None);
        }
        let rounds = self.store.fetch_campaign(campaign_name)?;
        match rounds
            .iter()
            .find(|r| r.round_number == round_number - 1)
        {
            Some(previous) => self.store.latest_metrics_for(previous.id),
            None => Ok(None),
        }
    }
}
