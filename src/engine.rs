//! Campaign engine facade
//!
//! Owns campaign creation (partition + atomic persistence + job enqueue) and
//! the operator surface: status, cancel, unblock, reschedule, job inspection.
//! Stage execution itself lives in the orchestrator; the engine never mutates
//! a schedule outside the store's serialized update path.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::orchestrator::{StageOrchestrator, StageOutcome};
use crate::queue::{DeadLetter, JobScheduler, JobStatus};
use crate::scheduling::{batch, calendar};
use crate::schedule::{
    CampaignSchedule, NotificationStatus, RoundStatus, ScheduleId, Stage,
};
use crate::state::CampaignStore;
use crate::timebase::Timebase;

/// Inputs for creating a campaign
#[derive(Debug, Clone)]
pub struct CreateCampaignRequest {
    /// Campaign name; natural key across its three rounds
    pub campaign_name: String,
    /// Prefix for per-round list names
    pub list_id_prefix: String,
    /// Message subject
    pub subject: String,
    /// Sender display name
    pub sender_name: String,
    /// Sender address
    pub sender_email: String,
    /// Total recipients to split across the rounds
    pub total_recipients: u64,
    /// Mail-platform list ids, one per round
    pub external_list_ids: [u64; 3],
    /// Draft prepared ahead of time, if any
    pub external_draft_id: Option<u64>,
    /// Earliest instant to schedule from; defaults to now
    pub start_date: Option<DateTime<Utc>>,
}

/// Top-level engine handle
pub struct CampaignEngine {
    store: Arc<CampaignStore>,
    jobs: Arc<JobScheduler>,
    orchestrator: Arc<StageOrchestrator>,
    clock: Arc<dyn Timebase>,
}

impl CampaignEngine {
    /// Construct with injected components
    pub fn new(
        store: Arc<CampaignStore>,
        jobs: Arc<JobScheduler>,
        orchestrator: Arc<StageOrchestrator>,
        clock: Arc<dyn Timebase>,
    ) -> Self {
        Self {
            store,
            jobs,
            orchestrator,
            clock,
        }
    }

    /// Create a campaign: partition the recipient base into three rounds,
    /// persist all rounds atomically, and enqueue the five stage jobs per
    /// round.
    pub fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
    ) -> EngineResult<Vec<CampaignSchedule>> {
        if request.campaign_name.trim().is_empty() {
            return Err(EngineError::InvalidInput {
                reason: "campaign name must not be empty".into(),
            });
        }
        if !request.sender_email.contains('@') {
            return Err(EngineError::InvalidInput {
                reason: format!("'{}' is not a sender address", request.sender_email),
            });
        }

        let start = request.start_date.unwrap_or_else(|| self.clock.now());
        let slots = batch::partition(request.total_recipients, start)?;
        let now = self.clock.now();

        let schedules: Vec<CampaignSchedule> = slots
            .iter()
            .map(|slot| CampaignSchedule {
                id: ScheduleId::new(),
                campaign_name: request.campaign_name.clone(),
                round_number: slot.round,
                scheduled_date: slot.scheduled_at,
                scheduled_time: "09:15".into(),
                list_name: format!("{}-round-{}", request.list_id_prefix, slot.round),
                external_list_id: request.external_list_ids[(slot.round - 1) as usize],
                recipient_count: slot.count,
                recipient_range: slot.range_label(),
                subject: request.subject.clone(),
                sender_name: request.sender_name.clone(),
                sender_email: request.sender_email.clone(),
                external_draft_id: request.external_draft_id,
                external_campaign_id: None,
                notification_status: NotificationStatus::default(),
                status: RoundStatus::Scheduled,
                created_at: now,
                updated_at: now,
            })
            .collect();

        self.store.create_campaign(&schedules)?;
        for schedule in &schedules {
            self.jobs.enqueue_schedule(schedule)?;
        }

        info!(
            campaign = %request.campaign_name,
            recipients = request.total_recipients,
            first_launch = %schedules[0].scheduled_date,
            "campaign created"
        );
        Ok(schedules)
    }

    /// All rounds of a campaign, ordered by round number
    pub fn campaign_status(&self, name: &str) -> EngineResult<Vec<CampaignSchedule>> {
        let rounds = self.store.fetch_campaign(name)?;
        if rounds.is_empty() {
            return Err(EngineError::CampaignNotFound { name: name.into() });
        }
        Ok(rounds)
    }

    /// One schedule by id
    pub fn schedule(&self, id: ScheduleId) -> EngineResult<CampaignSchedule> {
        self.store.get(id)
    }

    /// Manually run a stage
    pub async fn run_stage(&self, stage: Stage, id: ScheduleId) -> EngineResult<StageOutcome> {
        self.orchestrator.run(stage, id).await
    }

    /// Launch a round, optionally skipping the pre-flight requirement
    pub async fn launch(&self, id: ScheduleId, skip_preflight: bool) -> EngineResult<StageOutcome> {
        self.orchestrator.launch(id, skip_preflight).await
    }

    /// Cancel a round: remove its pending jobs and block it.
    ///
    /// Already-posted chat messages are not retracted. A round past launch
    /// keeps its status; only future work is cancelled.
    pub fn cancel(&self, id: ScheduleId, reason: &str) -> EngineResult<CampaignSchedule> {
        self.jobs.cancel_jobs_for(id)?;
        let schedule = self.store.get(id)?;
        let updated = match schedule.status {
            RoundStatus::Scheduled | RoundStatus::Ready => {
                self.store
                    .update_status(id, RoundStatus::Blocked, self.clock.now())?
            }
            other => {
                warn!(schedule = %id, status = %other, "cancel leaves status unchanged");
                schedule
            }
        };
        info!(schedule = %id, reason, "round cancelled");
        Ok(updated)
    }

    /// Explicitly unblock a round so it can be re-verified
    pub fn unblock(&self, id: ScheduleId) -> EngineResult<CampaignSchedule> {
        let updated = self
            .store
            .update_status(id, RoundStatus::Scheduled, self.clock.now())?;
        info!(schedule = %id, "round unblocked");
        Ok(updated)
    }

    /// Move a round to a new launch slot and re-enqueue its jobs.
    ///
    /// The requested instant is normalized onto the next eligible Tue/Thu
    /// 09:15 UTC slot.
    pub fn reschedule(
        &self,
        id: ScheduleId,
        new_launch: DateTime<Utc>,
    ) -> EngineResult<CampaignSchedule> {
        let slot = calendar::next_eligible_slot(new_launch);
        let updated = self.store.update(id, |schedule| {
            if matches!(
                schedule.status,
                RoundStatus::Launching | RoundStatus::Sent | RoundStatus::Completed
            ) {
                return Err(EngineError::InvalidInput {
                    reason: format!(
                        "round {} is past launch and cannot be rescheduled",
                        schedule.id
                    ),
                });
            }
            schedule.scheduled_date = slot;
            schedule.updated_at = self.clock.now();
            Ok(())
        })?;
        self.jobs.reschedule_jobs_for(id, slot)?;
        info!(schedule = %id, launch = %slot, "round rescheduled");
        Ok(updated)
    }

    /// Per-stage job states for a schedule
    pub fn job_status(&self, id: ScheduleId) -> EngineResult<HashMap<Stage, JobStatus>> {
        self.jobs.status_of(id)
    }

    /// Dead-letter records awaiting operator action
    pub fn dead_letters(&self) -> EngineResult<Vec<DeadLetter>> {
        self.jobs.dead_letters()
    }

    /// Stages whose last notification attempt failed and never recovered
    pub fn failed_logs_needing_retry(&self) -> EngineResult<Vec<crate::schedule::NotificationLog>> {
        self.store.failed_logs_needing_retry()
    }
}
