//! Stage orchestration
//!
//! Holds no persistent state. Each stage has one idempotent entry point: if
//! the schedule's notification entry for that stage is already sent, the call
//! succeeds without side effects. Otherwise the orchestrator gathers the
//! stage's data, posts the notification, and applies the associated status
//! transition.
//!
//! All work for one schedule runs under that schedule's async lock, so no two
//! stage operations mutate the same schedule concurrently. A whole stage run
//! is bounded by a deadline; an overrun is reported as retryable.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::metrics::collector::MetricsCollector;
use crate::notify::{render, Notifier};
use crate::queue::JobScheduler;
use crate::scheduling::StageOffsets;
use crate::schedule::{LogStatus, NotificationLog, RoundStatus, ScheduleId, Stage};
use crate::state::{machine, CampaignStore};
use crate::timebase::Timebase;
use crate::verification::{ReadinessStatus, Verifier};

/// Whole-stage wall-clock budget
const STAGE_DEADLINE: Duration = Duration::from_secs(120);

/// Result of one stage run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage had already posted; nothing was done
    AlreadySent,
    /// The stage posted its notification
    Posted {
        /// Chat message id of the post
        message_id: String,
    },
}

/// Binds a (round, stage) pair to its pipeline and transition
pub struct StageOrchestrator {
    store: Arc<CampaignStore>,
    verifier: Arc<Verifier>,
    collector: Arc<MetricsCollector>,
    notifier: Arc<Notifier>,
    mailer: Arc<dyn crate::connectors::MailPlatform>,
    jobs: Arc<JobScheduler>,
    offsets: StageOffsets,
    clock: Arc<dyn Timebase>,
    stage_locks: DashMap<ScheduleId, Arc<Mutex<()>>>,
    stage_deadline: Duration,
}

impl StageOrchestrator {
    /// Construct with injected collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<CampaignStore>,
        verifier: Arc<Verifier>,
        collector: Arc<MetricsCollector>,
        notifier: Arc<Notifier>,
        mailer: Arc<dyn crate::connectors::MailPlatform>,
        jobs: Arc<JobScheduler>,
        offsets: StageOffsets,
        clock: Arc<dyn Timebase>,
    ) -> Self {
        Self {
            store,
            verifier,
            collector,
            notifier,
            mailer,
            jobs,
            offsets,
            clock,
            stage_locks: DashMap::new(),
            stage_deadline: STAGE_DEADLINE,
        }
    }

    fn stage_lock(&self, id: ScheduleId) -> Arc<Mutex<()>> {
        self.stage_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Idempotent top-level entry for a stage
    pub async fn run(&self, stage: Stage, schedule_id: ScheduleId) -> EngineResult<StageOutcome> {
        let skip_preflight = false;
        match tokio::time::timeout(
            self.stage_deadline,
            self.run_locked(stage, schedule_id, skip_preflight),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::DeadlineExceeded {
                operation: format!("{} stage for {}", stage, schedule_id),
            }),
        }
    }

    /// Launch entry with the explicit pre-flight override
    pub async fn launch(
        &self,
        schedule_id: ScheduleId,
        skip_preflight: bool,
    ) -> EngineResult<StageOutcome> {
        match tokio::time::timeout(
            self.stage_deadline,
            self.run_locked(Stage::LaunchConfirmation, schedule_id, skip_preflight),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::DeadlineExceeded {
                operation: format!("launch for {}", schedule_id),
            }),
        }
    }

    async fn run_locked(
        &self,
        stage: Stage,
        schedule_id: ScheduleId,
        skip_preflight: bool,
    ) -> EngineResult<StageOutcome> {
        let lock = self.stage_lock(schedule_id);
        let _guard = lock.lock().await;

        let schedule = self.store.get(schedule_id)?;
        if schedule.is_stage_sent(stage) {
            info!(schedule = %schedule_id, stage = %stage, "stage already posted, skipping");
            return Ok(StageOutcome::AlreadySent);
        }
        if schedule.status == RoundStatus::Completed {
            return Err(EngineError::InvalidInput {
                reason: format!("round {} is completed", schedule_id),
            });
        }

        match stage {
            Stage::Prelaunch => self.run_prelaunch(schedule_id).await,
            Stage::Preflight => self.run_preflight(schedule_id).await,
            Stage::LaunchWarning => self.run_launch_warning(schedule_id).await,
            Stage::LaunchConfirmation => self.run_launch(schedule_id, skip_preflight).await,
            Stage::Wrapup => self.run_wrapup(schedule_id).await,
        }
    }

    fn require_not_blocked(&self, schedule_id: ScheduleId) -> EngineResult<crate::schedule::CampaignSchedule> {
        let schedule = self.store.get(schedule_id)?;
        if schedule.status == RoundStatus::Blocked {
            return Err(EngineError::InvalidInput {
                reason: format!("round {} is blocked; unblock it first", schedule_id),
            });
        }
        Ok(schedule)
    }

    async fn run_prelaunch(&self, schedule_id: ScheduleId) -> EngineResult<StageOutcome> {
        let schedule = self.require_not_blocked(schedule_id)?;
        let (blocks, fallback) = render::prelaunch(&schedule);
        let receipt = self
            .notifier
            .post_stage(schedule_id, Stage::Prelaunch, &blocks, &fallback, "announced")
            .await?;
        Ok(StageOutcome::Posted {
            message_id: receipt.message_id,
        })
    }

    async fn run_preflight(&self, schedule_id: ScheduleId) -> EngineResult<StageOutcome> {
        let schedule = self.require_not_blocked(schedule_id)?;
        let result = self.verifier.verify(schedule_id).await?;

        let (blocks, fallback) = render::preflight(&schedule, &result);
        let entry_status = match result.status {
            ReadinessStatus::Ready => "ready",
            ReadinessStatus::Warning => "warning",
            ReadinessStatus::Blocked => "blocked",
        };
        let receipt = self
            .notifier
            .post_stage(schedule_id, Stage::Preflight, &blocks, &fallback, entry_status)
            .await?;

        // A warning verdict is still launchable.
        let target = match result.status {
            ReadinessStatus::Ready | ReadinessStatus::Warning => RoundStatus::Ready,
            ReadinessStatus::Blocked => RoundStatus::Blocked,
        };
        self.store
            .update_status(schedule_id, target, self.clock.now())?;

        Ok(StageOutcome::Posted {
            message_id: receipt.message_id,
        })
    }

    async fn run_launch_warning(&self, schedule_id: ScheduleId) -> EngineResult<StageOutcome> {
        let schedule = self.require_not_blocked(schedule_id)?;
        let result = self.verifier.quick_verify(schedule_id).await?;

        let (blocks, fallback) = render::launch_warning(&schedule, &result);
        let entry_status = match result.status {
            ReadinessStatus::Ready => "ready",
            ReadinessStatus::Warning => "warning",
            ReadinessStatus::Blocked => "blocked",
        };
        let receipt = self
            .notifier
            .post_stage(
                schedule_id,
                Stage::LaunchWarning,
                &blocks,
                &fallback,
                entry_status,
            )
            .await?;

        if result.status == ReadinessStatus::Blocked {
            warn!(schedule = %schedule_id, "late verification failed, blocking round");
            self.store
                .update_status(schedule_id, RoundStatus::Blocked, self.clock.now())?;
        }

        Ok(StageOutcome::Posted {
            message_id: receipt.message_id,
        })
    }

    /// Composite launch: verify prerequisites, instruct the platform to
    /// send, confirm, and reschedule wrap-up from the observed launch time.
    async fn run_launch(
        &self,
        schedule_id: ScheduleId,
        skip_preflight: bool,
    ) -> EngineResult<StageOutcome> {
        let schedule = self.store.get(schedule_id)?;

        // Resume case: the round is SENT but the confirmation entry is still
        // unsent (the post failed, or the process died after the SENT flip).
        // The send must not be repeated; only the confirmation is owed. The
        // observed launch time is recovered from the wrap-up job, which was
        // anchored to it when the send was accepted.
        if schedule.status == RoundStatus::Sent {
            let send_start_at = self
                .jobs
                .status_of(schedule_id)?
                .get(&Stage::Wrapup)
                .map(|job| self.offsets.launch_before_wrapup(job.fire_at))
                .unwrap_or_else(|| self.clock.now());
            return self
                .post_confirmation(&schedule, schedule.recipient_count, send_start_at)
                .await;
        }

        match schedule.status {
            RoundStatus::Ready => {}
            RoundStatus::Scheduled | RoundStatus::Blocked if !skip_preflight => {
                return Err(EngineError::NotReady {
                    schedule_id: schedule_id.to_string(),
                    status: schedule.status.to_string(),
                });
            }
            RoundStatus::Scheduled => {
                // Explicit override: record the skipped pre-flight as a READY
                // transition so the launch edge stays within the DAG.
                warn!(schedule = %schedule_id, "launching with pre-flight skipped");
                self.store
                    .update_status(schedule_id, RoundStatus::Ready, self.clock.now())?;
            }
            other => {
                return Err(EngineError::NotReady {
                    schedule_id: schedule_id.to_string(),
                    status: other.to_string(),
                });
            }
        }

        let draft_id = schedule
            .external_draft_id
            .ok_or_else(|| EngineError::InvalidInput {
                reason: format!("round {} has no draft to send", schedule_id),
            })?;

        self.store.update(schedule_id, |s| {
            machine::check_transition(s.status, RoundStatus::Launching)?;
            s.status = RoundStatus::Launching;
            s.external_campaign_id = Some(draft_id);
            Ok(())
        })?;

        let receipt = match self.mailer.send_campaign_now(draft_id).await {
            Ok(receipt) => receipt,
            Err(e) => {
                // Launch failed: revert to SCHEDULED (clearing the campaign
                // id) and record the failure for the operator. The reverted
                // round needs a fresh pre-flight before it may launch, so a
                // queued retry could never succeed; the failure surfaces as
                // terminal.
                error!(schedule = %schedule_id, error = %e, "launch failed, reverting");
                self.store
                    .update_status(schedule_id, RoundStatus::Scheduled, self.clock.now())?;
                let attempt = self.store.next_attempt(schedule_id, Stage::LaunchConfirmation)?;
                self.store.append_log(&NotificationLog {
                    id: Uuid::new_v4(),
                    schedule_id,
                    stage: Stage::LaunchConfirmation,
                    attempt,
                    status: LogStatus::Failure,
                    external_message_id: None,
                    error_message: Some(format!("send failed: {}", e)),
                    sent_at: self.clock.now(),
                })?;
                return Err(EngineError::permanent(format!(
                    "send failed and round {} reverted to SCHEDULED; re-run pre-flight: {}",
                    schedule_id, e
                )));
            }
        };

        self.store
            .update_status(schedule_id, RoundStatus::Sent, self.clock.now())?;

        // Wrap-up runs its offset after the observed launch, not the planned T.
        let wrapup_at = self.offsets.wrapup_after(receipt.send_start_at);
        self.jobs.reschedule_stage(schedule_id, Stage::Wrapup, wrapup_at)?;

        info!(
            schedule = %schedule_id,
            queued = receipt.queued_count,
            "round launched"
        );

        let schedule = self.store.get(schedule_id)?;
        self.post_confirmation(&schedule, receipt.queued_count, receipt.send_start_at)
            .await
    }

    async fn post_confirmation(
        &self,
        schedule: &crate::schedule::CampaignSchedule,
        queued_count: u64,
        send_start_at: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<StageOutcome> {
        let (blocks, fallback) = render::launch_confirmation(schedule, queued_count, send_start_at);
        let receipt = self
            .notifier
            .post_stage(
                schedule.id,
                Stage::LaunchConfirmation,
                &blocks,
                &fallback,
                "sent",
            )
            .await?;
        Ok(StageOutcome::Posted {
            message_id: receipt.message_id,
        })
    }

    async fn run_wrapup(&self, schedule_id: ScheduleId) -> EngineResult<StageOutcome> {
        let outcome = self.collector.collect(schedule_id).await?;
        let schedule = self.store.get(schedule_id)?;

        let (blocks, fallback) = render::wrapup(&schedule, &outcome);
        let receipt = self
            .notifier
            .post_stage(schedule_id, Stage::Wrapup, &blocks, &fallback, "completed")
            .await?;

        self.store
            .update_status(schedule_id, RoundStatus::Completed, self.clock.now())?;

        Ok(StageOutcome::Posted {
            message_id: receipt.message_id,
        })
    }
}
