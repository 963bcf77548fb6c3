//! Durable delayed-job scheduling
//!
//! One job per (schedule, stage), persisted in sled so jobs enqueued before a
//! crash fire after restart. Delivery is at-least-once relative to `fire_at`;
//! the orchestrator's idempotency absorbs duplicates. Execution claims a
//! lease so concurrent workers never double-run one job.

pub mod worker;

pub use worker::JobWorker;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::schedule::{CampaignSchedule, ScheduleId, Stage};
use crate::scheduling::StageOffsets;
use crate::timebase::Timebase;

/// Retries after the first failed execution
pub const MAX_RETRIES: u32 = 3;
/// Backoff base for the first retry
const RETRY_BASE_SECS: i64 = 5;
/// Lease duration while a worker executes a job
const LEASE_SECS: i64 = 180;

/// Execution state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for its fire time
    Pending,
    /// Failed and waiting out a retry backoff
    Delayed,
    /// Claimed by a worker
    Active,
    /// Finished successfully
    Completed,
    /// Retry budget exhausted; dead-lettered
    Failed,
}

/// One durable stage job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageJob {
    /// Job id
    pub id: Uuid,
    /// Schedule the job drives
    pub schedule_id: ScheduleId,
    /// Stage to run
    pub stage: Stage,
    /// When to fire (or retry)
    pub fire_at: DateTime<Utc>,
    /// Execution state
    pub state: JobState,
    /// Completed executions that failed
    pub attempt: u32,
    /// Lease expiry while active
    pub lease_until: Option<DateTime<Utc>>,
    /// Last execution error
    pub last_error: Option<String>,
}

/// Job state snapshot for the inspection surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Execution state
    pub state: JobState,
    /// Fire (or retry) time
    pub fire_at: DateTime<Utc>,
}

/// Dead-letter record requiring operator action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// The exhausted job
    pub job: StageJob,
    /// Error from the final attempt
    pub error: String,
    /// When the budget ran out
    pub exhausted_at: DateTime<Utc>,
}

fn job_key(id: ScheduleId, stage: Stage) -> String {
    format!("job:{}:{}", id, stage)
}

fn dead_key(id: ScheduleId, stage: Stage) -> String {
    format!("dead:{}:{}", id, stage)
}

fn ser<T: Serialize>(value: &T) -> EngineResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| EngineError::storage(format!("serialize: {}", e)))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    serde_json::from_slice(bytes).map_err(|e| EngineError::storage(format!("deserialize: {}", e)))
}

/// Durable timer queue over the engine's database
pub struct JobScheduler {
    db: sled::Db,
    offsets: StageOffsets,
    clock: Arc<dyn Timebase>,
}

impl JobScheduler {
    /// Construct over an open database
    pub fn new(db: sled::Db, offsets: StageOffsets, clock: Arc<dyn Timebase>) -> Self {
        Self { db, offsets, clock }
    }

    fn put(&self, job: &StageJob) -> EngineResult<()> {
        self.db
            .insert(job_key(job.schedule_id, job.stage).as_bytes(), ser(job)?)
            .map_err(EngineError::storage)?;
        Ok(())
    }

    /// Enqueue the five stage jobs for one round at its planned launch time
    pub fn enqueue_schedule(&self, schedule: &CampaignSchedule) -> EngineResult<()> {
        for stage in Stage::all() {
            let job = StageJob {
                id: Uuid::new_v4(),
                schedule_id: schedule.id,
                stage,
                fire_at: self.offsets.trigger_time(schedule.scheduled_date, stage),
                state: JobState::Pending,
                attempt: 0,
                lease_until: None,
                last_error: None,
            };
            self.put(&job)?;
        }
        info!(schedule = %schedule.id, launch = %schedule.scheduled_date, "stage jobs enqueued");
        Ok(())
    }

    /// Replace one stage job with a new fire time (used when wrap-up shifts
    /// to the observed launch time)
    pub fn reschedule_stage(
        &self,
        schedule_id: ScheduleId,
        stage: Stage,
        fire_at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let job = StageJob {
            id: Uuid::new_v4(),
            schedule_id,
            stage,
            fire_at,
            state: JobState::Pending,
            attempt: 0,
            lease_until: None,
            last_error: None,
        };
        self.put(&job)
    }

    /// Remove all pending jobs for a schedule; safe to call at any time
    pub fn cancel_jobs_for(&self, schedule_id: ScheduleId) -> EngineResult<()> {
        for stage in Stage::all() {
            let key = job_key(schedule_id, stage);
            if let Some(bytes) = self.db.get(key.as_bytes()).map_err(EngineError::storage)? {
                let job: StageJob = de(&bytes)?;
                if matches!(job.state, JobState::Pending | JobState::Delayed) {
                    self.db.remove(key.as_bytes()).map_err(EngineError::storage)?;
                }
            }
        }
        info!(schedule = %schedule_id, "pending jobs cancelled");
        Ok(())
    }

    /// Cancel then re-enqueue all five stages relative to a new launch time
    pub fn reschedule_jobs_for(
        &self,
        schedule_id: ScheduleId,
        new_launch: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.cancel_jobs_for(schedule_id)?;
        for stage in Stage::all() {
            self.reschedule_stage(
                schedule_id,
                stage,
                self.offsets.trigger_time(new_launch, stage),
            )?;
        }
        Ok(())
    }

    /// Per-stage state snapshot for one schedule
    pub fn status_of(&self, schedule_id: ScheduleId) -> EngineResult<HashMap<Stage, JobStatus>> {
        let mut status = HashMap::new();
        for stage in Stage::all() {
            if let Some(bytes) = self
                .db
                .get(job_key(schedule_id, stage).as_bytes())
                .map_err(EngineError::storage)?
            {
                let job: StageJob = de(&bytes)?;
                status.insert(
                    stage,
                    JobStatus {
                        state: job.state,
                        fire_at: job.fire_at,
                    },
                );
            }
        }
        Ok(status)
    }

    /// Claim due jobs for execution.
    ///
    /// A job is due when its fire time has passed, it is pending or delayed
    /// (or its active lease expired, which covers worker crashes), and no
    /// live lease exists. Claimed jobs are marked active with a fresh lease
    /// before they are returned.
    pub fn claim_due(&self, limit: usize) -> EngineResult<Vec<StageJob>> {
        let now = self.clock.now();
        let mut claimed = Vec::new();
        for entry in self.db.scan_prefix(b"job:") {
            if claimed.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(EngineError::storage)?;
            let mut job: StageJob = de(&value)?;

            let claimable = match job.state {
                JobState::Pending | JobState::Delayed => job.fire_at <= now,
                JobState::Active => job.lease_until.is_some_and(|lease| lease < now),
                JobState::Completed | JobState::Failed => false,
            };
            if !claimable {
                continue;
            }

            job.state = JobState::Active;
            job.lease_until = Some(now + ChronoDuration::seconds(LEASE_SECS));
            self.db
                .insert(key, ser(&job)?)
                .map_err(EngineError::storage)?;
            claimed.push(job);
        }
        Ok(claimed)
    }

    /// Mark a claimed job finished
    pub fn complete(&self, job: &StageJob) -> EngineResult<()> {
        let mut done = job.clone();
        done.state = JobState::Completed;
        done.lease_until = None;
        done.last_error = None;
        self.put(&done)
    }

    /// Record a failed execution.
    ///
    /// Retryable failures re-enter the queue with exponential backoff (5 s,
    /// 10 s, 20 s). A non-retryable failure, or an exhausted budget, moves
    /// the job to the dead-letter view and logs an operator alert.
    pub fn fail(&self, job: &StageJob, error: &EngineError) -> EngineResult<()> {
        let now = self.clock.now();
        let mut failed = job.clone();
        failed.attempt += 1;
        failed.lease_until = None;
        failed.last_error = Some(error.to_string());

        if error.is_retryable() && failed.attempt <= MAX_RETRIES {
            let backoff = RETRY_BASE_SECS * 2i64.pow(failed.attempt - 1);
            failed.state = JobState::Delayed;
            failed.fire_at = now + ChronoDuration::seconds(backoff);
            tracing::warn!(
                schedule = %job.schedule_id,
                stage = %job.stage,
                attempt = failed.attempt,
                backoff_secs = backoff,
                error = %error,
                "job failed, retry scheduled"
            );
            return self.put(&failed);
        }

        failed.state = JobState::Failed;
        self.put(&failed)?;
        let dead = DeadLetter {
            job: failed.clone(),
            error: error.to_string(),
            exhausted_at: now,
        };
        self.db
            .insert(dead_key(job.schedule_id, job.stage).as_bytes(), ser(&dead)?)
            .map_err(EngineError::storage)?;
        error!(
            schedule = %job.schedule_id,
            stage = %job.stage,
            attempts = failed.attempt,
            error = %error,
            "job dead-lettered; operator action required"
        );
        Ok(())
    }

    /// All dead-letter records
    pub fn dead_letters(&self) -> EngineResult<Vec<DeadLetter>> {
        let mut dead = Vec::new();
        for entry in self.db.scan_prefix(b"dead:") {
            let (_, value) = entry.map_err(EngineError::storage)?;
            dead.push(de(&value)?);
        }
        Ok(dead)
    }
}
