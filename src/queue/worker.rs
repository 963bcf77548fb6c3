//! Job execution loop
//!
//! Polls the durable queue for due jobs, dispatches each to the stage
//! orchestrator on its own task, and records the outcome back into the queue.
//! Overdue jobs found at startup (enqueued before a crash) are claimed on the
//! first poll, which is what makes delivery at-least-once across restarts.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::EngineError;
use crate::orchestrator::StageOrchestrator;
use crate::queue::{JobScheduler, StageJob, MAX_RETRIES};
use crate::schedule::{LogStatus, NotificationLog};
use crate::state::CampaignStore;
use crate::timebase::Timebase;

/// Jobs claimed per poll
const CLAIM_BATCH: usize = 16;
/// Default poll interval
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Running worker; dropping the handle does not stop the loop
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the loop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Polling executor over the durable queue
pub struct JobWorker {
    scheduler: Arc<JobScheduler>,
    orchestrator: Arc<StageOrchestrator>,
    store: Arc<CampaignStore>,
    clock: Arc<dyn Timebase>,
    poll_interval: Duration,
}

impl JobWorker {
    /// Construct with the default poll interval
    pub fn new(
        scheduler: Arc<JobScheduler>,
        orchestrator: Arc<StageOrchestrator>,
        store: Arc<CampaignStore>,
        clock: Arc<dyn Timebase>,
    ) -> Self {
        Self {
            scheduler,
            orchestrator,
            store,
            clock,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Start the loop on its own task
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!("job worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.scheduler.claim_due(CLAIM_BATCH) {
                Ok(jobs) => {
                    for job in jobs {
                        let scheduler = self.scheduler.clone();
                        let orchestrator = self.orchestrator.clone();
                        let store = self.store.clone();
                        let clock = self.clock.clone();
                        tokio::spawn(async move {
                            execute(scheduler, orchestrator, store, clock, job).await;
                        });
                    }
                }
                Err(e) => error!(error = %e, "failed to claim due jobs"),
            }
            tokio::select! {
                _ = self.clock.sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!("job worker stopped");
    }
}

async fn execute(
    scheduler: Arc<JobScheduler>,
    orchestrator: Arc<StageOrchestrator>,
    store: Arc<CampaignStore>,
    clock: Arc<dyn Timebase>,
    job: StageJob,
) {
    debug!(schedule = %job.schedule_id, stage = %job.stage, "dispatching job");
    match orchestrator.run(job.stage, job.schedule_id).await {
        Ok(_) => {
            if let Err(e) = scheduler.complete(&job) {
                error!(schedule = %job.schedule_id, stage = %job.stage, error = %e, "failed to record job completion");
            }
        }
        Err(e) => {
            let will_retry = e.is_retryable() && job.attempt + 1 <= MAX_RETRIES;
            if will_retry {
                // Mark the scheduled retry in the notification log before the
                // job re-enters the queue, so the operator surface shows the
                // stage as in-retry rather than terminally failed.
                if let Err(log_err) = append_retrying_log(&store, &clock, &job, &e) {
                    error!(schedule = %job.schedule_id, stage = %job.stage, error = %log_err, "failed to append retrying log");
                }
            }
            if let Err(record_err) = scheduler.fail(&job, &e) {
                error!(schedule = %job.schedule_id, stage = %job.stage, error = %record_err, "failed to record job failure");
            }
        }
    }
}

fn append_retrying_log(
    store: &CampaignStore,
    clock: &Arc<dyn Timebase>,
    job: &StageJob,
    error: &EngineError,
) -> crate::error::EngineResult<()> {
    let attempt = store.next_attempt(job.schedule_id, job.stage)?;
    store.append_log(&NotificationLog {
        id: Uuid::new_v4(),
        schedule_id: job.schedule_id,
        stage: job.stage,
        attempt,
        status: LogStatus::Retrying,
        external_message_id: None,
        error_message: Some(error.to_string()),
        sent_at: clock.now(),
    })
}
