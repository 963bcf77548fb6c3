//! Posting stage notifications
//!
//! One code path serves all five stages: post the rendered blocks, capture
//! the returned message id, append a notification-log row per attempt, and
//! flip the schedule's notification entry exactly once on success.
//!
//! Chat failures are retried up to three times inside one stage run; every
//! failed attempt is logged with status FAILURE, and a fatal (4xx/validation)
//! error aborts immediately. The caller decides whether a retryable
//! exhaustion re-enters through the job scheduler.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::connectors::{ChatPoster, ChatReceipt};
use crate::error::EngineResult;
use crate::schedule::{LogStatus, NotificationLog, ScheduleId, Stage};
use crate::state::CampaignStore;
use crate::timebase::Timebase;

/// Chat post attempts per stage run
const MAX_POST_ATTEMPTS: u32 = 3;
/// Pause between in-run post attempts
const POST_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Posts stage messages and maintains the notification log
pub struct Notifier {
    store: Arc<CampaignStore>,
    chat: Arc<dyn ChatPoster>,
    channel: String,
    clock: Arc<dyn Timebase>,
}

impl Notifier {
    /// Construct with injected collaborators
    pub fn new(
        store: Arc<CampaignStore>,
        chat: Arc<dyn ChatPoster>,
        channel: String,
        clock: Arc<dyn Timebase>,
    ) -> Self {
        Self {
            store,
            chat,
            channel,
            clock,
        }
    }

    /// Post a stage notification and record the outcome.
    ///
    /// On success the log row and the notification-entry flip are written
    /// back to back under the schedule's write lock; the entry carries the
    /// message id of the successful attempt.
    pub async fn post_stage(
        &self,
        schedule_id: ScheduleId,
        stage: Stage,
        blocks: &serde_json::Value,
        fallback_text: &str,
        entry_status: &str,
    ) -> EngineResult<ChatReceipt> {
        let mut tries = 0u32;
        loop {
            tries += 1;
            let attempt = self.store.next_attempt(schedule_id, stage)?;
            match self
                .chat
                .post_message(&self.channel, blocks, fallback_text)
                .await
            {
                Ok(receipt) => {
                    let now = self.clock.now();
                    self.store.append_log(&NotificationLog {
                        id: Uuid::new_v4(),
                        schedule_id,
                        stage,
                        attempt,
                        status: LogStatus::Success,
                        external_message_id: Some(receipt.message_id.clone()),
                        error_message: None,
                        sent_at: now,
                    })?;
                    self.store.update(schedule_id, |schedule| {
                        schedule.mark_stage_sent(
                            stage,
                            now,
                            entry_status,
                            Some(receipt.message_id.clone()),
                        )
                    })?;
                    info!(
                        schedule = %schedule_id,
                        stage = %stage,
                        attempt,
                        message_id = %receipt.message_id,
                        "stage notification posted"
                    );
                    return Ok(receipt);
                }
                Err(e) => {
                    self.store.append_log(&NotificationLog {
                        id: Uuid::new_v4(),
                        schedule_id,
                        stage,
                        attempt,
                        status: LogStatus::Failure,
                        external_message_id: None,
                        error_message: Some(e.to_string()),
                        sent_at: self.clock.now(),
                    })?;
                    if !e.is_retryable() {
                        error!(schedule = %schedule_id, stage = %stage, attempt, error = %e, "stage notification failed fatally");
                        return Err(e);
                    }
                    if tries >= MAX_POST_ATTEMPTS {
                        error!(schedule = %schedule_id, stage = %stage, attempt, error = %e, "stage notification failed after retries");
                        return Err(e);
                    }
                    warn!(schedule = %schedule_id, stage = %stage, attempt, error = %e, "stage notification failed, retrying");
                    self.clock.sleep(POST_RETRY_PAUSE * tries).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testing::{FakeChatPoster, ScriptedFailure};
    use crate::schedule::{
        CampaignSchedule, NotificationStatus, RoundStatus,
    };
    use crate::timebase::ManualClock;
    use chrono::{TimeZone, Utc};

    fn setup() -> (Arc<CampaignStore>, Arc<FakeChatPoster>, Notifier, ScheduleId) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = Arc::new(CampaignStore::new(db));
        let chat = Arc::new(FakeChatPoster::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 10, 2, 6, 0, 0).unwrap(),
        ));
        let now = clock.now();

        let rounds: Vec<CampaignSchedule> = (1..=3)
            .map(|n| CampaignSchedule {
                id: ScheduleId::new(),
                campaign_name: "Q4".into(),
                round_number: n,
                scheduled_date: Utc.with_ymd_and_hms(2025, 10, 2, 9, 15, 0).unwrap()
                    + chrono::Duration::days(n as i64 * 5),
                scheduled_time: "09:15".into(),
                list_name: format!("q4-{}", n),
                external_list_id: n as u64,
                recipient_count: 100,
                recipient_range: "1-100".into(),
                subject: "s".into(),
                sender_name: "Ops".into(),
                sender_email: "ops@example.com".into(),
                external_draft_id: Some(1),
                external_campaign_id: None,
                notification_status: NotificationStatus::default(),
                status: RoundStatus::Scheduled,
                created_at: now,
                updated_at: now,
            })
            .collect();
        store.create_campaign(&rounds).unwrap();
        let id = rounds[0].id;

        let notifier = Notifier::new(store.clone(), chat.clone(), "#campaigns".into(), clock);
        (store, chat, notifier, id)
    }

    #[tokio::test]
    async fn clean_post_logs_attempt_one() {
        let (store, chat, notifier, id) = setup();
        let blocks = serde_json::json!([{"type": "section"}]);

        let receipt = notifier
            .post_stage(id, Stage::Prelaunch, &blocks, "fallback", "announced")
            .await
            .unwrap();

        assert_eq!(chat.posts().len(), 1);
        let logs = store.logs_for(id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].attempt, 1);
        assert_eq!(logs[0].status, LogStatus::Success);

        let schedule = store.get(id).unwrap();
        let entry = schedule.notification_status.entry(Stage::Prelaunch);
        assert!(entry.sent);
        assert_eq!(entry.external_message_id.as_deref(), Some(receipt.message_id.as_str()));
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let (store, chat, notifier, id) = setup();
        chat.fail_posts([ScriptedFailure::Transient, ScriptedFailure::Transient]);
        let blocks = serde_json::json!([]);

        let receipt = notifier
            .post_stage(id, Stage::Preflight, &blocks, "fallback", "ready")
            .await
            .unwrap();

        // Two failures and one success, attempts 1..=3; the entry carries the
        // message id of attempt 3.
        assert_eq!(chat.attempts(), 3);
        let logs = store.logs_for(id).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(
            logs.iter().filter(|l| l.status == LogStatus::Failure).count(),
            2
        );
        assert_eq!(logs[2].status, LogStatus::Success);
        assert_eq!(logs[2].attempt, 3);

        let schedule = store.get(id).unwrap();
        let entry = schedule.notification_status.entry(Stage::Preflight);
        assert_eq!(entry.external_message_id.as_deref(), Some(receipt.message_id.as_str()));
        assert_eq!(receipt.message_id, "msg-3");
    }

    #[tokio::test]
    async fn fatal_failure_does_not_mark_sent() {
        let (store, chat, notifier, id) = setup();
        chat.fail_posts([ScriptedFailure::Permanent]);
        let blocks = serde_json::json!([]);

        let err = notifier
            .post_stage(id, Stage::Preflight, &blocks, "fallback", "ready")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(chat.attempts(), 1);

        let logs = store.logs_for(id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Failure);
        assert!(!store.get(id).unwrap().is_stage_sent(Stage::Preflight));
    }

    #[tokio::test]
    async fn retry_budget_is_three_attempts() {
        let (store, chat, notifier, id) = setup();
        chat.fail_posts([
            ScriptedFailure::Transient,
            ScriptedFailure::Transient,
            ScriptedFailure::Transient,
            ScriptedFailure::Transient,
        ]);
        let blocks = serde_json::json!([]);

        let err = notifier
            .post_stage(id, Stage::Wrapup, &blocks, "fallback", "completed")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(chat.attempts(), 3);
        assert_eq!(store.logs_for(id).unwrap().len(), 3);
        assert!(!store.get(id).unwrap().is_stage_sent(Stage::Wrapup));
    }
}
