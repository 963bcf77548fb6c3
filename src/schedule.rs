//! Campaign schedule domain model
//!
//! One [`CampaignSchedule`] exists per (campaign, round). A campaign always has
//! exactly three rounds; each round walks the five-stage lifecycle tracked by
//! its [`NotificationStatus`] record and its [`RoundStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Unique identifier for a campaign schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(#[serde(with = "uuid::serde::compact")] pub Uuid);

impl ScheduleId {
    /// Generate a new schedule ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string
    pub fn parse_str(s: &str) -> EngineResult<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| EngineError::InvalidInput {
            reason: format!("Invalid schedule ID: {}", e),
        })
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Announcement, 21 hours before launch
    Prelaunch,
    /// Readiness verification, 3 h 15 m before launch
    Preflight,
    /// Final warning, 15 minutes before launch
    LaunchWarning,
    /// Send confirmation, at launch
    LaunchConfirmation,
    /// Post-send statistics, 30 minutes after launch
    Wrapup,
}

impl Stage {
    /// All stages in trigger order
    pub fn all() -> [Stage; 5] {
        [
            Stage::Prelaunch,
            Stage::Preflight,
            Stage::LaunchWarning,
            Stage::LaunchConfirmation,
            Stage::Wrapup,
        ]
    }

    /// Stable string key for storage and display
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prelaunch => "prelaunch",
            Stage::Preflight => "preflight",
            Stage::LaunchWarning => "launchWarning",
            Stage::LaunchConfirmation => "launchConfirmation",
            Stage::Wrapup => "wrapup",
        }
    }

    /// Parse from the stable string key
    pub fn parse_str(s: &str) -> EngineResult<Self> {
        match s {
            "prelaunch" => Ok(Stage::Prelaunch),
            "preflight" => Ok(Stage::Preflight),
            "launchWarning" => Ok(Stage::LaunchWarning),
            "launchConfirmation" => Ok(Stage::LaunchConfirmation),
            "wrapup" => Ok(Stage::Wrapup),
            other => Err(EngineError::InvalidInput {
                reason: format!("Unknown stage: {}", other),
            }),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Round lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundStatus {
    /// Round is scheduled and waiting for pre-flight
    Scheduled,
    /// Pre-flight passed; round may launch
    Ready,
    /// Launch is in progress
    Launching,
    /// Mail platform accepted the send
    Sent,
    /// Wrap-up finished; terminal
    Completed,
    /// Pre-flight failed or round was cancelled
    Blocked,
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoundStatus::Scheduled => "SCHEDULED",
            RoundStatus::Ready => "READY",
            RoundStatus::Launching => "LAUNCHING",
            RoundStatus::Sent => "SENT",
            RoundStatus::Completed => "COMPLETED",
            RoundStatus::Blocked => "BLOCKED",
        };
        write!(f, "{}", s)
    }
}

/// Per-stage entry within a schedule's notification record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    /// Whether the stage notification was posted
    pub sent: bool,
    /// When the notification was posted
    pub timestamp: Option<DateTime<Utc>>,
    /// Outcome recorded with the post (e.g. "ready", "blocked", "sent")
    pub status: Option<String>,
    /// Chat message id returned by the poster
    pub external_message_id: Option<String>,
}

/// Fixed-shape record of the five stage entries
///
/// Arbitrary keys are forbidden by construction: the only way to address an
/// entry is through a [`Stage`] tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
    /// Pre-launch announce entry
    pub prelaunch: NotificationEntry,
    /// Pre-flight verify entry
    pub preflight: NotificationEntry,
    /// Launch warning entry
    pub launch_warning: NotificationEntry,
    /// Launch confirmation entry
    pub launch_confirmation: NotificationEntry,
    /// Wrap-up entry
    pub wrapup: NotificationEntry,
}

impl NotificationStatus {
    /// Read the entry for a stage
    pub fn entry(&self, stage: Stage) -> &NotificationEntry {
        match stage {
            Stage::Prelaunch => &self.prelaunch,
            Stage::Preflight => &self.preflight,
            Stage::LaunchWarning => &self.launch_warning,
            Stage::LaunchConfirmation => &self.launch_confirmation,
            Stage::Wrapup => &self.wrapup,
        }
    }

    /// Mutable entry for a stage
    pub fn entry_mut(&mut self, stage: Stage) -> &mut NotificationEntry {
        match stage {
            Stage::Prelaunch => &mut self.prelaunch,
            Stage::Preflight => &mut self.preflight,
            Stage::LaunchWarning => &mut self.launch_warning,
            Stage::LaunchConfirmation => &mut self.launch_confirmation,
            Stage::Wrapup => &mut self.wrapup,
        }
    }
}

/// Persistent record for one (campaign, round)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSchedule {
    /// Surrogate identifier
    pub id: ScheduleId,
    /// Campaign this round belongs to
    pub campaign_name: String,
    /// Round number, 1..=3
    pub round_number: u8,
    /// Launch instant: a Tuesday or Thursday at 09:15:00 UTC
    pub scheduled_date: DateTime<Utc>,
    /// Redundant wall-clock string, always "09:15"
    pub scheduled_time: String,
    /// Recipient list name
    pub list_name: String,
    /// Mail-platform list id
    pub external_list_id: u64,
    /// Number of recipients in this round
    pub recipient_count: u64,
    /// Contiguous 1-based range "lo-hi"; hi < lo encodes an empty round
    pub recipient_range: String,
    /// Message subject
    pub subject: String,
    /// Sender display name
    pub sender_name: String,
    /// Sender address
    pub sender_email: String,
    /// Mail-platform draft id, if a draft was prepared ahead of time
    pub external_draft_id: Option<u64>,
    /// Mail-platform campaign id; populated at launch, never before
    pub external_campaign_id: Option<u64>,
    /// Per-stage notification record
    pub notification_status: NotificationStatus,
    /// Round lifecycle status
    pub status: RoundStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CampaignSchedule {
    /// Whether the notification for a stage has already been posted
    pub fn is_stage_sent(&self, stage: Stage) -> bool {
        self.notification_status.entry(stage).sent
    }

    /// Flip a stage entry to sent.
    ///
    /// The flip is monotone: once sent, an entry never returns to unsent, so a
    /// second flip for the same stage is rejected.
    pub fn mark_stage_sent(
        &mut self,
        stage: Stage,
        now: DateTime<Utc>,
        status: impl Into<String>,
        external_message_id: Option<String>,
    ) -> EngineResult<()> {
        let entry = self.notification_status.entry_mut(stage);
        if entry.sent {
            return Err(EngineError::Internal {
                message: format!(
                    "Stage {} already marked sent for schedule {}",
                    stage, self.id
                ),
            });
        }
        entry.sent = true;
        entry.timestamp = Some(now);
        entry.status = Some(status.into());
        entry.external_message_id = external_message_id;
        self.updated_at = now;
        Ok(())
    }
}

/// Outcome recorded for one notification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStatus {
    /// Notification posted
    Success,
    /// Attempt failed; no further attempts scheduled
    Failure,
    /// Attempt failed; a retry is scheduled
    Retrying,
}

/// Append-only record of one notification attempt
///
/// (schedule, stage, attempt) is unique; attempts start at 1 and increment
/// per retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    /// Row id
    pub id: Uuid,
    /// Schedule the attempt belongs to
    pub schedule_id: ScheduleId,
    /// Stage the attempt belongs to
    pub stage: Stage,
    /// Attempt number, starting at 1
    pub attempt: u32,
    /// Attempt outcome
    pub status: LogStatus,
    /// Chat message id, when the post succeeded
    pub external_message_id: Option<String>,
    /// Failure description, when the post failed
    pub error_message: Option<String>,
    /// When the attempt was made
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_schedule() -> CampaignSchedule {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        CampaignSchedule {
            id: ScheduleId::new(),
            campaign_name: "Q4".into(),
            round_number: 1,
            scheduled_date: Utc.with_ymd_and_hms(2025, 10, 2, 9, 15, 0).unwrap(),
            scheduled_time: "09:15".into(),
            list_name: "q4-round-1".into(),
            external_list_id: 42,
            recipient_count: 1177,
            recipient_range: "1-1177".into(),
            subject: "Quarterly update".into(),
            sender_name: "Ops".into(),
            sender_email: "ops@example.com".into(),
            external_draft_id: Some(7),
            external_campaign_id: None,
            notification_status: NotificationStatus::default(),
            status: RoundStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stage_flip_is_monotone() {
        let mut schedule = sample_schedule();
        let now = schedule.created_at;
        assert!(!schedule.is_stage_sent(Stage::Prelaunch));

        schedule
            .mark_stage_sent(Stage::Prelaunch, now, "announced", Some("msg-1".into()))
            .unwrap();
        assert!(schedule.is_stage_sent(Stage::Prelaunch));

        // Second flip on the same stage is rejected.
        let err = schedule.mark_stage_sent(Stage::Prelaunch, now, "announced", None);
        assert!(err.is_err());
        assert_eq!(
            schedule
                .notification_status
                .entry(Stage::Prelaunch)
                .external_message_id
                .as_deref(),
            Some("msg-1")
        );
    }

    #[test]
    fn stage_keys_round_trip() {
        for stage in Stage::all() {
            assert_eq!(Stage::parse_str(stage.as_str()).unwrap(), stage);
        }
        assert!(Stage::parse_str("bogus").is_err());
    }

    #[test]
    fn notification_record_serializes_with_fixed_keys() {
        let status = NotificationStatus::default();
        let value = serde_json::to_value(&status).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 5);
        for key in [
            "prelaunch",
            "preflight",
            "launchWarning",
            "launchConfirmation",
            "wrapup",
        ] {
            assert!(object.contains_key(key), "missing entry {}", key);
        }
    }
}
