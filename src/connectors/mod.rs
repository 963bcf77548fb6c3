//! External collaborator interfaces
//!
//! The engine never talks to an ambient singleton: the mail platform, the
//! chat poster, and the language-model endpoint are constructor-injected
//! trait objects so tests can substitute deterministic fakes.
//!
//! Failure taxonomy: implementations return
//! [`EngineError::Transient`](crate::error::EngineError) for network errors,
//! 5xx and timeouts (retried by the job scheduler) and
//! [`EngineError::Permanent`](crate::error::EngineError) for 4xx and contract
//! violations (surfaced without retry).

pub mod chat;
pub mod http;
pub mod mailer;
pub mod model;
pub mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Mail-platform draft, as returned by `get_draft`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    /// Platform id of the draft
    pub id: u64,
    /// Subject line (may be empty on an unfinished draft)
    pub subject: String,
    /// Sender display name
    pub sender_name: String,
    /// Sender address
    pub sender_email: String,
    /// Lists the draft is attached to
    pub list_ids: Vec<u64>,
    /// Whether the draft body is non-empty
    pub has_content: bool,
}

/// Fixed-shape draft readiness checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftChecks {
    /// Subject line present
    pub has_subject: bool,
    /// Sender name and address present
    pub has_sender: bool,
    /// At least one list attached
    pub has_list: bool,
    /// Body content non-empty
    pub has_content: bool,
    /// Attached list has at least one subscriber
    pub list_non_empty: bool,
    /// No blocked entries on the attached list
    pub no_blocked_recipients: bool,
}

impl DraftChecks {
    /// Whether every required check passed
    pub fn all_passed(&self) -> bool {
        self.has_subject
            && self.has_sender
            && self.has_list
            && self.has_content
            && self.list_non_empty
            && self.no_blocked_recipients
    }

    /// Names of the checks that failed
    pub fn failed(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.has_subject {
            failed.push("hasSubject");
        }
        if !self.has_sender {
            failed.push("hasSender");
        }
        if !self.has_list {
            failed.push("hasList");
        }
        if !self.has_content {
            failed.push("hasContent");
        }
        if !self.list_non_empty {
            failed.push("listNonEmpty");
        }
        if !self.no_blocked_recipients {
            failed.push("noBlockedRecipients");
        }
        failed
    }
}

/// Result of the platform-side readiness verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftReadiness {
    /// Platform's own overall verdict
    pub is_ready: bool,
    /// Individual checks
    pub checks: DraftChecks,
    /// Human-readable issues reported by the platform
    pub issues: Vec<String>,
}

/// Snapshot of list counters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStatistics {
    /// Total contacts on the list
    pub total: u64,
    /// Currently subscribed contacts
    pub subscribed: u64,
    /// Unsubscribed contacts
    pub unsubscribed: u64,
    /// Blocked contacts
    pub blocked: u64,
    /// Bounces recorded in the recent window
    pub recent_bounces: u64,
}

/// Sender reputation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationTrend {
    /// Reputation improving
    Improving,
    /// Reputation steady
    Stable,
    /// Reputation declining
    Declining,
}

/// Sender reputation snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderReputation {
    /// Reputation score, 0-100
    pub score: f64,
    /// Direction of recent movement
    pub trend: ReputationTrend,
}

/// Raw post-send counters from the mail platform
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCounters {
    /// Messages handed to the platform
    pub processed: u64,
    /// Messages delivered
    pub delivered: u64,
    /// Total bounces
    pub bounced: u64,
    /// Hard bounces
    pub hard_bounces: u64,
    /// Soft bounces
    pub soft_bounces: u64,
    /// Blocked recipients
    pub blocked: u64,
    /// Still queued on the platform
    pub queued: u64,
    /// Unique opens
    pub opened: u64,
    /// Unique clicks
    pub clicked: u64,
    /// Unsubscribes
    pub unsubscribed: u64,
    /// Spam complaints
    pub complained: u64,
    /// When the send started
    pub send_start_at: Option<DateTime<Utc>>,
    /// When the send finished
    pub send_end_at: Option<DateTime<Utc>>,
}

/// Receipt returned when a send is initiated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// Platform message id
    pub message_id: String,
    /// Recipients queued for sending
    pub queued_count: u64,
    /// Instant the platform started the send
    pub send_start_at: DateTime<Utc>,
}

/// Receipt returned by the chat poster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReceipt {
    /// Message id assigned by the chat service
    pub message_id: String,
    /// Service timestamp of the post
    pub ts: String,
}

/// Mail platform operations consumed by the engine
#[async_trait]
pub trait MailPlatform: Send + Sync {
    /// Fetch a draft by id
    async fn get_draft(&self, draft_id: u64) -> EngineResult<Draft>;

    /// Platform-side readiness verification for a draft
    async fn verify_readiness(&self, draft_id: u64) -> EngineResult<DraftReadiness>;

    /// Post-send statistics for a campaign
    async fn get_detailed_statistics(&self, campaign_id: u64) -> EngineResult<DeliveryCounters>;

    /// Initiate the send of a campaign immediately
    async fn send_campaign_now(&self, campaign_id: u64) -> EngineResult<SendReceipt>;

    /// Counters for a recipient list
    async fn get_list_statistics(&self, list_id: u64) -> EngineResult<ListStatistics>;

    /// Reputation snapshot for a sender address
    async fn get_sender_reputation(&self, email: &str) -> EngineResult<SenderReputation>;
}

/// Chat channel poster
#[async_trait]
pub trait ChatPoster: Send + Sync {
    /// Post formatted blocks to a channel; returns the service receipt
    async fn post_message(
        &self,
        channel: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> EngineResult<ChatReceipt>;
}

/// Language-model endpoint
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a prompt; the response text is JSON,
    /// possibly wrapped in fenced markdown
    async fn generate(&self, prompt: &str) -> EngineResult<String>;
}
