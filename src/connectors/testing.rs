//! Deterministic collaborator fakes for the test suites
//!
//! Production code never constructs these; they exist so unit and integration
//! tests can drive the engine without network collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::connectors::{
    ChatPoster, ChatReceipt, DeliveryCounters, Draft, DraftChecks, DraftReadiness, LanguageModel,
    ListStatistics, MailPlatform, ReputationTrend, SendReceipt, SenderReputation,
};
use crate::error::{EngineError, EngineResult};

/// Scripted failure kind for fakes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Network/5xx-style failure, retryable
    Transient,
    /// 4xx/contract-style failure, fatal
    Permanent,
}

impl ScriptedFailure {
    fn into_error(self, service: &str) -> EngineError {
        match self {
            ScriptedFailure::Transient => {
                EngineError::transient(format!("{}: scripted transient failure", service))
            }
            ScriptedFailure::Permanent => {
                EngineError::permanent(format!("{}: scripted permanent failure", service))
            }
        }
    }
}

/// Mail-platform fake with healthy defaults and failure injection
pub struct FakeMailPlatform {
    state: Mutex<MailState>,
}

struct MailState {
    readiness: DraftReadiness,
    list_stats: ListStatistics,
    reputation: SenderReputation,
    counters: DeliveryCounters,
    send_failures: VecDeque<ScriptedFailure>,
    sent_campaigns: Vec<u64>,
    stats_calls: u64,
    send_time: DateTime<Utc>,
}

impl Default for FakeMailPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMailPlatform {
    /// A platform where every check passes and sends succeed
    pub fn new() -> Self {
        let checks = DraftChecks {
            has_subject: true,
            has_sender: true,
            has_list: true,
            has_content: true,
            list_non_empty: true,
            no_blocked_recipients: true,
        };
        Self {
            state: Mutex::new(MailState {
                readiness: DraftReadiness {
                    is_ready: true,
                    checks,
                    issues: Vec::new(),
                },
                list_stats: ListStatistics {
                    total: 1200,
                    subscribed: 1150,
                    unsubscribed: 40,
                    blocked: 10,
                    recent_bounces: 3,
                },
                reputation: SenderReputation {
                    score: 92.0,
                    trend: ReputationTrend::Stable,
                },
                counters: DeliveryCounters {
                    processed: 1000,
                    delivered: 975,
                    bounced: 20,
                    hard_bounces: 5,
                    soft_bounces: 15,
                    blocked: 5,
                    queued: 0,
                    opened: 410,
                    clicked: 130,
                    unsubscribed: 4,
                    complained: 1,
                    send_start_at: None,
                    send_end_at: None,
                },
                send_failures: VecDeque::new(),
                sent_campaigns: Vec::new(),
                stats_calls: 0,
                send_time: Utc::now(),
            }),
        }
    }

    /// Override the readiness verdict
    pub fn set_readiness(&self, readiness: DraftReadiness) {
        self.state.lock().readiness = readiness;
    }

    /// Override the post-send counters
    pub fn set_counters(&self, counters: DeliveryCounters) {
        self.state.lock().counters = counters;
    }

    /// Override the list statistics
    pub fn set_list_statistics(&self, stats: ListStatistics) {
        self.state.lock().list_stats = stats;
    }

    /// Override the sender reputation
    pub fn set_reputation(&self, reputation: SenderReputation) {
        self.state.lock().reputation = reputation;
    }

    /// Script the next send attempts to fail
    pub fn fail_sends(&self, failures: impl IntoIterator<Item = ScriptedFailure>) {
        self.state.lock().send_failures.extend(failures);
    }

    /// Pin the send timestamp returned by successful sends
    pub fn set_send_time(&self, at: DateTime<Utc>) {
        self.state.lock().send_time = at;
    }

    /// Campaign ids whose send was accepted
    pub fn sent_campaigns(&self) -> Vec<u64> {
        self.state.lock().sent_campaigns.clone()
    }

    /// Number of statistics fetches served
    pub fn stats_calls(&self) -> u64 {
        self.state.lock().stats_calls
    }
}

#[async_trait]
impl MailPlatform for FakeMailPlatform {
    async fn get_draft(&self, draft_id: u64) -> EngineResult<Draft> {
        Ok(Draft {
            id: draft_id,
            subject: "Quarterly update".into(),
            sender_name: "Ops".into(),
            sender_email: "ops@example.com".into(),
            list_ids: vec![1],
            has_content: true,
        })
    }

    async fn verify_readiness(&self, _draft_id: u64) -> EngineResult<DraftReadiness> {
        Ok(self.state.lock().readiness.clone())
    }

    async fn get_detailed_statistics(&self, _campaign_id: u64) -> EngineResult<DeliveryCounters> {
        let mut state = self.state.lock();
        state.stats_calls += 1;
        Ok(state.counters)
    }

    async fn send_campaign_now(&self, campaign_id: u64) -> EngineResult<SendReceipt> {
        let mut state = self.state.lock();
        if let Some(failure) = state.send_failures.pop_front() {
            return Err(failure.into_error("mail-platform"));
        }
        state.sent_campaigns.push(campaign_id);
        Ok(SendReceipt {
            message_id: format!("send-{}", campaign_id),
            queued_count: state.counters.processed,
            send_start_at: state.send_time,
        })
    }

    async fn get_list_statistics(&self, _list_id: u64) -> EngineResult<ListStatistics> {
        Ok(self.state.lock().list_stats)
    }

    async fn get_sender_reputation(&self, _email: &str) -> EngineResult<SenderReputation> {
        Ok(self.state.lock().reputation)
    }
}

/// Recorded chat post
#[derive(Debug, Clone)]
pub struct RecordedPost {
    /// Channel posted to
    pub channel: String,
    /// Message blocks
    pub blocks: serde_json::Value,
    /// Fallback text
    pub fallback_text: String,
}

/// Chat-poster fake that records posts and supports scripted failures
#[derive(Default)]
pub struct FakeChatPoster {
    posts: Mutex<Vec<RecordedPost>>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    attempts: Mutex<u64>,
}

impl FakeChatPoster {
    /// A poster that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next post attempts to fail
    pub fn fail_posts(&self, failures: impl IntoIterator<Item = ScriptedFailure>) {
        self.failures.lock().extend(failures);
    }

    /// All successfully recorded posts
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().clone()
    }

    /// Total attempts, including failed ones
    pub fn attempts(&self) -> u64 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl ChatPoster for FakeChatPoster {
    async fn post_message(
        &self,
        channel: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> EngineResult<ChatReceipt> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts
        };
        if let Some(failure) = self.failures.lock().pop_front() {
            return Err(failure.into_error("chat"));
        }
        self.posts.lock().push(RecordedPost {
            channel: channel.to_string(),
            blocks: blocks.clone(),
            fallback_text: fallback_text.to_string(),
        });
        Ok(ChatReceipt {
            message_id: format!("msg-{}", attempt),
            ts: format!("{}.000100", attempt),
        })
    }
}

type ModelHandler = dyn Fn(&str) -> EngineResult<String> + Send + Sync;

/// Language-model fake driven by a prompt handler
pub struct FakeLanguageModel {
    handler: Arc<ModelHandler>,
}

impl FakeLanguageModel {
    /// Answer every prompt through `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) -> EngineResult<String> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Answer every prompt with the same text
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_handler(move |_| Ok(text.clone()))
    }

    /// Fail every prompt with a transient error
    pub fn failing() -> Self {
        Self::with_handler(|_| Err(EngineError::transient("language-model: scripted outage")))
    }
}

#[async_trait]
impl LanguageModel for FakeLanguageModel {
    async fn generate(&self, prompt: &str) -> EngineResult<String> {
        (self.handler)(prompt)
    }
}
