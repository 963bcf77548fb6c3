//! HTTP client for the mail platform

use async_trait::async_trait;
use reqwest::Client;

use crate::config::MailerConfig;
use crate::connectors::http::{build_client, get_json, post_json};
use crate::connectors::{
    DeliveryCounters, Draft, DraftReadiness, ListStatistics, MailPlatform, SendReceipt,
    SenderReputation,
};
use crate::error::EngineResult;

const SERVICE: &str = "mail-platform";

/// Mail-platform API client
pub struct MailPlatformClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MailPlatformClient {
    /// Build a client against the configured endpoint
    pub fn new(config: &MailerConfig) -> EngineResult<Self> {
        Ok(Self {
            client: build_client(SERVICE)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl MailPlatform for MailPlatformClient {
    async fn get_draft(&self, draft_id: u64) -> EngineResult<Draft> {
        get_json(
            &self.client,
            SERVICE,
            &self.url(&format!("/v3/emailCampaigns/{}", draft_id)),
            &self.api_key,
        )
        .await
    }

    async fn verify_readiness(&self, draft_id: u64) -> EngineResult<DraftReadiness> {
        get_json(
            &self.client,
            SERVICE,
            &self.url(&format!("/v3/emailCampaigns/{}/readiness", draft_id)),
            &self.api_key,
        )
        .await
    }

    async fn get_detailed_statistics(&self, campaign_id: u64) -> EngineResult<DeliveryCounters> {
        get_json(
            &self.client,
            SERVICE,
            &self.url(&format!("/v3/emailCampaigns/{}/statistics", campaign_id)),
            &self.api_key,
        )
        .await
    }

    async fn send_campaign_now(&self, campaign_id: u64) -> EngineResult<SendReceipt> {
        post_json(
            &self.client,
            SERVICE,
            &self.url(&format!("/v3/emailCampaigns/{}/sendNow", campaign_id)),
            &self.api_key,
            &serde_json::json!({}),
        )
        .await
    }

    async fn get_list_statistics(&self, list_id: u64) -> EngineResult<ListStatistics> {
        get_json(
            &self.client,
            SERVICE,
            &self.url(&format!("/v3/contacts/lists/{}/statistics", list_id)),
            &self.api_key,
        )
        .await
    }

    async fn get_sender_reputation(&self, email: &str) -> EngineResult<SenderReputation> {
        get_json(
            &self.client,
            SERVICE,
            &self.url(&format!("/v3/senders/reputation?email={}", email)),
            &self.api_key,
        )
        .await
    }
}
