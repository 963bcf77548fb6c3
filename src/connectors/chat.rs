//! HTTP client for the chat poster

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::ChatConfig;
use crate::connectors::http::{build_client, post_json};
use crate::connectors::{ChatPoster, ChatReceipt};
use crate::error::EngineResult;

const SERVICE: &str = "chat";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageBody<'a> {
    channel: &'a str,
    blocks: &'a serde_json::Value,
    text: &'a str,
}

/// Chat-service API client
pub struct ChatClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ChatClient {
    /// Build a client against the configured endpoint
    pub fn new(config: &ChatConfig) -> EngineResult<Self> {
        Ok(Self {
            client: build_client(SERVICE)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl ChatPoster for ChatClient {
    async fn post_message(
        &self,
        channel: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> EngineResult<ChatReceipt> {
        let body = PostMessageBody {
            channel,
            blocks,
            text: fallback_text,
        };
        post_json(
            &self.client,
            SERVICE,
            &format!("{}/api/chat.postMessage", self.base_url),
            &self.token,
            &body,
        )
        .await
    }
}
