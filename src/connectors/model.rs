//! HTTP client for the language-model endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::ModelConfig;
use crate::connectors::http::{build_client, post_json};
use crate::connectors::LanguageModel;
use crate::error::EngineResult;

const SERVICE: &str = "language-model";

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Generation-endpoint client
pub struct ModelClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ModelClient {
    /// Build a client against the configured endpoint
    pub fn new(config: &ModelConfig) -> EngineResult<Self> {
        Ok(Self {
            client: build_client(SERVICE)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for ModelClient {
    async fn generate(&self, prompt: &str) -> EngineResult<String> {
        let response: GenerateResponse = post_json(
            &self.client,
            SERVICE,
            &format!("{}/v1/generate", self.base_url),
            &self.api_key,
            &serde_json::json!({ "prompt": prompt }),
        )
        .await?;
        Ok(response.text)
    }
}
