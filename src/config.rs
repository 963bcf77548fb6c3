//! Engine configuration
//!
//! Loaded once at process start and immutable thereafter. Sources, in
//! precedence order: defaults, TOML file, `CAMPAIGN_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::scheduling::StageOffsets;

/// Mail-platform endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// Base URL of the mail platform API
    pub base_url: String,
    /// API key
    pub api_key: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".into(),
            api_key: String::new(),
        }
    }
}

/// Chat-poster endpoint, credentials, and target channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the chat service API
    pub base_url: String,
    /// Bot token
    pub token: String,
    /// Channel all stage notifications post to
    pub channel: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".into(),
            token: String::new(),
            channel: "#campaigns".into(),
        }
    }
}

/// Language-model endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the generation endpoint
    pub base_url: String,
    /// API key
    pub api_key: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8083".into(),
            api_key: String::new(),
        }
    }
}

/// Durable storage location (schedules, metrics, logs, and the job queue
/// share one sled tree)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Filesystem path of the sled database
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./campaign_db".into(),
        }
    }
}

/// Process-wide engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mail platform
    pub mailer: MailerConfig,
    /// Chat poster
    pub chat: ChatConfig,
    /// Language model
    pub model: ModelConfig,
    /// Storage
    pub storage: StorageConfig,
    /// Stage trigger offsets; overridable for testing only
    pub offsets: StageOffsets,
}

impl EngineConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| EngineError::Config {
            reason: format!("Failed to read {}: {}", path.as_ref().display(), e),
        })?;
        let mut config = Self::load_from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string
    pub fn load_from_str(content: &str) -> EngineResult<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config {
            reason: format!("Invalid configuration: {}", e),
        })
    }

    /// Defaults plus environment overrides (no file)
    pub fn load_from_env() -> EngineResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAMPAIGN_MAILER_URL") {
            self.mailer.base_url = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_MAILER_KEY") {
            self.mailer.api_key = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_CHAT_URL") {
            self.chat.base_url = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_CHAT_TOKEN") {
            self.chat.token = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_CHAT_CHANNEL") {
            self.chat.channel = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_MODEL_URL") {
            self.model.base_url = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_MODEL_KEY") {
            self.model.api_key = val;
        }
        if let Ok(val) = std::env::var("CAMPAIGN_DB_PATH") {
            self.storage.path = val;
        }
    }

    /// Validate the assembled configuration
    pub fn validate(&self) -> EngineResult<()> {
        for (name, url) in [
            ("mailer.base_url", &self.mailer.base_url),
            ("chat.base_url", &self.chat.base_url),
            ("model.base_url", &self.model.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EngineError::Config {
                    reason: format!("{} must be an http(s) URL, got '{}'", name, url),
                });
            }
        }
        if self.chat.channel.is_empty() {
            return Err(EngineError::Config {
                reason: "chat.channel must not be empty".into(),
            });
        }
        if self.storage.path.is_empty() {
            return Err(EngineError::Config {
                reason: "storage.path must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig::load_from_str(
            r##"
            [mailer]
            base_url = "https://mail.example.com"
            api_key = "k"

            [chat]
            base_url = "https://chat.example.com"
            token = "t"
            channel = "#launches"

            [offsets]
            wrapup_minutes = 45
            "##,
        )
        .unwrap();

        assert_eq!(config.mailer.base_url, "https://mail.example.com");
        assert_eq!(config.chat.channel, "#launches");
        assert_eq!(config.offsets.wrapup_minutes, 45);
        // Unset sections keep defaults.
        assert_eq!(config.offsets.launch_warning_minutes, -15);
        assert_eq!(config.storage.path, "./campaign_db");
    }

    #[test]
    fn bad_url_rejected() {
        let mut config = EngineConfig::default();
        config.mailer.base_url = "not-a-url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        std::env::set_var("CAMPAIGN_CHAT_CHANNEL", "#ops");
        let config = EngineConfig::load_from_env().unwrap();
        std::env::remove_var("CAMPAIGN_CHAT_CHANNEL");
        assert_eq!(config.chat.channel, "#ops");
    }
}
