use crate::channels::ChannelKind;
use crate::global;
use crate::transcript::batcher::DEFAULT_BATCH_SIZE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variables that hand opaque credentials to the service.
pub mod env_keys {
    pub const REASONING_API_KEY: &str = "COACHLINE_REASONING_API_KEY";
    pub const DIRECT_TOKEN: &str = "COACHLINE_DIRECT_TOKEN";
    pub const THREADED_TOKEN: &str = "COACHLINE_THREADED_TOKEN";
    pub const BROADCAST_AUTH_TOKEN: &str = "COACHLINE_BROADCAST_AUTH_TOKEN";
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub coaching: CoachingConfig,
    pub reasoning: ReasoningConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct: Option<DirectChannelConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threaded: Option<ThreadedChannelConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<BroadcastChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    /// Transcript events per reasoning call
    pub batch_size: usize,
    /// Events kept per session for history lookups
    pub history_limit: usize,
    /// How long a stop waits for in-flight analysis before closing threads
    pub stop_timeout_seconds: u64,
    /// Batches a session may queue before further ingests wait
    pub max_pending_batches: usize,
    /// Channels enabled when a session start does not name any. Unset means
    /// every configured channel; listed channels that are not configured are
    /// skipped.
    pub default_channels: Option<Vec<ChannelKind>>,
    pub platform: String,
    pub bot_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
    /// Upper bound on remembered messages per session
    pub memory_messages: usize,
    pub system_prompt: Option<String>,
}

/// In-meeting direct chat (bot framework style conversations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectChannelConfig {
    pub service_url: String,
    pub bot_token: String,
    /// Needed to open a new 1:1 conversation when no reference is stored
    pub bot_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// Team-chat channel where each session gets its own thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadedChannelConfig {
    #[serde(default = "default_threaded_api_base")]
    pub api_base: String,
    pub token: String,
    pub channel_id: String,
}

/// SMS fan-out to a fixed list of numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastChannelConfig {
    #[serde(default = "default_broadcast_api_base")]
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    #[serde(default)]
    pub to_numbers: Vec<String>,
}

fn default_threaded_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_broadcast_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3838,
        }
    }
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            history_limit: 200,
            stop_timeout_seconds: 30,
            max_pending_batches: 16,
            default_channels: None,
            platform: "zoom".to_string(),
            bot_type: "sales".to_string(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 30,
            memory_messages: 40,
            system_prompt: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config.with_env_overrides());
        }

        let config = Self::load_from(&config_path)?;
        info!("Loaded config from {:?}", config_path);
        Ok(config.with_env_overrides())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&global::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Credentials from the environment win over the file.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(env_keys::REASONING_API_KEY) {
            self.reasoning.api_key = Some(key);
        }
        if let (Some(direct), Some(token)) = (self.direct.as_mut(), lookup(env_keys::DIRECT_TOKEN)) {
            direct.bot_token = token;
        }
        if let (Some(threaded), Some(token)) =
            (self.threaded.as_mut(), lookup(env_keys::THREADED_TOKEN))
        {
            threaded.token = token;
        }
        if let (Some(broadcast), Some(token)) = (
            self.broadcast.as_mut(),
            lookup(env_keys::BROADCAST_AUTH_TOKEN),
        ) {
            broadcast.auth_token = token;
        }
        self
    }
}
