//! Notification channels.
//!
//! Every surface that can reach the host implements [`NotificationChannel`].
//! Threaded channels group a session's messages under one parent message and
//! hand back a [`ThreadHandle`]; direct and broadcast channels have no thread
//! and treat every call as "send this text now".

pub mod broadcast;
pub mod direct;
pub mod format;
pub mod reference_store;
pub mod threaded;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::error::SessionError;
use crate::transcript::HostIdentity;

pub use broadcast::SmsBroadcastChannel;
pub use direct::DirectMessageChannel;
pub use reference_store::{ConversationReference, ConversationReferenceStore};
pub use threaded::TeamThreadChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[serde(alias = "teams")]
    Direct,
    #[serde(alias = "slack")]
    Threaded,
    #[serde(alias = "sms")]
    Broadcast,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Threaded => "threaded",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque per-channel conversation anchor, e.g. a parent message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle(pub String);

impl ThreadHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delivery acknowledgment. Broadcast channels report partial success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub message_id: Option<String>,
    pub delivered: usize,
    pub failed: usize,
}

impl Ack {
    pub fn single(message_id: Option<String>) -> Self {
        Self {
            message_id,
            delivered: 1,
            failed: 0,
        }
    }
}

/// Data for the session-start message that opens a thread.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadInfo {
    pub session_id: String,
    pub member: HostIdentity,
    pub meeting_title: Option<String>,
    pub platform: String,
    pub bot_type: String,
    pub start_time: DateTime<Utc>,
}

/// One coaching nudge, already addressed to the host.
#[derive(Debug, Clone, Serialize)]
pub struct NudgeReply {
    pub session_id: String,
    pub recipient: HostIdentity,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub batch_number: u32,
    pub messages_analyzed: usize,
}

/// End-of-session wrap-up.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub recipient: HostIdentity,
    pub duration_minutes: i64,
    pub total_nudges: u32,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{channel} rejected the message: {message}")]
    Rejected {
        channel: ChannelKind,
        message: String,
    },

    #[error("{0} channel requires an open thread")]
    MissingThread(ChannelKind),

    #[error("no conversation reference for participant {participant}")]
    NoConversationReference { participant: String },

    #[error("all {failed} recipients failed")]
    AllRecipientsFailed { failed: usize },
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Whether replies must be anchored to a handle from `start_thread`.
    fn requires_thread(&self) -> bool {
        false
    }

    /// Announce the session. Threaded channels return the new anchor.
    async fn start_thread(&self, info: &ThreadInfo) -> Result<Option<ThreadHandle>, ChannelError>;

    async fn post_reply(
        &self,
        handle: Option<&ThreadHandle>,
        reply: &NudgeReply,
    ) -> Result<Ack, ChannelError>;

    async fn end_thread(
        &self,
        handle: Option<&ThreadHandle>,
        summary: &SessionSummary,
    ) -> Result<Ack, ChannelError>;
}

/// Every configured channel, assembled once at startup.
#[derive(Clone, Default)]
pub struct ChannelCatalog {
    channels: BTreeMap<ChannelKind, Arc<dyn NotificationChannel>>,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every channel section present in the config.
    pub fn from_config(config: &Config, references: Arc<ConversationReferenceStore>) -> Result<Self> {
        let mut catalog = Self::new();

        if let Some(direct) = &config.direct {
            catalog = catalog.with_channel(Arc::new(DirectMessageChannel::new(direct, references)?));
        }
        if let Some(threaded) = &config.threaded {
            catalog = catalog.with_channel(Arc::new(TeamThreadChannel::new(threaded)?));
        }
        if let Some(broadcast) = &config.broadcast {
            catalog = catalog.with_channel(Arc::new(SmsBroadcastChannel::new(broadcast)?));
        }

        info!("Configured notification channels: {:?}", catalog.available());
        Ok(catalog)
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn available(&self) -> Vec<ChannelKind> {
        self.channels.keys().copied().collect()
    }

    /// Resolve the requested kinds, failing on the first unconfigured one.
    pub fn select(
        &self,
        kinds: &BTreeSet<ChannelKind>,
    ) -> Result<Vec<Arc<dyn NotificationChannel>>, SessionError> {
        kinds
            .iter()
            .map(|kind| {
                self.channels
                    .get(kind)
                    .cloned()
                    .ok_or(SessionError::ChannelUnavailable(*kind))
            })
            .collect()
    }
}
