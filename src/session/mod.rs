//! Coaching session lifecycle.
//!
//! A session is created when the meeting bot joins, turns `Active` once the
//! host is known, batches transcript events into reasoning calls, fans
//! resulting nudges out to its channels and closes every thread on stop.

pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod state;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::channels::{Ack, ChannelKind};
use crate::config::CoachingConfig;
use crate::reasoning::CoachingDirective;

pub use orchestrator::SessionOrchestrator;
pub use registry::SessionRegistry;
pub use service::SessionService;
pub use state::{SessionPhase, SessionSnapshot};

/// Per-session settings, fixed at creation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub meeting_url: Option<String>,
    pub meeting_title: Option<String>,
    pub platform: String,
    pub bot_type: String,
    pub enabled_channels: BTreeSet<ChannelKind>,
    pub batch_size: usize,
    pub history_limit: usize,
    pub max_pending_batches: usize,
    pub stop_timeout: Duration,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>, defaults: &CoachingConfig) -> Self {
        Self {
            session_id: session_id.into(),
            meeting_url: None,
            meeting_title: None,
            platform: defaults.platform.clone(),
            bot_type: defaults.bot_type.clone(),
            enabled_channels: defaults.default_channels.iter().flatten().copied().collect(),
            batch_size: defaults.batch_size,
            history_limit: defaults.history_limit,
            max_pending_batches: defaults.max_pending_batches,
            stop_timeout: Duration::from_secs(defaults.stop_timeout_seconds),
        }
    }

    pub fn with_channels(mut self, channels: impl IntoIterator<Item = ChannelKind>) -> Self {
        self.enabled_channels = channels.into_iter().collect();
        self
    }

    pub fn with_meeting(mut self, url: Option<String>, title: Option<String>) -> Self {
        self.meeting_url = url;
        self.meeting_title = title;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_max_pending_batches(mut self, limit: usize) -> Self {
        self.max_pending_batches = limit;
        self
    }
}

/// Start request from the control plane. Unset fields fall back to config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
    #[serde(default)]
    pub meeting_url: Option<String>,
    #[serde(default)]
    pub meeting_title: Option<String>,
    #[serde(default)]
    pub channels: Option<Vec<ChannelKind>>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub bot_type: Option<String>,
}

impl SessionRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn into_config(self, defaults: &CoachingConfig) -> SessionConfig {
        let mut config = SessionConfig::new(self.session_id, defaults)
            .with_meeting(self.meeting_url, self.meeting_title);
        if let Some(channels) = self.channels {
            config = config.with_channels(channels);
        }
        if let Some(platform) = self.platform {
            config.platform = platform;
        }
        if let Some(bot_type) = self.bot_type {
            config.bot_type = bot_type;
        }
        config
    }
}

/// Result of one channel call.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub channel: ChannelKind,
    pub ack: Option<Ack>,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.ack.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    NoAction,
    /// The analyze call failed; the batch is not retried
    ReasoningFailed { error: String },
    /// Directive on a batch cut before the host was known, or produced after
    /// the session's threads were closed
    DirectiveDiscarded,
    Delivered {
        nudge_number: u32,
        directive: CoachingDirective,
        deliveries: Vec<DeliveryReport>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_number: u32,
    pub messages_analyzed: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Buffered { buffered: usize },
    Analyzed(BatchReport),
    /// The analysis worker went away before reporting (stop timeout)
    Abandoned,
}

/// What became of the partial batch at stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalFlush {
    /// Nothing was buffered
    Skipped,
    /// Analyzed before the threads were closed
    Completed,
    /// Stop timed out; analyzed after the in-flight batch, directive discarded
    Deferred,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    pub session_id: String,
    pub duration_minutes: i64,
    pub total_nudges: u32,
    pub batches_analyzed: u32,
    pub final_flush: FinalFlush,
    pub closed: Vec<DeliveryReport>,
}
