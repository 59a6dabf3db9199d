//! Session phase and mutable per-session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::channels::{ChannelKind, ThreadHandle};
use crate::transcript::{HostIdentity, TranscriptBatcher, TranscriptEvent};

/// Lifecycle of a coached session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Registered, host not yet known
    Idle,
    /// Host resolved; directives are delivered
    Active,
    /// Terminal
    Ended,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

/// Read-only view handed to API handlers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub meeting_url: Option<String>,
    pub meeting_title: Option<String>,
    pub host: Option<HostIdentity>,
    pub nudge_count: u32,
    pub batches_analyzed: u32,
    pub buffered_events: usize,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub enabled_channels: Vec<ChannelKind>,
    pub open_threads: Vec<ChannelKind>,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: SessionPhase,
    pub host: Option<HostIdentity>,
    pub nudge_count: u32,
    pub batches_analyzed: u32,
    pub started_at: DateTime<Utc>,
    pub threads: HashMap<ChannelKind, ThreadHandle>,
    /// Channels that have had `start_thread` invoked
    pub opened: BTreeSet<ChannelKind>,
    /// Set once end-of-session summaries have gone out
    pub closed: bool,
    pub batcher: TranscriptBatcher,
    history: VecDeque<TranscriptEvent>,
    history_limit: usize,
}

impl SessionState {
    pub fn new(batch_size: usize, history_limit: usize) -> Self {
        Self {
            phase: SessionPhase::Idle,
            host: None,
            nudge_count: 0,
            batches_analyzed: 0,
            started_at: Utc::now(),
            threads: HashMap::new(),
            opened: BTreeSet::new(),
            closed: false,
            batcher: TranscriptBatcher::new(batch_size),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn record(&mut self, event: TranscriptEvent) {
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    /// Last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TranscriptEvent> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn duration_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    pub fn duration_minutes(&self) -> i64 {
        (Utc::now() - self.started_at).num_minutes().max(0)
    }
}
