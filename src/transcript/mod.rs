//! Transcript events and batching.
//!
//! Events arrive from the meeting-bot control plane in speaking order and
//! are grouped into fixed-size batches before they reach the reasoning engine.

pub mod batcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use batcher::{Batch, TranscriptBatcher};

/// One utterance observed in the meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub speaker_name: String,
    pub speaker_id: String,
    #[serde(default)]
    pub is_host: bool,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn new(
        speaker_id: impl Into<String>,
        speaker_name: impl Into<String>,
        is_host: bool,
        text: impl Into<String>,
    ) -> Self {
        Self {
            speaker_name: speaker_name.into(),
            speaker_id: speaker_id.into(),
            is_host,
            text: text.into(),
            observed_at: Utc::now(),
        }
    }

    /// Line used when the event is rendered into a batch prompt.
    pub fn as_line(&self) -> String {
        format!("{}: {}", self.speaker_name, self.text.trim())
    }
}

/// Participant join signal from the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantJoin {
    pub participant_id: String,
    pub participant_name: String,
    #[serde(default)]
    pub is_host: bool,
}

/// The participant who receives every coaching message in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub participant_id: String,
    pub name: String,
}

impl HostIdentity {
    pub fn new(participant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            name: name.into(),
        }
    }
}

impl From<&TranscriptEvent> for HostIdentity {
    fn from(event: &TranscriptEvent) -> Self {
        Self::new(event.speaker_id.clone(), event.speaker_name.clone())
    }
}

impl From<&ParticipantJoin> for HostIdentity {
    fn from(join: &ParticipantJoin) -> Self {
        Self::new(join.participant_id.clone(), join.participant_name.clone())
    }
}
