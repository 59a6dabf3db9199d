//! Boundary to the decision engine.
//!
//! The orchestrator hands over one batch of transcript text plus the running
//! session context and gets back a tagged [`Decision`]. How the engine keeps
//! its conversation memory is the gateway's business; callers only promise
//! never to run two `analyze` calls for the same session at once.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcript::HostIdentity;

pub use openai::OpenAiReasoningGateway;

/// Structured coaching instruction produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingDirective {
    pub target_participant_id: String,
    pub target_participant_name: String,
    pub message: String,
    pub reason: String,
}

impl CoachingDirective {
    /// Readdress the directive to the session host, whatever the engine named.
    pub fn addressed_to(mut self, host: &HostIdentity) -> Self {
        self.target_participant_id = host.participant_id.clone();
        self.target_participant_name = host.name.clone();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    #[serde(rename = "none")]
    NoAction,
    Directive(CoachingDirective),
}

/// Running context sent alongside each batch.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    pub session_id: String,
    pub meeting_title: Option<String>,
    pub host: Option<HostIdentity>,
    pub nudge_count: u32,
    pub batch_number: u32,
    /// Set for the partial batch flushed at session end.
    pub final_batch: bool,
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("reasoning API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed reasoning response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    async fn analyze(
        &self,
        batch_text: &str,
        context: &AnalysisContext,
    ) -> Result<Decision, ReasoningError>;

    /// Drop any conversation memory kept for the session.
    async fn forget(&self, _session_id: &str) {}
}
