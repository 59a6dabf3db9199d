//! Session lifecycle errors.
//!
//! Only lifecycle failures surface to callers of the control surface.
//! Per-batch reasoning failures and per-channel delivery failures are
//! swallowed by the orchestrator and only show up in the logs.

use thiserror::Error;

use crate::channels::ChannelKind;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation on an unknown session
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    /// Event or command arrived after the session was stopped
    #[error("session has ended: {session_id}")]
    Ended { session_id: String },

    /// A session with this id is already active
    #[error("session already exists: {session_id}")]
    Duplicate { session_id: String },

    /// The requested channel has no configuration
    #[error("channel not configured: {0}")]
    ChannelUnavailable(ChannelKind),
}

impl SessionError {
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }

    pub fn ended(session_id: impl Into<String>) -> Self {
        Self::Ended {
            session_id: session_id.into(),
        }
    }

    pub fn duplicate(session_id: impl Into<String>) -> Self {
        Self::Duplicate {
            session_id: session_id.into(),
        }
    }
}
