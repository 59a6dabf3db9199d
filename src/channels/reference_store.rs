//! Conversation references for the direct channel.
//!
//! A reference is the minimum needed to address a message into an existing
//! 1:1 conversation with a participant. References are captured when a
//! participant first talks to the bot, or created by the channel itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::transcript::HostIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationReference {
    pub participant_id: String,
    pub participant_name: String,
    pub conversation_id: String,
    /// Overrides the channel's configured service URL for this conversation
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Injected store keyed by participant id.
#[derive(Debug, Default)]
pub struct ConversationReferenceStore {
    entries: RwLock<HashMap<String, ConversationReference>>,
}

impl ConversationReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, mut reference: ConversationReference) {
        reference.updated_at = Utc::now();
        self.entries
            .write()
            .await
            .insert(reference.participant_id.clone(), reference);
    }

    pub async fn get(&self, participant_id: &str) -> Option<ConversationReference> {
        self.entries.read().await.get(participant_id).cloned()
    }

    /// Look the host up by id, then by display name.
    pub async fn resolve(&self, host: &HostIdentity) -> Option<ConversationReference> {
        let entries = self.entries.read().await;
        if let Some(reference) = entries.get(&host.participant_id) {
            return Some(reference.clone());
        }

        let name = host.name.trim().to_lowercase();
        entries
            .values()
            .filter(|r| r.participant_name.trim().to_lowercase() == name)
            .max_by_key(|r| r.updated_at)
            .cloned()
    }

    pub async fn remove(&self, participant_id: &str) -> Option<ConversationReference> {
        self.entries.write().await.remove(participant_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
