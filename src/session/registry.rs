//! Table of active sessions keyed by session (bot) id.
//!
//! Creation is insert-if-absent under the write lock, so two creations for
//! the same id can never both succeed. Removed ids are remembered for a while
//! so late events can be told apart from events for unknown sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::SessionOrchestrator;
use crate::error::{SessionError, SessionResult};

const RETIRED_LIMIT: usize = 1024;

#[derive(Default)]
struct Entries {
    active: HashMap<String, Arc<SessionOrchestrator>>,
    retired: VecDeque<String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    entries: RwLock<Entries>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session built by `build`, which only runs if the id is free.
    pub async fn create<F>(&self, session_id: &str, build: F) -> SessionResult<Arc<SessionOrchestrator>>
    where
        F: FnOnce() -> SessionOrchestrator,
    {
        let mut entries = self.entries.write().await;
        if entries.active.contains_key(session_id) {
            return Err(SessionError::duplicate(session_id));
        }

        let session = Arc::new(build());
        entries.retired.retain(|id| id != session_id);
        entries
            .active
            .insert(session_id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> SessionResult<Arc<SessionOrchestrator>> {
        let entries = self.entries.read().await;
        if let Some(session) = entries.active.get(session_id) {
            return Ok(Arc::clone(session));
        }
        if entries.retired.iter().any(|id| id == session_id) {
            return Err(SessionError::ended(session_id));
        }
        Err(SessionError::not_found(session_id))
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionOrchestrator>> {
        let mut entries = self.entries.write().await;
        let removed = entries.active.remove(session_id)?;
        if entries.retired.len() == RETIRED_LIMIT {
            entries.retired.pop_front();
        }
        entries.retired.push_back(session_id.to_string());
        Some(removed)
    }

    pub async fn list(&self) -> Vec<Arc<SessionOrchestrator>> {
        self.entries.read().await.active.values().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().await.active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.active.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
