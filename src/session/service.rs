//! Session control surface consumed by the HTTP layer.
//!
//! Owns the registry and everything needed to build an orchestrator; all
//! state is injected, so several services can coexist in one process.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    IngestOutcome, SessionOrchestrator, SessionRegistry, SessionRequest, SessionSnapshot,
    StopReport,
};
use crate::channels::{ChannelCatalog, ChannelKind, ConversationReferenceStore};
use crate::config::CoachingConfig;
use crate::error::{SessionError, SessionResult};
use crate::reasoning::ReasoningGateway;
use crate::transcript::{ParticipantJoin, TranscriptEvent};

pub struct SessionService {
    registry: SessionRegistry,
    gateway: Arc<dyn ReasoningGateway>,
    catalog: ChannelCatalog,
    references: Arc<ConversationReferenceStore>,
    defaults: CoachingConfig,
}

impl SessionService {
    pub fn new(
        gateway: Arc<dyn ReasoningGateway>,
        catalog: ChannelCatalog,
        references: Arc<ConversationReferenceStore>,
        defaults: CoachingConfig,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            gateway,
            catalog,
            references,
            defaults,
        }
    }

    pub fn references(&self) -> &Arc<ConversationReferenceStore> {
        &self.references
    }

    /// Explicitly requested channels must all be configured; defaults are
    /// narrowed to what is configured.
    pub async fn start_session(&self, request: SessionRequest) -> SessionResult<SessionSnapshot> {
        let explicit = request.channels.is_some();
        let mut config = request.into_config(&self.defaults);
        if !explicit {
            config.enabled_channels = self.default_channels();
        }
        let channels = self.catalog.select(&config.enabled_channels)?;
        let session_id = config.session_id.clone();
        let gateway = Arc::clone(&self.gateway);

        let session = self
            .registry
            .create(&session_id, move || {
                SessionOrchestrator::new(config, gateway, channels)
            })
            .await?;

        info!("Coaching session {} started", session_id);
        Ok(session.snapshot().await)
    }

    pub async fn ingest_event(
        &self,
        session_id: &str,
        event: TranscriptEvent,
    ) -> SessionResult<IngestOutcome> {
        let session = self.lookup(session_id).await?;
        session.ingest(event).await
    }

    pub async fn participant_joined(
        &self,
        session_id: &str,
        join: ParticipantJoin,
    ) -> SessionResult<bool> {
        let session = self.lookup(session_id).await?;
        session.participant_joined(&join).await
    }

    pub async fn stop_session(&self, session_id: &str) -> SessionResult<StopReport> {
        let session = self.registry.get(session_id).await?;
        let report = session.stop().await?;
        self.registry.remove(session_id).await;
        Ok(report)
    }

    pub async fn recent_history(
        &self,
        session_id: &str,
        n: usize,
    ) -> SessionResult<Vec<TranscriptEvent>> {
        let session = self.registry.get(session_id).await?;
        Ok(session.recent_history(n).await)
    }

    pub async fn snapshot(&self, session_id: &str) -> SessionResult<SessionSnapshot> {
        let session = self.registry.get(session_id).await?;
        Ok(session.snapshot().await)
    }

    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let mut snapshots = Vec::new();
        for session in self.registry.list().await {
            snapshots.push(session.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        snapshots
    }

    /// Stop every active session concurrently, e.g. on shutdown.
    pub async fn clear(&self) -> Vec<StopReport> {
        let ids = self.registry.ids().await;
        let stops = ids.iter().map(|session_id| async move {
            (session_id, self.stop_session(session_id).await)
        });

        let mut reports = Vec::new();
        for (session_id, result) in join_all(stops).await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Failed to stop session {} during clear: {}", session_id, e),
            }
        }
        reports
    }

    fn default_channels(&self) -> BTreeSet<ChannelKind> {
        let available = self.catalog.available();
        match &self.defaults.default_channels {
            None => available.into_iter().collect(),
            Some(wanted) => wanted
                .iter()
                .copied()
                .filter(|kind| {
                    let configured = available.contains(kind);
                    if !configured {
                        warn!("Default channel {} is not configured; skipping", kind);
                    }
                    configured
                })
                .collect(),
        }
    }

    async fn lookup(&self, session_id: &str) -> SessionResult<Arc<SessionOrchestrator>> {
        self.registry.get(session_id).await.inspect_err(|e| {
            if let SessionError::Ended { .. } = e {
                warn!("Dropping event for ended session {}", session_id);
            }
        })
    }
}
