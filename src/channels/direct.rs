//! Private in-meeting chat with the host through a bot-framework service.
//!
//! There is no thread: every call posts straight into the host's 1:1
//! conversation, found through the [`ConversationReferenceStore`]. When no
//! reference exists and the bot identity is configured, a new conversation is
//! created and remembered.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::format::{self, Markup};
use super::{
    Ack, ChannelError, ChannelKind, ConversationReference, ConversationReferenceStore,
    NotificationChannel, NudgeReply, SessionSummary, ThreadHandle, ThreadInfo,
};
use crate::config::DirectChannelConfig;
use crate::transcript::HostIdentity;

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    id: Option<String>,
}

pub struct DirectMessageChannel {
    client: reqwest::Client,
    service_url: String,
    bot_token: String,
    bot_id: Option<String>,
    tenant_id: Option<String>,
    references: Arc<ConversationReferenceStore>,
}

impl DirectMessageChannel {
    pub fn new(
        config: &DirectChannelConfig,
        references: Arc<ConversationReferenceStore>,
    ) -> Result<Self> {
        let service_url = config.service_url.trim_end_matches('/').to_string();
        info!("Initialized direct channel with service URL: {}", service_url);

        Ok(Self {
            client: reqwest::Client::new(),
            service_url,
            bot_token: config.bot_token.clone(),
            bot_id: config.bot_id.clone(),
            tenant_id: config.tenant_id.clone(),
            references,
        })
    }

    async fn conversation_for(
        &self,
        host: &HostIdentity,
    ) -> Result<ConversationReference, ChannelError> {
        if let Some(reference) = self.references.resolve(host).await {
            return Ok(reference);
        }

        let (Some(bot_id), Some(tenant_id)) = (&self.bot_id, &self.tenant_id) else {
            return Err(ChannelError::NoConversationReference {
                participant: host.name.clone(),
            });
        };

        debug!("Creating direct conversation for {}", host.name);
        let response = self
            .client
            .post(format!("{}/v3/conversations", self.service_url))
            .bearer_auth(&self.bot_token)
            .json(&json!({
                "bot": { "id": bot_id },
                "members": [{ "id": host.participant_id }],
                "isGroup": false,
                "tenantId": tenant_id,
                "channelData": { "tenant": { "id": tenant_id } },
            }))
            .send()
            .await?;

        let conversation_id = self.read_id(response).await?.ok_or_else(|| {
            ChannelError::Rejected {
                channel: ChannelKind::Direct,
                message: "conversation created without an id".to_string(),
            }
        })?;

        let reference = ConversationReference {
            participant_id: host.participant_id.clone(),
            participant_name: host.name.clone(),
            conversation_id,
            service_url: None,
            updated_at: chrono::Utc::now(),
        };
        self.references.upsert(reference.clone()).await;
        Ok(reference)
    }

    async fn send(&self, host: &HostIdentity, text: String) -> Result<Ack, ChannelError> {
        let reference = self.conversation_for(host).await?;
        let service_url = reference
            .service_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(&self.service_url);

        let response = self
            .client
            .post(format!(
                "{}/v3/conversations/{}/activities",
                service_url, reference.conversation_id
            ))
            .bearer_auth(&self.bot_token)
            .json(&json!({
                "type": "message",
                "text": text,
                "textFormat": "markdown",
            }))
            .send()
            .await?;

        let message_id = self.read_id(response).await?;
        Ok(Ack::single(message_id))
    }

    async fn read_id(&self, response: reqwest::Response) -> Result<Option<String>, ChannelError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Direct channel request failed with status {}: {}", status, body);
            return Err(ChannelError::Rejected {
                channel: ChannelKind::Direct,
                message: format!("status {status}: {body}"),
            });
        }

        Ok(serde_json::from_str::<ResourceResponse>(&body)
            .ok()
            .and_then(|r| r.id))
    }
}

#[async_trait]
impl NotificationChannel for DirectMessageChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Direct
    }

    async fn start_thread(&self, info: &ThreadInfo) -> Result<Option<ThreadHandle>, ChannelError> {
        self.send(&info.member, format::session_start(info, Markup::Markdown))
            .await?;
        Ok(None)
    }

    async fn post_reply(
        &self,
        _handle: Option<&ThreadHandle>,
        reply: &NudgeReply,
    ) -> Result<Ack, ChannelError> {
        self.send(&reply.recipient, format::nudge(reply, Markup::Markdown))
            .await
    }

    async fn end_thread(
        &self,
        _handle: Option<&ThreadHandle>,
        summary: &SessionSummary,
    ) -> Result<Ack, ChannelError> {
        self.send(&summary.recipient, format::summary(summary, Markup::Markdown))
            .await
    }
}
