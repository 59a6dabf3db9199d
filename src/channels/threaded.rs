//! Team-chat channel with one thread per session.
//!
//! The session-start message becomes the thread parent; its timestamp is the
//! [`ThreadHandle`] every nudge and the closing summary reply under.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::format::{self, Markup};
use super::{
    Ack, ChannelError, ChannelKind, NotificationChannel, NudgeReply, SessionSummary,
    ThreadHandle, ThreadInfo,
};
use crate::config::ThreadedChannelConfig;

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

pub struct TeamThreadChannel {
    client: reqwest::Client,
    api_base: String,
    token: String,
    channel_id: String,
}

impl TeamThreadChannel {
    pub fn new(config: &ThreadedChannelConfig) -> Result<Self> {
        if config.channel_id.trim().is_empty() {
            bail!("channel_id is required for the threaded channel");
        }

        let api_base = config.api_base.trim_end_matches('/').to_string();
        info!(
            "Initialized threaded channel {} via {}",
            config.channel_id, api_base
        );

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            token: config.token.clone(),
            channel_id: config.channel_id.clone(),
        })
    }

    async fn post(&self, text: String, thread_ts: Option<&str>) -> Result<String, ChannelError> {
        let mut body = json!({
            "channel": self.channel_id,
            "text": text,
            "unfurl_links": false,
        });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            error!(
                "Threaded channel request failed with status {}: {}",
                status, response_text
            );
            return Err(ChannelError::Rejected {
                channel: ChannelKind::Threaded,
                message: format!("status {status}"),
            });
        }

        let parsed: PostMessageResponse =
            serde_json::from_str(&response_text).map_err(|e| ChannelError::Rejected {
                channel: ChannelKind::Threaded,
                message: format!("unreadable response: {e}"),
            })?;
        read_ts(parsed)
    }

    fn require<'a>(&self, handle: Option<&'a ThreadHandle>) -> Result<&'a str, ChannelError> {
        handle
            .map(ThreadHandle::as_str)
            .ok_or(ChannelError::MissingThread(ChannelKind::Threaded))
    }
}

fn read_ts(response: PostMessageResponse) -> Result<String, ChannelError> {
    if !response.ok {
        return Err(ChannelError::Rejected {
            channel: ChannelKind::Threaded,
            message: response.error.unwrap_or_else(|| "unknown_error".to_string()),
        });
    }
    response.ts.ok_or_else(|| ChannelError::Rejected {
        channel: ChannelKind::Threaded,
        message: "response missing ts".to_string(),
    })
}

#[async_trait]
impl NotificationChannel for TeamThreadChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Threaded
    }

    fn requires_thread(&self) -> bool {
        true
    }

    async fn start_thread(&self, info: &ThreadInfo) -> Result<Option<ThreadHandle>, ChannelError> {
        let ts = self
            .post(format::session_start(info, Markup::Mrkdwn), None)
            .await?;
        debug!("Opened thread {} for session {}", ts, info.session_id);
        Ok(Some(ThreadHandle(ts)))
    }

    async fn post_reply(
        &self,
        handle: Option<&ThreadHandle>,
        reply: &NudgeReply,
    ) -> Result<Ack, ChannelError> {
        let parent = self.require(handle)?;
        let ts = self
            .post(format::nudge(reply, Markup::Mrkdwn), Some(parent))
            .await?;
        Ok(Ack::single(Some(ts)))
    }

    async fn end_thread(
        &self,
        handle: Option<&ThreadHandle>,
        summary: &SessionSummary,
    ) -> Result<Ack, ChannelError> {
        let parent = self.require(handle)?;
        let ts = self
            .post(format::summary(summary, Markup::Mrkdwn), Some(parent))
            .await?;
        Ok(Ack::single(Some(ts)))
    }
}
