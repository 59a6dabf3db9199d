//! SMS fan-out. Every configured number gets an identical copy.
//!
//! Partial success is reported in the [`Ack`]; the call only fails when no
//! recipient could be reached.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use super::format::{self, Markup};
use super::{
    Ack, ChannelError, ChannelKind, NotificationChannel, NudgeReply, SessionSummary,
    ThreadHandle, ThreadInfo,
};
use crate::config::BroadcastChannelConfig;

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
    code: Option<i64>,
}

pub struct SmsBroadcastChannel {
    client: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_numbers: Vec<String>,
}

impl SmsBroadcastChannel {
    pub fn new(config: &BroadcastChannelConfig) -> Result<Self> {
        let e164 = Regex::new(r"^\+[1-9]\d{6,14}$").context("Failed to compile phone pattern")?;

        if !e164.is_match(&config.from_number) {
            bail!("from_number {} is not in E.164 format", config.from_number);
        }
        if config.to_numbers.is_empty() {
            bail!("to_numbers must list at least one recipient for the broadcast channel");
        }
        if let Some(bad) = config.to_numbers.iter().find(|n| !e164.is_match(n)) {
            bail!("recipient {} is not in E.164 format", bad);
        }

        let messages_url = format!(
            "{}/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid
        );
        info!(
            "Initialized SMS broadcast channel with {} recipients",
            config.to_numbers.len()
        );

        Ok(Self {
            client: reqwest::Client::new(),
            messages_url,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            to_numbers: config.to_numbers.clone(),
        })
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<Option<String>, ChannelError> {
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(err) => format!("{} (code {:?})", err.message, err.code),
                Err(_) => format!("status {status}"),
            };
            return Err(ChannelError::Rejected {
                channel: ChannelKind::Broadcast,
                message,
            });
        }

        Ok(serde_json::from_str::<MessageResponse>(&text)
            .ok()
            .and_then(|r| r.sid))
    }

    async fn broadcast(&self, body: String) -> Result<Ack, ChannelError> {
        let sends = self.to_numbers.iter().map(|to| self.send_one(to, &body));
        let results = join_all(sends).await;

        let mut ack = Ack::default();
        for (to, result) in self.to_numbers.iter().zip(results) {
            match result {
                Ok(sid) => {
                    ack.delivered += 1;
                    if ack.message_id.is_none() {
                        ack.message_id = sid;
                    }
                }
                Err(e) => {
                    ack.failed += 1;
                    warn!("SMS to {} failed: {}", mask_number(to), e);
                }
            }
        }

        settle(ack)
    }
}

fn settle(ack: Ack) -> Result<Ack, ChannelError> {
    if ack.delivered == 0 && ack.failed > 0 {
        return Err(ChannelError::AllRecipientsFailed { failed: ack.failed });
    }
    Ok(ack)
}

/// `+15551234567` → `+1555***4567`
fn mask_number(number: &str) -> String {
    if number.len() <= 8 {
        return number.to_string();
    }
    format!("{}***{}", &number[..5], &number[number.len() - 4..])
}

#[async_trait]
impl NotificationChannel for SmsBroadcastChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Broadcast
    }

    async fn start_thread(&self, info: &ThreadInfo) -> Result<Option<ThreadHandle>, ChannelError> {
        self.broadcast(format::session_start(info, Markup::Plain))
            .await?;
        Ok(None)
    }

    async fn post_reply(
        &self,
        _handle: Option<&ThreadHandle>,
        reply: &NudgeReply,
    ) -> Result<Ack, ChannelError> {
        self.broadcast(format::nudge(reply, Markup::Plain)).await
    }

    async fn end_thread(
        &self,
        _handle: Option<&ThreadHandle>,
        summary: &SessionSummary,
    ) -> Result<Ack, ChannelError> {
        self.broadcast(format::summary(summary, Markup::Plain)).await
    }
}
