//! HTTP client for a running coachline service.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ServerConfig;

/// Session row as returned by `GET /sessions`.
#[derive(Debug, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    pub phase: String,
    pub meeting_title: Option<String>,
    pub host: Option<HostRow>,
    pub nudge_count: u32,
    pub batches_analyzed: u32,
    pub duration_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct HostRow {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<SessionRow>,
}

#[derive(Debug, Deserialize)]
pub struct StopRow {
    pub session_id: String,
    pub duration_minutes: i64,
    pub total_nudges: u32,
    pub final_flush: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct ServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(&format!("http://{}:{}", server.host, server.port))
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>> {
        let response = self
            .client
            .get(format!("{}/sessions", self.base_url))
            .send()
            .await
            .context("Failed to reach coachline service. Is it running?")?;
        let list: SessionList = read_json(response).await?;
        Ok(list.sessions)
    }

    pub async fn stop_session(&self, session_id: &str) -> Result<StopRow> {
        let response = self
            .client
            .post(format!("{}/sessions/{}/stop", self.base_url, session_id))
            .send()
            .await
            .context("Failed to reach coachline service. Is it running?")?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .context("Failed to read response body")?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        bail!("Service returned {}: {}", status, message);
    }

    serde_json::from_str(&text).context("Failed to parse service response")
}
