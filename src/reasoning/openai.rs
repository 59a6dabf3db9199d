//! Chat-completions gateway using function calling.
//!
//! The engine is offered a single `send_coaching_message` tool. A tool call
//! becomes a [`Decision::Directive`]; a plain answer means no action. Each
//! session keeps a bounded message memory so the engine sees what it already
//! said earlier in the meeting.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{AnalysisContext, CoachingDirective, Decision, ReasoningError, ReasoningGateway};
use crate::config::ReasoningConfig;

const COACHING_TOOL: &str = "send_coaching_message";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a live meeting coach. You read the latest \
transcript lines of an ongoing call and decide whether the host needs a short, private \
nudge right now. Only call send_coaching_message when a nudge would clearly help; \
otherwise reply with a brief note of what you observed. Keep messages under 200 characters.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CoachingArguments {
    target_participant_id: String,
    target_participant_name: String,
    message: String,
    reason: String,
}

pub struct OpenAiReasoningGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    memory_messages: usize,
    memory: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl OpenAiReasoningGateway {
    pub fn from_config(config: &ReasoningConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("api_key is required for the reasoning gateway")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .context("Failed to build reasoning HTTP client")?;

        info!(
            "Initialized reasoning gateway with endpoint: {} (model {})",
            config.endpoint, config.model
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            // Whole user/assistant pairs, so memory never opens on a reply.
            memory_messages: (config.memory_messages.max(2) / 2) * 2,
            memory: Mutex::new(HashMap::new()),
        })
    }

    fn request_body(&self, history: &[ChatMessage], prompt: &ChatMessage) -> Value {
        let mut messages = vec![ChatMessage::new("system", self.system_prompt.clone())];
        messages.extend(history.iter().cloned());
        messages.push(prompt.clone());

        json!({
            "model": self.model,
            "messages": messages,
            "tools": [coaching_tool()],
            "tool_choice": "auto",
        })
    }

    async fn remember(&self, session_id: &str, exchange: [ChatMessage; 2]) {
        let mut memory = self.memory.lock().await;
        let history = memory.entry(session_id.to_string()).or_default();
        history.extend(exchange);
        if history.len() > self.memory_messages {
            let excess = history.len() - self.memory_messages;
            history.drain(..excess);
        }
    }
}

#[async_trait]
impl ReasoningGateway for OpenAiReasoningGateway {
    async fn analyze(
        &self,
        batch_text: &str,
        context: &AnalysisContext,
    ) -> Result<Decision, ReasoningError> {
        let prompt = ChatMessage::new("user", render_prompt(batch_text, context));
        let history = {
            let memory = self.memory.lock().await;
            memory.get(&context.session_id).cloned().unwrap_or_default()
        };

        debug!(
            "Sending batch {} of session {} to reasoning engine ({} remembered messages)",
            context.batch_number,
            context.session_id,
            history.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&history, &prompt))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!(
                "Reasoning request failed with status {}: {}",
                status, response_text
            );
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;
        let (decision, reply) = parse_decision(parsed)?;

        self.remember(&context.session_id, [prompt, ChatMessage::new("assistant", reply)])
            .await;

        Ok(decision)
    }

    async fn forget(&self, session_id: &str) {
        self.memory.lock().await.remove(session_id);
    }
}

fn coaching_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": COACHING_TOOL,
            "description": "Privately send a short coaching message to a meeting participant.",
            "parameters": {
                "type": "object",
                "properties": {
                    "target_participant_id": { "type": "string" },
                    "target_participant_name": { "type": "string" },
                    "message": { "type": "string", "description": "The nudge itself" },
                    "reason": { "type": "string", "description": "Short classification of why" }
                },
                "required": [
                    "target_participant_id",
                    "target_participant_name",
                    "message",
                    "reason"
                ]
            }
        }
    })
}

fn render_prompt(batch_text: &str, context: &AnalysisContext) -> String {
    let host = context
        .host
        .as_ref()
        .map(|h| format!("{} (id {})", h.name, h.participant_id))
        .unwrap_or_else(|| "not yet identified".to_string());

    let mut prompt = format!(
        "Meeting: {}\nHost: {}\nNudges sent so far: {}\nBatch #{}{}\n\nTranscript:\n{}",
        context.meeting_title.as_deref().unwrap_or("untitled"),
        host,
        context.nudge_count,
        context.batch_number,
        if context.final_batch { " (final moments)" } else { "" },
        batch_text
    );
    if context.final_batch {
        prompt.push_str("\n\nThe meeting is ending; only nudge if something is still actionable.");
    }
    prompt
}

/// Map a completion onto a decision plus the text to remember as the reply.
fn parse_decision(response: ChatResponse) -> Result<(Decision, String), ReasoningError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| ReasoningError::Malformed("response has no choices".to_string()))?;

    let call = message
        .tool_calls
        .into_iter()
        .find(|call| call.function.name == COACHING_TOOL);

    match call {
        Some(call) => {
            let args: CoachingArguments = serde_json::from_str(&call.function.arguments)
                .map_err(|e| ReasoningError::Malformed(format!("tool arguments: {e}")))?;
            if args.message.trim().is_empty() {
                return Err(ReasoningError::Malformed(
                    "coaching message is empty".to_string(),
                ));
            }
            let reply = format!(
                "Sent coaching to {}: {}",
                args.target_participant_name, args.message
            );
            Ok((
                Decision::Directive(CoachingDirective {
                    target_participant_id: args.target_participant_id,
                    target_participant_name: args.target_participant_name,
                    message: args.message.trim().to_string(),
                    reason: args.reason,
                }),
                reply,
            ))
        }
        None => Ok((
            Decision::NoAction,
            message.content.unwrap_or_else(|| "No action.".to_string()),
        )),
    }
}
