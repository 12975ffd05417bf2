//! Anthropic Messages API transport for the chat turn loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use session_core::ChatTransport;
use shared::protocol::{ChatMessage, ChatResponse, ToolCall, ToolSchema};
use tracing::debug;

use crate::config::Settings;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const SYSTEM_PROMPT: &str = "You are a SANS (Small-Angle Neutron Scattering) data analysis assistant integrated into an application for curve fitting.

You have access to tools that can:
- List and inspect available scattering models (sphere, cylinder, ellipsoid, etc.)
- Load models and configure their parameters
- Run curve fitting optimization
- Enable advanced features like polydispersity and structure factors

When helping users:
1. First understand their sample and experimental setup
2. Suggest appropriate models based on the sample description
3. Guide parameter setup with physically reasonable initial values
4. Run fits and interpret results
5. Suggest refinements if fit quality is poor

Always explain your actions clearly. Use the tools to perform actions rather than just describing what could be done.

The application shows the parameter tables again after every change, so the user sees the effect of each tool immediately.";

pub struct AnthropicTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolSchema],
}

fn no_tools(tools: &&[ToolSchema]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl AnthropicTransport {
    pub fn new(api_key: String, settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!(
                "{}/v1/messages",
                settings.anthropic_base_url.trim_end_matches('/')
            ),
            api_key,
            model: settings.anthropic_model.clone(),
            max_tokens: settings.max_tokens,
        }
    }

    pub(crate) fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolSchema],
    ) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT,
            messages,
            tools,
        }
    }
}

#[async_trait]
impl ChatTransport for AnthropicTransport {
    async fn send(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatResponse> {
        debug!(messages = messages.len(), tools = tools.len(), "sending chat request");
        let response: MessagesResponse = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request(messages, tools))
            .send()
            .await
            .context("chat request failed")?
            .error_for_status()?
            .json()
            .await
            .context("unreadable chat response")?;
        debug!(stop_reason = ?response.stop_reason, "chat response received");
        Ok(into_chat_response(response))
    }
}

/// Text blocks are joined; any tool_use block turns the reply into a tool round.
pub(crate) fn into_chat_response(response: MessagesResponse) -> ChatResponse {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::Text { text } => texts.push(text),
            ResponseBlock::ToolUse { id, name, input } => calls.push(ToolCall::new(id, name, input)),
            ResponseBlock::Other => {}
        }
    }
    let text = texts.join("\n");
    if calls.is_empty() {
        ChatResponse::Text(text)
    } else {
        ChatResponse::ToolUse {
            text: (!text.is_empty()).then_some(text),
            calls,
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
