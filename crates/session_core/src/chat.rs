use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fit_engine::FittingEngine;
use shared::protocol::{ChatEntry, ChatMessage, ChatResponse, ChatRole, ToolInvocation, ToolSchema};
use tracing::{debug, info, warn};

use crate::{session::FitSession, tools::tool_schemas};

/// Reply used instead of contacting the transport when tools are off and the
/// user asks for a change.
pub const ENABLE_TOOLS_PROMPT: &str = "I can make that change automatically if you enable AI tools \
(`:tools on`). Please turn them on and send the message again.";

const MUTATION_KEYWORDS: [&str; 8] = [
    "set ",
    "change ",
    "update ",
    "enable ",
    "run fit",
    "run-fit",
    "set parameter",
    "set-parameter",
];

/// Chat model collaborator. Given the conversation so far and the tools on
/// offer, returns either a final text reply or a batch of tool calls.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatResponse>;
}

pub struct MissingChatTransport;

#[async_trait]
impl ChatTransport for MissingChatTransport {
    async fn send(&self, _messages: &[ChatMessage], _tools: &[ToolSchema]) -> Result<ChatResponse> {
        Err(anyhow!(
            "Anthropic API key not configured. Set ANTHROPIC_API_KEY or anthropic_api_key in the config file."
        ))
    }
}

pub fn looks_like_mutation_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    MUTATION_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// Whether an assistant reply asks the user to turn AI tools on.
pub fn response_requests_enable_tools(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("enable") && lowered.contains("ai tools")
}

fn with_tool_summary(reply: String, invocations: &[ToolInvocation]) -> String {
    if invocations.is_empty() {
        return reply;
    }
    let summary: Vec<String> = invocations
        .iter()
        .map(|invocation| format!("[Used tool: {}]", invocation.tool_name))
        .collect();
    format!("{reply}\n\n{}", summary.join("\n"))
}

/// Runs one chat turn to completion. Every requested tool call is dispatched
/// in order before the next transport round; no render pass can interleave.
/// Returns the assistant entry, which is also appended to the history.
pub async fn run_chat_turn<E: FittingEngine>(
    session: &mut FitSession<E>,
    transport: &dyn ChatTransport,
    text: &str,
) -> ChatEntry {
    let tools_enabled = session.tools_enabled();
    let user_entry = ChatEntry::new(ChatRole::User, text);

    if !tools_enabled && looks_like_mutation_request(text) {
        info!("mutation request while AI tools are disabled");
        let reply = ChatEntry::new(ChatRole::Assistant, ENABLE_TOOLS_PROMPT);
        session.history.push(user_entry);
        session.history.push(reply.clone());
        return reply;
    }

    let mut messages: Vec<ChatMessage> = session
        .history
        .iter()
        .map(|entry| ChatMessage::text(entry.role, entry.content.clone()))
        .collect();
    messages.push(ChatMessage::text(
        ChatRole::User,
        format!(
            "[Current State]\n{}\n\n[User Message]\n{text}",
            session.state_context()
        ),
    ));
    let schemas = if tools_enabled { tool_schemas() } else { Vec::new() };

    let max_rounds = session.settings.max_tool_rounds;
    let mut invocations: Vec<ToolInvocation> = Vec::new();
    let mut rounds = 0usize;
    let reply = loop {
        let response = match transport.send(&messages, &schemas).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "chat transport failed");
                break format!("Error: {err}");
            }
        };
        match response {
            ChatResponse::Text(text) => break text,
            ChatResponse::ToolUse { text, calls } => {
                if rounds >= max_rounds {
                    warn!(rounds, "tool round limit reached");
                    break format!(
                        "Stopped after {rounds} rounds of tool calls without a final answer."
                    );
                }
                rounds += 1;
                debug!(round = rounds, calls = calls.len(), "dispatching tool calls");
                let results: Vec<ToolInvocation> =
                    calls.iter().map(|call| session.dispatch(call)).collect();
                messages.push(ChatMessage::tool_use(text, &calls));
                messages.push(ChatMessage::tool_results(&results));
                invocations.extend(results);
            }
        }
    };

    let mut entry = ChatEntry::new(ChatRole::Assistant, with_tool_summary(reply, &invocations));
    entry.tool_invocations = invocations;
    session.history.push(user_entry);
    session.history.push(entry.clone());
    entry
}

#[cfg(test)]
#[path = "tests/chat_tests.rs"]
mod tests;
