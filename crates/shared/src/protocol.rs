use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListSansModels,
    GetModelParameters,
    GetCurrentState,
    GetFitResults,
    SetModel,
    SetParameter,
    SetMultipleParameters,
    EnablePolydispersity,
    SetStructureFactor,
    RemoveStructureFactor,
    RunFit,
}

impl ToolName {
    pub const ALL: [ToolName; 11] = [
        ToolName::ListSansModels,
        ToolName::GetModelParameters,
        ToolName::GetCurrentState,
        ToolName::GetFitResults,
        ToolName::SetModel,
        ToolName::SetParameter,
        ToolName::SetMultipleParameters,
        ToolName::EnablePolydispersity,
        ToolName::SetStructureFactor,
        ToolName::RemoveStructureFactor,
        ToolName::RunFit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ListSansModels => "list-sans-models",
            ToolName::GetModelParameters => "get-model-parameters",
            ToolName::GetCurrentState => "get-current-state",
            ToolName::GetFitResults => "get-fit-results",
            ToolName::SetModel => "set-model",
            ToolName::SetParameter => "set-parameter",
            ToolName::SetMultipleParameters => "set-multiple-parameters",
            ToolName::EnablePolydispersity => "enable-polydispersity",
            ToolName::SetStructureFactor => "set-structure-factor",
            ToolName::RemoveStructureFactor => "remove-structure-factor",
            ToolName::RunFit => "run-fit",
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            ToolName::ListSansModels
                | ToolName::GetModelParameters
                | ToolName::GetCurrentState
                | ToolName::GetFitResults
        )
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == raw)
            .ok_or_else(|| format!("Unknown tool: {raw}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Tool call issued from the console rather than by a model.
    pub fn local(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(format!("local-{}", Uuid::new_v4()), name, arguments)
    }
}

/// Tool description in the Anthropic tool-use format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub tool_call_id: String,
    pub input: Value,
    pub result: String,
    pub success: bool,
    /// Whether the call changed session state and requested a redraw.
    #[serde(default)]
    pub state_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn tool_use(text: Option<String>, calls: &[ToolCall]) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            content.push(ContentBlock::Text { text });
        }
        content.extend(calls.iter().map(|call| ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        }));
        Self {
            role: ChatRole::Assistant,
            content,
        }
    }

    pub fn tool_results(invocations: &[ToolInvocation]) -> Self {
        Self {
            role: ChatRole::User,
            content: invocations
                .iter()
                .map(|invocation| ContentBlock::ToolResult {
                    tool_use_id: invocation.tool_call_id.clone(),
                    content: invocation.result.clone(),
                    is_error: !invocation.success,
                })
                .collect(),
        }
    }

    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Displayed conversation entry kept in the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_invocations: Vec<ToolInvocation>,
    pub sent_at: DateTime<Utc>,
}

impl ChatEntry {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_invocations: Vec::new(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    Text(String),
    ToolUse {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}
