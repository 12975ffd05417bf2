use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The global AI tools switch is off.
    Disabled,
    UnknownTool,
    /// Rejected before the domain model was touched.
    Validation,
    /// The fitting engine failed while applying the change.
    DomainMutation,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DomainMutation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// True when the call was refused before any state could change.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Disabled | ErrorCode::UnknownTool | ErrorCode::Validation
        )
    }
}
