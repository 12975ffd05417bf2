use fit_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("malformed widget key: parameter name must not be empty")]
    MalformedKey,
    #[error("widget '{key}' has already been drawn in the current render pass")]
    WidgetAlreadyDrawn { key: String },
    #[error("a render pass is already open")]
    PassAlreadyOpen,
    #[error("no render pass is open")]
    NoOpenPass,
}

/// Failures of the human (non-tool) path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("invalid input for '{key}': {reason}")]
    InvalidInput { key: String, reason: String },
    #[error("{0}")]
    NotReady(&'static str),
}
