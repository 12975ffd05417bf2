//! Session core for AI-assisted SANS fitting.
//!
//! A [`FitSession`] owns the fitting engine (the domain model), the widget
//! store behind a [`StateBridge`], and the chat history. Human edits land in
//! the store and reach the domain on an explicit apply; agent tool calls
//! mutate the domain first, are mirrored into the store, and then request a
//! redraw that the next [`FitSession::render_pass`] consumes.

pub mod bridge;
pub mod chat;
pub mod dispatch;
pub mod error;
pub mod render;
pub mod session;
pub mod store;
pub mod tools;

pub use bridge::{clamp_for_display, clamp_pd_width, DISPLAY_LIMIT, PdWidgetUpdate, PdWidgets, StateBridge};
pub use chat::{
    looks_like_mutation_request, response_requests_enable_tools, run_chat_turn, ChatTransport,
    MissingChatTransport, ENABLE_TOOLS_PROMPT,
};
pub use dispatch::{ToolOutcome, TOOLS_DISABLED_MESSAGE};
pub use error::{BridgeError, SessionError};
pub use render::{FitView, PanelView, ParameterRow, PdRow, ResidualStats};
pub use session::{FitSession, SessionSettings, VaryPreset};
pub use store::{WidgetStore, WidgetValue};
pub use tools::{tool_schemas, ToolRequest};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
