use anyhow::{Context, Result};
use fit_engine::{Dataset, FitOptions, ReferenceFitter};
use session_core::{
    response_requests_enable_tools, run_chat_turn, ChatTransport, FitSession, MissingChatTransport,
};
use shared::protocol::ToolCall;
use tracing::{info, warn};

use crate::{
    commands::{ConsoleCommand, HELP},
    config::Settings,
    transport::AnthropicTransport,
    view::{render_fit, render_panel},
};

/// A fitting session over the reference engine plus the assistant transport.
pub struct Console {
    session: FitSession<ReferenceFitter>,
    transport: Box<dyn ChatTransport>,
}

impl Console {
    pub fn new(settings: &Settings) -> Self {
        let transport: Box<dyn ChatTransport> = match &settings.anthropic_api_key {
            Some(key) => Box::new(AnthropicTransport::new(key.clone(), settings)),
            None => {
                warn!("no Anthropic API key configured; chat replies will report the missing key");
                Box::new(MissingChatTransport)
            }
        };
        Self::with_transport(settings, transport)
    }

    pub fn with_transport(settings: &Settings, transport: Box<dyn ChatTransport>) -> Self {
        let engine = ReferenceFitter::new().with_options(FitOptions {
            max_evaluations: settings.fit_max_evaluations,
            ..FitOptions::default()
        });
        let catalog = engine.catalog();
        Self {
            session: FitSession::new(engine, catalog, settings.session_settings()),
            transport,
        }
    }

    pub fn session(&self) -> &FitSession<ReferenceFitter> {
        &self.session
    }

    pub fn render(&mut self) -> Result<String> {
        let view = self.session.render_pass()?;
        Ok(render_panel(&view))
    }

    /// Runs one command and returns the message to print above the panel.
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<String> {
        let message = match command {
            ConsoleCommand::LoadData(path) => {
                let data = Dataset::load(&path)?;
                let points = data.len();
                self.session
                    .load_data(data)
                    .with_context(|| format!("cannot load '{}'", path.display()))?;
                info!(path = %path.display(), points, "dataset loaded");
                format!("Loaded {points} points from {}", path.display())
            }
            ConsoleCommand::SelectModel(name) => {
                let parameters = self.session.select_model(&name)?;
                format!("Model '{name}' selected with {} parameters", parameters.len())
            }
            ConsoleCommand::Edit { key, value } => {
                self.session.user_input(&key, value)?;
                format!("{key} edited; use :apply or :apply-pd to commit")
            }
            ConsoleCommand::ApplyParameters => {
                let applied = self.session.apply_parameter_edits()?;
                format!("Applied edits to {applied} parameters")
            }
            ConsoleCommand::ApplyPolydispersity => {
                let applied = self.session.apply_pd_edits()?;
                format!("Applied polydispersity to {applied} parameters")
            }
            ConsoleCommand::Preset(preset) => {
                self.session.apply_preset(preset)?;
                format!("Preset {} applied", preset.as_str())
            }
            ConsoleCommand::Fit => render_fit(&self.session.run_fit()?),
            ConsoleCommand::Tools(enabled) => {
                self.session.set_tools_enabled(enabled)?;
                format!("AI tools {}", if enabled { "enabled" } else { "disabled" })
            }
            ConsoleCommand::Tool { name, arguments } => {
                let invocation = self.session.dispatch(&ToolCall::local(name, arguments));
                if invocation.success {
                    invocation.result
                } else {
                    format!("{} failed: {}", invocation.tool_name, invocation.result)
                }
            }
            ConsoleCommand::State => self.session.state_context(),
            ConsoleCommand::ClearChat => {
                self.session.clear_history();
                "Chat history cleared".to_string()
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => String::new(),
            ConsoleCommand::Chat(text) => {
                let reply = run_chat_turn(&mut self.session, self.transport.as_ref(), &text).await;
                if !self.session.tools_enabled() && response_requests_enable_tools(&reply.content) {
                    format!("{}\n(type :tools on to enable AI tools)", reply.content)
                } else {
                    reply.content
                }
            }
        };
        Ok(message)
    }
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;
