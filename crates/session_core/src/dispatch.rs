//! Tool dispatch: one tool call becomes one domain mutation, one mirroring
//! sequence and one redraw flag, in that order.

use std::collections::BTreeMap;

use fit_engine::FittingEngine;
use serde_json::Value;
use shared::{
    domain::{Distribution, FitResult, ParameterUpdate, PolydispersityConfig, DEFAULT_PD_POINTS},
    error::{ErrorCode, ToolError},
    protocol::{ToolCall, ToolInvocation},
};
use tracing::{error, info, warn};

use crate::{bridge::PdWidgetUpdate, session::FitSession, tools::ToolRequest};

pub const TOOLS_DISABLED_MESSAGE: &str =
    "AI tools are disabled. Enable AI tools to let the assistant inspect or modify the fit.";

/// Successful tool outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub message: String,
    pub state_changed: bool,
}

impl ToolOutcome {
    fn read(message: String) -> Self {
        Self {
            message,
            state_changed: false,
        }
    }

    fn changed(message: String) -> Self {
        Self {
            message,
            state_changed: true,
        }
    }
}

fn format_stderr(value: f64, stderr: Option<f64>) -> String {
    match stderr {
        Some(stderr) => format!("{value:.4} ± {stderr:.4}"),
        None => format!("{value:.4}"),
    }
}

fn fitted_lines(result: &FitResult) -> Vec<String> {
    result
        .parameters
        .iter()
        .map(|(name, fitted)| format!("  - {name}: {}", format_stderr(fitted.value, fitted.stderr)))
        .collect()
}

impl<E: FittingEngine> FitSession<E> {
    /// Handles one tool call. Never fails: errors become an unsuccessful
    /// [`ToolInvocation`] carrying a readable message.
    pub fn dispatch(&mut self, call: &ToolCall) -> ToolInvocation {
        let outcome = self.execute_tool(&call.name, &call.arguments);
        let (result, success, state_changed) = match outcome {
            Ok(outcome) => (outcome.message, true, outcome.state_changed),
            Err(err) => (err.message, false, false),
        };
        ToolInvocation {
            tool_name: call.name.clone(),
            tool_call_id: call.id.clone(),
            input: call.arguments.clone(),
            result,
            success,
            state_changed,
        }
    }

    pub fn execute_tool(&mut self, name: &str, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        if !self.tools_enabled() {
            info!(tool = %name, "tool call refused: AI tools disabled");
            return Err(ToolError::new(ErrorCode::Disabled, TOOLS_DISABLED_MESSAGE));
        }
        let request = ToolRequest::parse(name, arguments).inspect_err(|err| {
            warn!(tool = %name, error = %err, "tool call rejected");
        })?;
        if self.bridge.pass_open() {
            return Err(ToolError::internal(
                "Tool calls cannot run while a render pass is open.",
            ));
        }

        let tool = request.tool();
        let outcome = self.run_request(request);
        match &outcome {
            Ok(outcome) if outcome.state_changed => {
                info!(tool = %tool, "tool applied");
            }
            Ok(_) => {}
            Err(err) if err.code == ErrorCode::DomainMutation => {
                error!(tool = %tool, error = %err, "tool failed in the fitting engine");
            }
            Err(err) => {
                warn!(tool = %tool, error = %err, "tool call rejected");
            }
        }
        outcome
    }

    fn run_request(&mut self, request: ToolRequest) -> Result<ToolOutcome, ToolError> {
        match request {
            ToolRequest::ListModels => Ok(ToolOutcome::read(self.list_models())),
            ToolRequest::GetModelParameters { model_name } => {
                self.model_parameters(&model_name).map(ToolOutcome::read)
            }
            ToolRequest::GetCurrentState => Ok(ToolOutcome::read(self.current_state())),
            ToolRequest::GetFitResults => Ok(ToolOutcome::read(self.fit_results())),
            ToolRequest::SetModel { model_name } => self.tool_set_model(&model_name),
            ToolRequest::SetParameter { name, update } => self.tool_set_parameter(&name, update),
            ToolRequest::SetMultipleParameters { updates } => self.tool_set_multiple(updates),
            ToolRequest::EnablePolydispersity {
                parameter_name,
                distribution,
                width,
            } => self.tool_enable_polydispersity(&parameter_name, distribution, width),
            ToolRequest::SetStructureFactor { sf_name } => self.tool_set_structure_factor(&sf_name),
            ToolRequest::RemoveStructureFactor => self.tool_remove_structure_factor(),
            ToolRequest::RunFit => self.tool_run_fit(),
        }
    }

    /// Final step of every state-changing tool, after all mirroring.
    fn flag_redraw(&mut self, message: String) -> Result<ToolOutcome, ToolError> {
        self.bridge
            .set_needs_rerun(true)
            .map_err(|e| ToolError::internal(e.to_string()))?;
        Ok(ToolOutcome::changed(message))
    }

    fn list_models(&self) -> String {
        let models = self.catalog.list_models();
        let lines: Vec<String> = models.iter().map(|m| format!("  - {m}")).collect();
        format!("Available SANS models ({}):\n{}", models.len(), lines.join("\n"))
    }

    fn model_parameters(&self, model_name: &str) -> Result<String, ToolError> {
        let specs = self.catalog.get_parameters(model_name).map_err(|e| {
            ToolError::validation(format!("Error getting parameters for '{model_name}': {e}"))
        })?;
        let mut lines = vec![format!("Parameters for '{model_name}':")];
        for spec in specs {
            let mut line = format!(
                "  - {}: {} (bounds: ({}, {}))",
                spec.name, spec.default, spec.min, spec.max
            );
            if spec.polydisperse {
                line.push_str(" [polydisperse]");
            }
            if let Some(description) = &spec.description {
                line.push_str(&format!(" {description}"));
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    fn current_state(&self) -> String {
        let mut lines = vec!["Current SANS fitting state:".to_string()];
        match self.engine.data() {
            Some(data) => {
                let (q_min, q_max) = data.q_range();
                lines.push(format!(
                    "  Data: {} points, Q range [{q_min:.4}, {q_max:.4}]",
                    data.len()
                ));
            }
            None => lines.push("  Data: Not loaded".to_string()),
        }
        match self.engine.model_name() {
            Some(model) => {
                lines.push(format!("  Model: {model}"));
                lines.push(format!(
                    "  Structure factor: {}",
                    self.engine.structure_factor().unwrap_or("none")
                ));
                lines.push("  Parameters:".to_string());
                for p in self.engine.parameters().iter() {
                    lines.push(format!(
                        "    - {}: {} (bounds: ({}, {}), vary: {})",
                        p.name, p.value, p.min, p.max, p.vary
                    ));
                }
                if self.engine.polydispersity_enabled() {
                    lines.push("  Polydispersity: enabled".to_string());
                    for name in self.engine.polydisperse_parameter_names() {
                        if let Some(config) = self.engine.polydispersity(&name) {
                            lines.push(format!(
                                "    - {name}: {} width={} n={} vary={}",
                                config.distribution, config.width, config.n_points, config.vary
                            ));
                        }
                    }
                } else {
                    lines.push("  Polydispersity: disabled".to_string());
                }
            }
            None => lines.push("  Model: Not selected".to_string()),
        }
        lines.push(format!("  Fit status: {}", self.fit_status));
        lines.push(format!("  AI tools enabled: {}", self.tools_enabled()));
        lines.join("\n")
    }

    fn fit_results(&self) -> String {
        let Some(result) = self.engine.last_result() else {
            return "No fit results available. Run a fit first.".to_string();
        };
        if !self.bridge.fit_completed() {
            warn!("last fit result is stale and was not presented");
            return "No current fit results: the model or parameters changed after the last fit. Run a fit again.".to_string();
        }
        let mut lines = vec![
            "Fit Results:".to_string(),
            format!("  Reduced chi-square: {:.4}", result.chi_squared),
            "  Optimized parameters:".to_string(),
        ];
        lines.extend(fitted_lines(result).into_iter().map(|line| format!("  {line}")));
        lines.join("\n")
    }

    fn tool_set_model(&mut self, model_name: &str) -> Result<ToolOutcome, ToolError> {
        if !self.catalog.has_model(model_name) {
            return Err(ToolError::validation(format!(
                "Unknown model '{model_name}'. Use list-sans-models to see available models."
            )));
        }
        let parameters = self
            .engine
            .set_model(model_name)
            .map_err(|e| ToolError::domain(format!("Error setting model '{model_name}': {e}")))?;
        self.mirror_model_selected(model_name)
            .map_err(|e| ToolError::internal(e.to_string()))?;
        self.flag_redraw(format!(
            "Model '{model_name}' loaded successfully.\nParameters: {}",
            parameters.names().join(", ")
        ))
    }

    fn validate_update(&self, name: &str, update: &ParameterUpdate) -> Result<(), ToolError> {
        let Some(parameter) = self.engine.parameters().get(name) else {
            return Err(ToolError::validation(format!(
                "Parameter '{name}' not found. Available: {}",
                self.engine.parameters().names().join(", ")
            )));
        };
        if update.is_empty() {
            return Err(ToolError::validation(format!(
                "No changes supplied for parameter '{name}'. Provide value, min, max or vary."
            )));
        }
        let min = update.min.unwrap_or(parameter.min);
        let max = update.max.unwrap_or(parameter.max);
        if min > max {
            return Err(ToolError::validation(format!(
                "Invalid bounds for '{name}': min {min} exceeds max {max}"
            )));
        }
        Ok(())
    }

    fn tool_set_parameter(
        &mut self,
        name: &str,
        update: ParameterUpdate,
    ) -> Result<ToolOutcome, ToolError> {
        if self.engine.model_name().is_none() {
            return Err(ToolError::validation(
                "No model selected. Set a model before changing parameters.",
            ));
        }
        self.validate_update(name, &update)?;
        self.engine
            .update_parameter(name, &update)
            .map_err(|e| ToolError::domain(format!("Error setting parameter '{name}': {e}")))?;
        self.bridge
            .set_parameter_widget(name, &update)
            .and_then(|_| self.bridge.set_fit_completed(false))
            .map_err(|e| ToolError::internal(e.to_string()))?;
        self.flag_redraw(format!("Parameter '{name}' updated: {}", update.describe()))
    }

    fn tool_set_multiple(
        &mut self,
        updates: BTreeMap<String, ParameterUpdate>,
    ) -> Result<ToolOutcome, ToolError> {
        if self.engine.model_name().is_none() {
            return Err(ToolError::validation(
                "No model selected. Set a model before changing parameters.",
            ));
        }
        if updates.is_empty() {
            return Err(ToolError::validation("No parameters supplied."));
        }
        let unknown: Vec<&str> = updates
            .keys()
            .filter(|name| !self.engine.parameters().contains(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(ToolError::validation(format!(
                "Parameters not found: {}. Available: {}",
                unknown.join(", "),
                self.engine.parameters().names().join(", ")
            )));
        }
        for (name, update) in &updates {
            self.validate_update(name, update)?;
        }

        let pending: Vec<(String, ParameterUpdate)> = updates.into_iter().collect();
        self.apply_updates(&pending)
            .map_err(|e| ToolError::domain(format!("Error setting parameters: {e}")))?;

        let mut lines = Vec::with_capacity(pending.len());
        for (name, update) in &pending {
            self.bridge
                .set_parameter_widget(name, update)
                .map_err(|e| ToolError::internal(e.to_string()))?;
            lines.push(format!("  - {name}: {}", update.describe()));
        }
        self.bridge
            .set_fit_completed(false)
            .map_err(|e| ToolError::internal(e.to_string()))?;
        self.flag_redraw(format!("Parameters updated:\n{}", lines.join("\n")))
    }

    fn tool_enable_polydispersity(
        &mut self,
        parameter_name: &str,
        distribution: Distribution,
        width: f64,
    ) -> Result<ToolOutcome, ToolError> {
        if !self
            .engine
            .polydisperse_parameter_names()
            .contains(parameter_name)
        {
            return Err(ToolError::validation(format!(
                "Polydispersity parameter '{parameter_name}_pd' not found. This model may not support PD for '{parameter_name}'."
            )));
        }
        if !width.is_finite() || width < 0.0 {
            return Err(ToolError::validation(format!(
                "Polydispersity width must be a non-negative number, got {width}"
            )));
        }
        let n_points = self
            .engine
            .polydispersity(parameter_name)
            .map_or(DEFAULT_PD_POINTS, |config| config.n_points);
        self.engine
            .set_polydispersity(PolydispersityConfig {
                parameter_name: parameter_name.to_string(),
                width,
                distribution,
                n_points,
                vary: true,
            })
            .map_err(|e| ToolError::domain(format!("Error enabling polydispersity: {e}")))?;
        self.engine.enable_polydispersity(true);

        self.bridge
            .set_pd_enabled(true)
            .and_then(|_| {
                self.bridge.set_pd_widget(
                    parameter_name,
                    &PdWidgetUpdate {
                        width: Some(width),
                        distribution: Some(distribution),
                        vary: Some(true),
                        ..PdWidgetUpdate::default()
                    },
                )
            })
            .and_then(|_| self.bridge.set_fit_completed(false))
            .map_err(|e| ToolError::internal(e.to_string()))?;
        self.flag_redraw(format!(
            "Polydispersity enabled for '{parameter_name}': {distribution} distribution, width={width}"
        ))
    }

    fn tool_set_structure_factor(&mut self, sf_name: &str) -> Result<ToolOutcome, ToolError> {
        if self.engine.model_name().is_none() {
            return Err(ToolError::validation(
                "No model selected. Set a model before adding a structure factor.",
            ));
        }
        if !self.catalog.has_structure_factor(sf_name) {
            return Err(ToolError::validation(format!(
                "Unknown structure factor '{sf_name}'. Available: {}",
                self.catalog.list_structure_factors().join(", ")
            )));
        }
        let before = self.engine.parameters().names();
        self.engine
            .set_structure_factor(sf_name)
            .map_err(|e| ToolError::domain(format!("Error setting structure factor: {e}")))?;
        let added: Vec<String> = self
            .engine
            .parameters()
            .names()
            .into_iter()
            .filter(|name| !before.contains(name))
            .collect();

        self.bridge
            .clear_parameter_widgets()
            .and_then(|_| self.bridge.set_fit_completed(false))
            .map_err(|e| ToolError::internal(e.to_string()))?;
        let detail = if added.is_empty() {
            String::new()
        } else {
            format!(" Additional parameters: {}", added.join(", "))
        };
        self.flag_redraw(format!("Structure factor '{sf_name}' added.{detail}"))
    }

    fn tool_remove_structure_factor(&mut self) -> Result<ToolOutcome, ToolError> {
        if self.engine.model_name().is_none() {
            return Err(ToolError::validation("No model selected."));
        }
        if self.engine.structure_factor().is_none() {
            return Err(ToolError::validation("No structure factor is active."));
        }
        self.engine
            .remove_structure_factor()
            .map_err(|e| ToolError::domain(format!("Error removing structure factor: {e}")))?;
        self.bridge
            .clear_parameter_widgets()
            .and_then(|_| self.bridge.set_fit_completed(false))
            .map_err(|e| ToolError::internal(e.to_string()))?;
        self.flag_redraw("Structure factor removed.".to_string())
    }

    fn tool_run_fit(&mut self) -> Result<ToolOutcome, ToolError> {
        self.fit_precondition().map_err(ToolError::validation)?;
        let result = self
            .execute_fit()
            .map_err(|e| ToolError::domain(format!("Fit failed: {e}")))?;
        self.mirror_fit(&result)
            .map_err(|e| ToolError::internal(e.to_string()))?;

        let mut lines = vec![
            "Fit completed!".to_string(),
            format!("Reduced chi-square: {:.4}", result.chi_squared),
            "Optimized parameters:".to_string(),
        ];
        lines.extend(fitted_lines(&result));
        self.flag_redraw(lines.join("\n"))
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
