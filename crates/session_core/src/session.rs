//! The fitting session: engine, widget bridge, fit status and chat history,
//! plus the human path that edits widgets and applies them to the domain.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use fit_engine::{Dataset, EngineError, FittingEngine, ModelCatalog};
use shared::{
    domain::{
        pd_fit_name, Distribution, FitResult, FitStatus, ParameterSet, ParameterUpdate,
        PolydispersityConfig,
    },
    protocol::ChatEntry,
};
use tracing::{info, warn};

use crate::{
    bridge::{clamp_for_display, clamp_pd_width, PdWidgetUpdate, StateBridge},
    error::{BridgeError, SessionError},
    store::{ParamRole, PdRole, WidgetValue, AI_TOOLS_ENABLED, PD_ENABLED},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub tools_enabled: bool,
    pub fit_warn_after: Duration,
    pub max_tool_rounds: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tools_enabled: false,
            fit_warn_after: Duration::from_secs(5),
            max_tool_rounds: 10,
        }
    }
}

/// Vary presets offered next to the parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaryPreset {
    FitScaleBackground,
    FitAll,
    FixAll,
}

impl VaryPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            VaryPreset::FitScaleBackground => "fit-scale-background",
            VaryPreset::FitAll => "fit-all",
            VaryPreset::FixAll => "fix-all",
        }
    }

    fn vary(self, parameter: &str) -> bool {
        match self {
            VaryPreset::FitScaleBackground => matches!(parameter, "scale" | "background"),
            VaryPreset::FitAll => true,
            VaryPreset::FixAll => false,
        }
    }
}

impl std::str::FromStr for VaryPreset {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        [VaryPreset::FitScaleBackground, VaryPreset::FitAll, VaryPreset::FixAll]
            .into_iter()
            .find(|preset| preset.as_str() == raw)
            .ok_or_else(|| {
                format!("unknown preset '{raw}'; expected fit-scale-background, fit-all or fix-all")
            })
    }
}

/// One fitting session: the engine owning the domain model, the widget
/// store behind its bridge, fit status and chat history.
pub struct FitSession<E> {
    pub(crate) engine: E,
    pub(crate) catalog: Arc<dyn ModelCatalog>,
    pub(crate) bridge: StateBridge,
    pub(crate) settings: SessionSettings,
    pub(crate) fit_status: FitStatus,
    pub(crate) history: Vec<ChatEntry>,
}

impl<E: FittingEngine> FitSession<E> {
    pub fn new(engine: E, catalog: Arc<dyn ModelCatalog>, settings: SessionSettings) -> Self {
        Self {
            engine,
            catalog,
            bridge: StateBridge::with_tools_enabled(settings.tools_enabled),
            settings,
            fit_status: FitStatus::Idle,
            history: Vec::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn catalog(&self) -> &dyn ModelCatalog {
        self.catalog.as_ref()
    }

    pub fn bridge(&self) -> &StateBridge {
        &self.bridge
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn fit_status(&self) -> &FitStatus {
        &self.fit_status
    }

    pub fn history(&self) -> &[ChatEntry] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn tools_enabled(&self) -> bool {
        self.bridge.tools_enabled()
    }

    pub fn set_tools_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.bridge.set_tools_enabled(enabled)?;
        info!(enabled, "AI tools switch changed");
        Ok(())
    }

    fn ensure_between_passes(&self) -> Result<(), BridgeError> {
        if self.bridge.pass_open() {
            return Err(BridgeError::PassAlreadyOpen);
        }
        Ok(())
    }

    /// Direct widget edit by the human. Only widgets the panel actually
    /// shows can be edited; global flags stay with the bridge setters.
    pub fn user_input(&mut self, key: &str, value: WidgetValue) -> Result<(), SessionError> {
        if !key.trim().is_empty() && !self.is_editable_key(key) {
            warn!(key = %key, "edit refused: no such widget");
            return Err(SessionError::InvalidInput {
                key: key.to_string(),
                reason: "not an editable widget of the current model".to_string(),
            });
        }
        self.bridge.user_input(key, value)?;
        Ok(())
    }

    fn is_editable_key(&self, key: &str) -> bool {
        if key == PD_ENABLED || key == AI_TOOLS_ENABLED {
            return true;
        }
        let parameters = self.engine.parameters();
        let basic = parameters
            .iter()
            .any(|p| ParamRole::ALL.iter().any(|role| role.key(&p.name) == key));
        basic
            || self
                .engine
                .polydisperse_parameter_names()
                .iter()
                .any(|name| PdRole::ALL.iter().any(|role| role.key(name) == key))
    }

    pub fn select_model(&mut self, model_name: &str) -> Result<ParameterSet, SessionError> {
        self.ensure_between_passes()?;
        let parameters = self.engine.set_model(model_name)?;
        self.mirror_model_selected(model_name)?;
        self.bridge.set_needs_rerun(true)?;
        Ok(parameters)
    }

    pub fn load_data(&mut self, data: Dataset) -> Result<(), SessionError> {
        self.ensure_between_passes()?;
        self.engine.load_data(data);
        self.bridge.set_data_loaded(true)?;
        self.bridge.set_fit_completed(false)?;
        self.bridge.set_needs_rerun(true)?;
        Ok(())
    }

    /// Applies the basic-parameter widget table to the domain model. Either
    /// every edited parameter is applied or none is.
    pub fn apply_parameter_edits(&mut self) -> Result<usize, SessionError> {
        self.ensure_between_passes()?;
        let mut pending = Vec::new();
        for parameter in self.engine.parameters().iter() {
            let widget = self.bridge.parameter_widget(&parameter.name);
            let update = ParameterUpdate {
                value: widget.value.filter(|v| *v != clamp_for_display(parameter.value)),
                min: widget.min.filter(|v| *v != clamp_for_display(parameter.min)),
                max: widget.max.filter(|v| *v != clamp_for_display(parameter.max)),
                vary: widget.vary.filter(|v| *v != parameter.vary),
            };
            if update.is_empty() {
                continue;
            }
            let min = update.min.unwrap_or(parameter.min);
            let max = update.max.unwrap_or(parameter.max);
            if min > max {
                return Err(SessionError::InvalidInput {
                    key: parameter.name.clone(),
                    reason: format!("min {min} exceeds max {max}"),
                });
            }
            pending.push((parameter.name.clone(), update));
        }

        self.apply_updates(&pending)?;
        if !pending.is_empty() {
            self.bridge.set_fit_completed(false)?;
            info!(changed = pending.len(), "parameter edits applied");
        }
        Ok(pending.len())
    }

    /// Applies the polydispersity widget table, honouring the `pd_enabled`
    /// master toggle.
    pub fn apply_pd_edits(&mut self) -> Result<usize, SessionError> {
        self.ensure_between_passes()?;
        let enabled = self.bridge.pd_enabled();
        let mut configs = Vec::new();
        for name in self.engine.polydisperse_parameter_names() {
            let widgets = self.bridge.pd_widget(&name);
            let current = self
                .engine
                .polydispersity(&name)
                .cloned()
                .unwrap_or_else(|| PolydispersityConfig::monodisperse(&name));
            let distribution = match widgets.distribution.as_deref() {
                Some(raw) => raw
                    .parse::<Distribution>()
                    .map_err(|reason| SessionError::InvalidInput {
                        key: PdRole::Type.key(&name),
                        reason,
                    })?,
                None => current.distribution,
            };
            let n_points = match widgets.n_points {
                Some(n) => u32::try_from(n).map_err(|_| SessionError::InvalidInput {
                    key: PdRole::NPoints.key(&name),
                    reason: format!("{n} is not a valid number of points"),
                })?,
                None => current.n_points,
            };
            let config = PolydispersityConfig {
                parameter_name: name.clone(),
                width: widgets
                    .width
                    .filter(|w| *w != clamp_pd_width(current.width))
                    .unwrap_or(current.width),
                distribution,
                n_points,
                vary: widgets.vary.unwrap_or(current.vary),
            };
            if config != current {
                configs.push((current, config));
            }
        }

        let mut applied: Vec<PolydispersityConfig> = Vec::new();
        for (previous, config) in &configs {
            if let Err(err) = self.engine.set_polydispersity(config.clone()) {
                for restore in applied.into_iter().rev() {
                    if let Err(restore_err) = self.engine.set_polydispersity(restore) {
                        warn!(error = %restore_err, "failed to restore polydispersity config");
                    }
                }
                return Err(err.into());
            }
            applied.push(previous.clone());
        }

        let toggled = self.engine.polydispersity_enabled() != enabled;
        self.engine.enable_polydispersity(enabled);
        if toggled || !configs.is_empty() {
            self.bridge.set_fit_completed(false)?;
            info!(enabled, changed = configs.len(), "polydispersity edits applied");
        }
        Ok(configs.len())
    }

    /// Sets `vary` for every parameter per `preset`, in the domain and the widgets.
    pub fn apply_preset(&mut self, preset: VaryPreset) -> Result<(), SessionError> {
        self.ensure_between_passes()?;
        let pending: Vec<(String, ParameterUpdate)> = self
            .engine
            .parameters()
            .iter()
            .map(|p| (p.name.clone(), ParameterUpdate::vary(preset.vary(&p.name))))
            .collect();
        self.apply_updates(&pending)?;
        for (name, update) in &pending {
            self.bridge.set_parameter_widget(name, update)?;
        }
        self.bridge.set_fit_completed(false)?;
        self.bridge.set_needs_rerun(true)?;
        info!(preset = preset.as_str(), "vary preset applied");
        Ok(())
    }

    pub fn run_fit(&mut self) -> Result<FitResult, SessionError> {
        self.ensure_between_passes()?;
        self.fit_precondition().map_err(SessionError::NotReady)?;
        let result = self.execute_fit()?;
        self.mirror_fit(&result)?;
        self.bridge.set_needs_rerun(true)?;
        Ok(result)
    }

    /// Applies every update, restoring the already-applied ones if any fails.
    pub(crate) fn apply_updates(
        &mut self,
        updates: &[(String, ParameterUpdate)],
    ) -> Result<(), EngineError> {
        let mut applied: Vec<(String, ParameterUpdate)> = Vec::with_capacity(updates.len());
        for (name, update) in updates {
            let snapshot = self.engine.parameters().get(name).map(ParameterUpdate::restore);
            if let Err(err) = self.engine.update_parameter(name, update) {
                for (restore_name, restore) in applied.iter().rev() {
                    if let Err(restore_err) = self.engine.update_parameter(restore_name, restore) {
                        warn!(parameter = %restore_name, error = %restore_err, "rollback failed");
                    }
                }
                return Err(err);
            }
            if let Some(snapshot) = snapshot {
                applied.push((name.clone(), snapshot));
            }
        }
        Ok(())
    }

    /// Runs the engine fit, timing it and tracking [`FitStatus`].
    pub(crate) fn execute_fit(&mut self) -> Result<FitResult, EngineError> {
        self.fit_status = FitStatus::Running;
        let started = Instant::now();
        let outcome = self.engine.fit();
        let elapsed = started.elapsed();
        if elapsed > self.settings.fit_warn_after {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.settings.fit_warn_after.as_millis() as u64,
                "fit was slow"
            );
        }
        match &outcome {
            Ok(result) => {
                self.fit_status = FitStatus::Completed;
                info!(
                    chi_squared = result.chi_squared,
                    evaluations = result.evaluations,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "fit completed"
                );
            }
            Err(err) => {
                self.fit_status = FitStatus::Failed(err.to_string());
            }
        }
        outcome
    }

    pub(crate) fn mirror_model_selected(&mut self, model_name: &str) -> Result<(), BridgeError> {
        self.bridge.clear_parameter_widgets()?;
        self.bridge.clear_pd_widgets()?;
        self.bridge.set_current_model(model_name)?;
        self.bridge.set_model_selected(true)?;
        self.bridge.set_fit_completed(false)
    }

    /// Shows fitted numbers for every varied parameter and polydispersity width.
    pub(crate) fn mirror_fit(&mut self, result: &FitResult) -> Result<(), BridgeError> {
        self.bridge.set_fit_completed(true)?;
        let varied: Vec<String> = self
            .engine
            .parameters()
            .iter()
            .filter(|p| p.vary)
            .map(|p| p.name.clone())
            .collect();
        for name in varied {
            if let Some(fitted) = result.parameters.get(&name) {
                self.bridge.set_parameter_value(&name, fitted.value)?;
            }
        }
        for name in self.engine.polydisperse_parameter_names() {
            if let Some(fitted) = result.parameters.get(&pd_fit_name(&name)) {
                self.bridge.set_pd_widget(
                    &name,
                    &PdWidgetUpdate {
                        width: Some(fitted.value),
                        ..PdWidgetUpdate::default()
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Whether a fit may run: data, a model and something to vary.
    pub(crate) fn fit_precondition(&self) -> Result<(), &'static str> {
        if self.engine.data().is_none() {
            return Err("No data loaded. Load data before running a fit.");
        }
        if self.engine.model_name().is_none() {
            return Err("No model selected. Set a model before running a fit.");
        }
        let pd_varies = self.engine.polydispersity_enabled()
            && self
                .engine
                .polydisperse_parameter_names()
                .iter()
                .filter_map(|name| self.engine.polydispersity(name))
                .any(|config| config.vary);
        if !self.engine.parameters().any_vary() && !pd_varies {
            return Err(
                "No parameters are set to vary. Set vary=true on at least one parameter before fitting.",
            );
        }
        Ok(())
    }

    /// Text block describing the session, prepended to chat messages.
    pub fn state_context(&self) -> String {
        let mut lines = Vec::new();
        match self.engine.data() {
            Some(data) => {
                let (q_min, q_max) = data.q_range();
                lines.push(format!(
                    "Data loaded: {} points, Q range [{q_min:.4}, {q_max:.4}]",
                    data.len()
                ));
            }
            None => lines.push("No data loaded".to_string()),
        }
        match self.engine.model_name() {
            Some(model) => {
                lines.push(format!("Current model: {model}"));
                if let Some(sf) = self.engine.structure_factor() {
                    lines.push(format!("Structure factor: {sf}"));
                }
                let parameters: Vec<String> = self
                    .engine
                    .parameters()
                    .iter()
                    .map(|p| format!("  {}: {} (vary: {})", p.name, p.value, p.vary))
                    .collect();
                if !parameters.is_empty() {
                    lines.push(format!("Parameters:\n{}", parameters.join("\n")));
                }
            }
            None => lines.push("No model selected".to_string()),
        }
        if self.bridge.fit_completed() {
            if let Some(result) = self.engine.last_result() {
                lines.push(format!("Last fit chi-square: {:.4}", result.chi_squared));
            }
        }
        lines.push(format!("AI tools enabled: {}", self.tools_enabled()));
        lines.join("\n")
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
