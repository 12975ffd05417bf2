//! Typed access to the widget store.
//!
//! Every non-widget write goes through [`StateBridge`], which owns the key
//! naming convention and clamps numeric values to something the display can
//! always show. Out-of-range numbers are clamped, never rejected.

use shared::domain::{Distribution, ParameterUpdate};
use tracing::{debug, warn};

use crate::{
    error::BridgeError,
    store::{
        is_parameter_key, is_pd_key, ParamRole, PdRole, WidgetStore, WidgetValue,
        AI_TOOLS_ENABLED, CURRENT_MODEL, DATA_LOADED, FIT_COMPLETED, MODEL_SELECTED, NEEDS_RERUN,
        PD_ENABLED,
    },
};

/// Largest magnitude written to the store.
pub const DISPLAY_LIMIT: f64 = 1e300;
pub const PD_WIDTH_RANGE: (f64, f64) = (0.0, 1.0);
pub const PD_POINTS_RANGE: (i64, i64) = (5, 100);

/// Clamps `value` to the displayable range, rounded to 12 significant digits.
pub fn clamp_for_display(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let bounded = value.clamp(-DISPLAY_LIMIT, DISPLAY_LIMIT);
    format!("{bounded:.11e}").parse::<f64>().unwrap_or(bounded)
}

fn clamp_logged(key: &str, value: f64, lo: f64, hi: f64) -> f64 {
    let clamped = clamp_for_display(value).clamp(lo, hi);
    if !value.is_finite() || value < lo || value > hi {
        warn!(key = %key, original = value, clamped, "value clamped for display");
    } else if clamped != value {
        debug!(key = %key, original = value, clamped, "value rounded for display");
    }
    clamped
}

fn display_float(key: &str, value: f64) -> WidgetValue {
    WidgetValue::Float(clamp_logged(key, value, -DISPLAY_LIMIT, DISPLAY_LIMIT))
}

/// Clamp applied to `pd_width_*` keys.
pub fn clamp_pd_width(value: f64) -> f64 {
    clamp_for_display(value).clamp(PD_WIDTH_RANGE.0, PD_WIDTH_RANGE.1)
}

fn pd_width(key: &str, value: f64) -> WidgetValue {
    WidgetValue::Float(clamp_logged(key, value, PD_WIDTH_RANGE.0, PD_WIDTH_RANGE.1))
}

fn pd_points(key: &str, value: i64) -> WidgetValue {
    let clamped = value.clamp(PD_POINTS_RANGE.0, PD_POINTS_RANGE.1);
    if clamped != value {
        warn!(key = %key, original = value, clamped, "value clamped for display");
    }
    WidgetValue::Int(clamped)
}

fn checked_name(name: &str) -> Result<&str, BridgeError> {
    if name.trim().is_empty() {
        return Err(BridgeError::MalformedKey);
    }
    Ok(name)
}

/// Partial update of one parameter's polydispersity widgets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdWidgetUpdate {
    pub width: Option<f64>,
    pub n_points: Option<u32>,
    pub distribution: Option<Distribution>,
    pub vary: Option<bool>,
}

/// Polydispersity widgets of one parameter as currently held in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PdWidgets {
    pub width: Option<f64>,
    pub n_points: Option<i64>,
    pub distribution: Option<String>,
    pub vary: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct StateBridge {
    store: WidgetStore,
    redraw_requests: u64,
}

impl StateBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh session store with the AI tools switch seeded.
    pub fn with_tools_enabled(enabled: bool) -> Self {
        let mut store = WidgetStore::new();
        store.seed(AI_TOOLS_ENABLED, WidgetValue::Bool(enabled));
        Self {
            store,
            redraw_requests: 0,
        }
    }

    pub fn store(&self) -> &WidgetStore {
        &self.store
    }

    fn write(&mut self, key: String, value: WidgetValue) -> Result<(), BridgeError> {
        debug!(key = %key, value = %value, "widget store write");
        self.store.write(key, value)
    }

    fn flag(&self, key: &str) -> bool {
        self.store
            .get(key)
            .and_then(WidgetValue::as_bool)
            .unwrap_or(false)
    }

    fn float(&self, key: &str) -> Option<f64> {
        self.store.get(key).and_then(WidgetValue::as_f64)
    }

    pub fn set_parameter_value(&mut self, name: &str, value: f64) -> Result<(), BridgeError> {
        let key = ParamRole::Value.key(checked_name(name)?);
        let value = display_float(&key, value);
        self.write(key, value)
    }

    pub fn set_parameter_bounds(
        &mut self,
        name: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), BridgeError> {
        let name = checked_name(name)?;
        let mut staged = Vec::with_capacity(2);
        if let Some(min) = min {
            let key = ParamRole::Min.key(name);
            staged.push((key.clone(), display_float(&key, min)));
        }
        if let Some(max) = max {
            let key = ParamRole::Max.key(name);
            staged.push((key.clone(), display_float(&key, max)));
        }
        self.store.write_all(staged)
    }

    pub fn set_parameter_vary(&mut self, name: &str, vary: bool) -> Result<(), BridgeError> {
        let key = ParamRole::Vary.key(checked_name(name)?);
        self.write(key, WidgetValue::Bool(vary))
    }

    /// Writes only the supplied fields, all of them or none.
    pub fn set_parameter_widget(
        &mut self,
        name: &str,
        update: &ParameterUpdate,
    ) -> Result<(), BridgeError> {
        let name = checked_name(name)?;
        let mut staged = Vec::with_capacity(4);
        for (role, value) in [
            (ParamRole::Value, update.value),
            (ParamRole::Min, update.min),
            (ParamRole::Max, update.max),
        ] {
            if let Some(value) = value {
                let key = role.key(name);
                staged.push((key.clone(), display_float(&key, value)));
            }
        }
        if let Some(vary) = update.vary {
            staged.push((ParamRole::Vary.key(name), WidgetValue::Bool(vary)));
        }
        debug!(parameter = name, fields = staged.len(), "parameter widgets staged");
        self.store.write_all(staged)
    }

    /// Current basic-parameter widget values of `name`, as a partial update.
    pub fn parameter_widget(&self, name: &str) -> ParameterUpdate {
        ParameterUpdate {
            value: self.float(&ParamRole::Value.key(name)),
            min: self.float(&ParamRole::Min.key(name)),
            max: self.float(&ParamRole::Max.key(name)),
            vary: self
                .store
                .get(&ParamRole::Vary.key(name))
                .and_then(WidgetValue::as_bool),
        }
    }

    pub fn parameter_value(&self, name: &str) -> Option<f64> {
        self.float(&ParamRole::Value.key(name))
    }

    /// Removes every basic-parameter widget key.
    pub fn clear_parameter_widgets(&mut self) -> Result<usize, BridgeError> {
        let removed = self.store.remove_where(is_parameter_key)?;
        debug!(removed, "parameter widgets cleared");
        Ok(removed)
    }

    pub fn set_pd_enabled(&mut self, enabled: bool) -> Result<(), BridgeError> {
        self.write(PD_ENABLED.to_string(), WidgetValue::Bool(enabled))
    }

    pub fn pd_enabled(&self) -> bool {
        self.flag(PD_ENABLED)
    }

    pub fn set_pd_widget(&mut self, name: &str, update: &PdWidgetUpdate) -> Result<(), BridgeError> {
        let name = checked_name(name)?;
        let mut staged = Vec::with_capacity(4);
        if let Some(width) = update.width {
            let key = PdRole::Width.key(name);
            staged.push((key.clone(), pd_width(&key, width)));
        }
        if let Some(n_points) = update.n_points {
            let key = PdRole::NPoints.key(name);
            staged.push((key.clone(), pd_points(&key, i64::from(n_points))));
        }
        if let Some(distribution) = update.distribution {
            staged.push((
                PdRole::Type.key(name),
                WidgetValue::Text(distribution.as_str().to_string()),
            ));
        }
        if let Some(vary) = update.vary {
            staged.push((PdRole::Vary.key(name), WidgetValue::Bool(vary)));
        }
        self.store.write_all(staged)
    }

    pub fn pd_widget(&self, name: &str) -> PdWidgets {
        PdWidgets {
            width: self.float(&PdRole::Width.key(name)),
            n_points: self
                .store
                .get(&PdRole::NPoints.key(name))
                .and_then(WidgetValue::as_i64),
            distribution: self
                .store
                .get(&PdRole::Type.key(name))
                .and_then(WidgetValue::as_str)
                .map(str::to_string),
            vary: self
                .store
                .get(&PdRole::Vary.key(name))
                .and_then(WidgetValue::as_bool),
        }
    }

    /// Removes every polydispersity widget key and the master toggle.
    pub fn clear_pd_widgets(&mut self) -> Result<usize, BridgeError> {
        let removed = self
            .store
            .remove_where(|key| is_pd_key(key) || key == PD_ENABLED)?;
        debug!(removed, "polydispersity widgets cleared");
        Ok(removed)
    }

    pub fn set_current_model(&mut self, name: &str) -> Result<(), BridgeError> {
        let name = checked_name(name)?;
        self.write(CURRENT_MODEL.to_string(), WidgetValue::Text(name.to_string()))
    }

    pub fn current_model(&self) -> Option<&str> {
        self.store.get(CURRENT_MODEL).and_then(WidgetValue::as_str)
    }

    pub fn set_model_selected(&mut self, selected: bool) -> Result<(), BridgeError> {
        self.write(MODEL_SELECTED.to_string(), WidgetValue::Bool(selected))
    }

    pub fn model_selected(&self) -> bool {
        self.flag(MODEL_SELECTED)
    }

    pub fn set_fit_completed(&mut self, completed: bool) -> Result<(), BridgeError> {
        self.write(FIT_COMPLETED.to_string(), WidgetValue::Bool(completed))
    }

    pub fn fit_completed(&self) -> bool {
        self.flag(FIT_COMPLETED)
    }

    pub fn set_needs_rerun(&mut self, needs_rerun: bool) -> Result<(), BridgeError> {
        self.write(NEEDS_RERUN.to_string(), WidgetValue::Bool(needs_rerun))?;
        if needs_rerun {
            self.redraw_requests += 1;
        }
        Ok(())
    }

    /// Number of times a redraw has been requested over the session.
    pub fn redraw_requests(&self) -> u64 {
        self.redraw_requests
    }

    pub fn needs_rerun(&self) -> bool {
        self.flag(NEEDS_RERUN)
    }

    /// Reads and clears the redraw flag.
    pub fn take_needs_rerun(&mut self) -> Result<bool, BridgeError> {
        let needs_rerun = self.needs_rerun();
        if needs_rerun {
            self.set_needs_rerun(false)?;
        }
        Ok(needs_rerun)
    }

    pub fn set_data_loaded(&mut self, loaded: bool) -> Result<(), BridgeError> {
        self.write(DATA_LOADED.to_string(), WidgetValue::Bool(loaded))
    }

    pub fn data_loaded(&self) -> bool {
        self.flag(DATA_LOADED)
    }

    pub fn set_tools_enabled(&mut self, enabled: bool) -> Result<(), BridgeError> {
        self.write(AI_TOOLS_ENABLED.to_string(), WidgetValue::Bool(enabled))
    }

    pub fn tools_enabled(&self) -> bool {
        self.flag(AI_TOOLS_ENABLED)
    }

    /// Direct widget interaction between passes. Numbers are clamped like
    /// any other write.
    pub fn user_input(&mut self, key: &str, value: WidgetValue) -> Result<(), BridgeError> {
        if key.trim().is_empty() {
            return Err(BridgeError::MalformedKey);
        }
        let value = match value {
            WidgetValue::Float(v) if key.starts_with(PdRole::Width.prefix()) => pd_width(key, v),
            WidgetValue::Float(v) => display_float(key, v),
            WidgetValue::Int(v) if key.starts_with(PdRole::NPoints.prefix()) => pd_points(key, v),
            other => other,
        };
        self.write(key.to_string(), value)
    }

    pub fn pass_open(&self) -> bool {
        self.store.pass_open()
    }

    pub fn begin_pass(&mut self) -> Result<u64, BridgeError> {
        let number = self.store.begin_pass()?;
        debug!(pass = number, "render pass opened");
        Ok(number)
    }

    pub fn end_pass(&mut self) -> Result<u64, BridgeError> {
        let number = self.store.end_pass()?;
        debug!(pass = number, "render pass closed");
        Ok(number)
    }

    /// Draws a numeric widget: the stored value if present, else the clamped default.
    pub fn bind_float(&mut self, key: &str, default: f64) -> Result<f64, BridgeError> {
        let value = self.store.bind(key, || {
            if key.starts_with(PdRole::Width.prefix()) {
                pd_width(key, default)
            } else {
                display_float(key, default)
            }
        })?;
        Ok(value.as_f64().unwrap_or(default))
    }

    pub fn bind_int(&mut self, key: &str, default: i64) -> Result<i64, BridgeError> {
        let value = self.store.bind(key, || {
            if key.starts_with(PdRole::NPoints.prefix()) {
                pd_points(key, default)
            } else {
                WidgetValue::Int(default)
            }
        })?;
        Ok(value.as_i64().unwrap_or(default))
    }

    pub fn bind_bool(&mut self, key: &str, default: bool) -> Result<bool, BridgeError> {
        let value = self.store.bind(key, || WidgetValue::Bool(default))?;
        Ok(value.as_bool().unwrap_or(default))
    }

    pub fn bind_text(&mut self, key: &str, default: &str) -> Result<String, BridgeError> {
        let value = self
            .store
            .bind(key, || WidgetValue::Text(default.to_string()))?;
        Ok(value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
