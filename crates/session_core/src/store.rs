//! Flat, string-keyed widget state read by every render pass.
//!
//! The store is only reachable for writing through [`crate::StateBridge`].
//! It also tracks the open render pass so that a key whose widget has
//! already been drawn in that pass cannot be written again.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::Serialize;

use crate::error::BridgeError;

pub const MODEL_SELECTED: &str = "model_selected";
pub const FIT_COMPLETED: &str = "fit_completed";
pub const NEEDS_RERUN: &str = "needs_rerun";
pub const CURRENT_MODEL: &str = "current_model";
pub const PD_ENABLED: &str = "pd_enabled";
pub const DATA_LOADED: &str = "data_loaded";
pub const AI_TOOLS_ENABLED: &str = "ai_tools_enabled";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WidgetValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl WidgetValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WidgetValue::Float(v) => Some(*v),
            WidgetValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WidgetValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WidgetValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WidgetValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for WidgetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetValue::Float(v) => write!(f, "{v}"),
            WidgetValue::Int(v) => write!(f, "{v}"),
            WidgetValue::Bool(v) => write!(f, "{v}"),
            WidgetValue::Text(v) => f.write_str(v),
        }
    }
}

/// Basic-parameter widget roles, keyed as `{role}_{parameter}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    Value,
    Min,
    Max,
    Vary,
}

impl ParamRole {
    pub const ALL: [ParamRole; 4] = [ParamRole::Value, ParamRole::Min, ParamRole::Max, ParamRole::Vary];

    pub fn prefix(self) -> &'static str {
        match self {
            ParamRole::Value => "value_",
            ParamRole::Min => "min_",
            ParamRole::Max => "max_",
            ParamRole::Vary => "vary_",
        }
    }

    pub fn key(self, parameter: &str) -> String {
        format!("{}{parameter}", self.prefix())
    }
}

/// Polydispersity widget roles, keyed as `{pd_role}_{parameter}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdRole {
    Width,
    NPoints,
    Type,
    Vary,
}

impl PdRole {
    pub const ALL: [PdRole; 4] = [PdRole::Width, PdRole::NPoints, PdRole::Type, PdRole::Vary];

    pub fn prefix(self) -> &'static str {
        match self {
            PdRole::Width => "pd_width_",
            PdRole::NPoints => "pd_n_",
            PdRole::Type => "pd_type_",
            PdRole::Vary => "pd_vary_",
        }
    }

    pub fn key(self, parameter: &str) -> String {
        format!("{}{parameter}", self.prefix())
    }
}

#[derive(Debug, Clone)]
struct OpenPass {
    number: u64,
    drawn: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WidgetStore {
    entries: BTreeMap<String, WidgetValue>,
    open_pass: Option<OpenPass>,
    passes: u64,
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&WidgetValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.keys().filter(move |key| key.starts_with(prefix))
    }

    /// Every key currently held for a basic-parameter role.
    pub fn parameter_keys(&self) -> BTreeSet<String> {
        self.keys()
            .filter(|key| is_parameter_key(key))
            .map(str::to_string)
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, WidgetValue> {
        self.entries.clone()
    }

    /// Number of render passes closed so far.
    pub fn passes_completed(&self) -> u64 {
        self.passes
    }

    pub fn pass_open(&self) -> bool {
        self.open_pass.is_some()
    }

    pub fn is_drawn(&self, key: &str) -> bool {
        self.open_pass
            .as_ref()
            .is_some_and(|pass| pass.drawn.contains(key))
    }

    fn ensure_writable(&self, key: &str) -> Result<(), BridgeError> {
        if self.is_drawn(key) {
            return Err(BridgeError::WidgetAlreadyDrawn {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn seed(&mut self, key: &str, value: WidgetValue) {
        self.entries.insert(key.to_string(), value);
    }

    pub(crate) fn write(&mut self, key: String, value: WidgetValue) -> Result<(), BridgeError> {
        self.ensure_writable(&key)?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Writes every entry or none of them.
    pub(crate) fn write_all(&mut self, entries: Vec<(String, WidgetValue)>) -> Result<(), BridgeError> {
        for (key, _) in &entries {
            self.ensure_writable(key)?;
        }
        self.entries.extend(entries);
        Ok(())
    }

    /// Removes every key matching `predicate`; refuses if any of them was drawn.
    pub(crate) fn remove_where(
        &mut self,
        predicate: impl Fn(&str) -> bool,
    ) -> Result<usize, BridgeError> {
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|key| predicate(key.as_str()))
            .cloned()
            .collect();
        for key in &doomed {
            self.ensure_writable(key)?;
        }
        for key in &doomed {
            self.entries.remove(key);
        }
        Ok(doomed.len())
    }

    pub(crate) fn begin_pass(&mut self) -> Result<u64, BridgeError> {
        if self.open_pass.is_some() {
            return Err(BridgeError::PassAlreadyOpen);
        }
        let number = self.passes + 1;
        self.open_pass = Some(OpenPass {
            number,
            drawn: BTreeSet::new(),
        });
        Ok(number)
    }

    pub(crate) fn end_pass(&mut self) -> Result<u64, BridgeError> {
        let pass = self.open_pass.take().ok_or(BridgeError::NoOpenPass)?;
        self.passes = pass.number;
        Ok(pass.number)
    }

    /// Returns the stored value of `key`, seeding it with `default` on first
    /// draw, and marks the widget drawn for the open pass.
    pub(crate) fn bind(
        &mut self,
        key: &str,
        default: impl FnOnce() -> WidgetValue,
    ) -> Result<WidgetValue, BridgeError> {
        let Some(pass) = self.open_pass.as_mut() else {
            return Err(BridgeError::NoOpenPass);
        };
        if !pass.drawn.insert(key.to_string()) {
            return Err(BridgeError::WidgetAlreadyDrawn {
                key: key.to_string(),
            });
        }
        let value = self
            .entries
            .entry(key.to_string())
            .or_insert_with(default)
            .clone();
        Ok(value)
    }
}

pub fn is_parameter_key(key: &str) -> bool {
    ParamRole::ALL
        .iter()
        .any(|role| key.starts_with(role.prefix()))
}

pub fn is_pd_key(key: &str) -> bool {
    PdRole::ALL.iter().any(|role| key.starts_with(role.prefix()))
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
