use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Catalog entry describing one parameter of a model or structure factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub polydisperse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSpec {
    pub fn new(name: &str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            default,
            min,
            max,
            polydisperse: false,
            description: None,
        }
    }

    pub fn polydisperse(mut self) -> Self {
        self.polydisperse = true;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl From<&ParameterSpec> for Parameter {
    fn from(spec: &ParameterSpec) -> Self {
        Self {
            name: spec.name.clone(),
            value: spec.default,
            min: spec.min,
            max: spec.max,
            vary: false,
            stderr: None,
            description: spec.description.clone(),
        }
    }
}

/// Partial update of one parameter. Absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vary: Option<bool>,
}

impl ParameterUpdate {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn vary(vary: bool) -> Self {
        Self {
            vary: Some(vary),
            ..Self::default()
        }
    }

    /// Full snapshot of a parameter, used to restore it after a failed batch.
    pub fn restore(parameter: &Parameter) -> Self {
        Self {
            value: Some(parameter.value),
            min: Some(parameter.min),
            max: Some(parameter.max),
            vary: Some(parameter.vary),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.min.is_none() && self.max.is_none() && self.vary.is_none()
    }

    /// Human readable list of the supplied fields, e.g. `value=50, vary=true`.
    pub fn describe(&self) -> String {
        let mut changes = Vec::new();
        if let Some(value) = self.value {
            changes.push(format!("value={value}"));
        }
        if self.min.is_some() || self.max.is_some() {
            let fmt_bound = |bound: Option<f64>| {
                bound
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "unchanged".to_string())
            };
            changes.push(format!(
                "bounds=({}, {})",
                fmt_bound(self.min),
                fmt_bound(self.max)
            ));
        }
        if let Some(vary) = self.vary {
            changes.push(format!("vary={vary}"));
        }
        if changes.is_empty() {
            "no changes".to_string()
        } else {
            changes.join(", ")
        }
    }
}

/// Ordered parameter collection of the active model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    pub fn from_specs(specs: &[ParameterSpec]) -> Self {
        Self {
            parameters: specs.iter().map(Parameter::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn any_vary(&self) -> bool {
        self.parameters.iter().any(|p| p.vary)
    }

    pub fn push(&mut self, parameter: Parameter) {
        if let Some(existing) = self.get_mut(&parameter.name) {
            *existing = parameter;
        } else {
            self.parameters.push(parameter);
        }
    }

    pub fn remove_all(&mut self, names: &[String]) {
        self.parameters.retain(|p| !names.contains(&p.name));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Gaussian,
    Lognormal,
    Schulz,
    Rectangle,
    Boltzmann,
}

impl Distribution {
    pub const ALL: [Distribution; 5] = [
        Distribution::Gaussian,
        Distribution::Lognormal,
        Distribution::Schulz,
        Distribution::Rectangle,
        Distribution::Boltzmann,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Distribution::Gaussian => "gaussian",
            Distribution::Lognormal => "lognormal",
            Distribution::Schulz => "schulz",
            Distribution::Rectangle => "rectangle",
            Distribution::Boltzmann => "boltzmann",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lower = raw.trim().to_ascii_lowercase();
        Distribution::ALL
            .into_iter()
            .find(|d| d.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "unknown distribution '{raw}'; expected one of {}",
                    Distribution::ALL.map(|d| d.as_str()).join(", ")
                )
            })
    }
}

pub const DEFAULT_PD_POINTS: u32 = 35;
pub const DEFAULT_PD_WIDTH: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolydispersityConfig {
    pub parameter_name: String,
    pub width: f64,
    pub distribution: Distribution,
    pub n_points: u32,
    pub vary: bool,
}

impl PolydispersityConfig {
    /// Monodisperse starting point for a size-like parameter.
    pub fn monodisperse(parameter_name: &str) -> Self {
        Self {
            parameter_name: parameter_name.to_string(),
            width: 0.0,
            distribution: Distribution::Gaussian,
            n_points: DEFAULT_PD_POINTS,
            vary: false,
        }
    }

    /// Name under which the fitted width is reported, e.g. `radius_pd`.
    pub fn fit_name(&self) -> String {
        pd_fit_name(&self.parameter_name)
    }
}

pub fn pd_fit_name(parameter_name: &str) -> String {
    format!("{parameter_name}_pd")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedParameter {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Reduced chi-squared of the best fit.
    pub chi_squared: f64,
    pub parameters: BTreeMap<String, FittedParameter>,
    #[serde(default)]
    pub evaluations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum FitStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed(String),
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStatus::Idle => f.write_str("idle"),
            FitStatus::Running => f.write_str("running"),
            FitStatus::Completed => f.write_str("completed"),
            FitStatus::Failed(message) => write!(f, "failed ({message})"),
        }
    }
}
