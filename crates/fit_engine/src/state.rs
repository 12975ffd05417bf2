use std::collections::{BTreeMap, BTreeSet};

use shared::domain::{
    pd_fit_name, FitResult, Parameter, ParameterSet, ParameterUpdate, PolydispersityConfig,
};
use tracing::{debug, info};

use crate::{data::Dataset, EngineError, ModelCatalog};

/// In-memory domain model shared by engine implementations.
///
/// Every mutator validates its whole input before touching any field, so a
/// returned error always leaves the state exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    model_name: Option<String>,
    parameters: ParameterSet,
    polydisperse: BTreeSet<String>,
    pd_configs: BTreeMap<String, PolydispersityConfig>,
    pd_enabled: bool,
    structure_factor: Option<String>,
    sf_parameters: Vec<String>,
    data: Option<Dataset>,
    last_result: Option<FitResult>,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_model(
        &mut self,
        catalog: &dyn ModelCatalog,
        model_name: &str,
    ) -> Result<ParameterSet, EngineError> {
        let specs = catalog.get_parameters(model_name)?;

        self.parameters = ParameterSet::from_specs(&specs);
        self.polydisperse = specs
            .iter()
            .filter(|spec| spec.polydisperse)
            .map(|spec| spec.name.clone())
            .collect();
        self.pd_configs = self
            .polydisperse
            .iter()
            .map(|name| (name.clone(), PolydispersityConfig::monodisperse(name)))
            .collect();
        self.pd_enabled = false;
        self.structure_factor = None;
        self.sf_parameters.clear();
        self.model_name = Some(model_name.to_string());

        info!(model = model_name, parameters = self.parameters.len(), "model selected");
        Ok(self.parameters.clone())
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn update_parameter(
        &mut self,
        name: &str,
        update: &ParameterUpdate,
    ) -> Result<(), EngineError> {
        let current = self
            .parameters
            .get(name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))?;

        if let Some(value) = update.value {
            if !value.is_finite() {
                return Err(EngineError::InvalidValue {
                    name: name.to_string(),
                    reason: format!("value must be finite, got {value}"),
                });
            }
        }
        for bound in [update.min, update.max].into_iter().flatten() {
            if bound.is_nan() {
                return Err(EngineError::InvalidValue {
                    name: name.to_string(),
                    reason: "bounds must not be NaN".to_string(),
                });
            }
        }

        let min = update.min.unwrap_or(current.min);
        let max = update.max.unwrap_or(current.max);
        if min > max {
            return Err(EngineError::InvalidBounds {
                name: name.to_string(),
                min,
                max,
            });
        }

        let Some(parameter) = self.parameters.get_mut(name) else {
            return Err(EngineError::UnknownParameter(name.to_string()));
        };
        if let Some(value) = update.value {
            if parameter.value != value {
                parameter.stderr = None;
            }
            parameter.value = value;
        }
        parameter.min = min;
        parameter.max = max;
        if let Some(vary) = update.vary {
            parameter.vary = vary;
        }
        debug!(parameter = name, update = %update.describe(), "parameter updated");
        Ok(())
    }

    /// Adds `sf_name` and its parameters, replacing any previous structure factor.
    pub fn set_structure_factor(
        &mut self,
        catalog: &dyn ModelCatalog,
        sf_name: &str,
    ) -> Result<(), EngineError> {
        if self.model_name.is_none() {
            return Err(EngineError::NoModel);
        }
        let specs = catalog.structure_factor_parameters(sf_name)?;

        self.parameters.remove_all(&self.sf_parameters);
        self.sf_parameters.clear();
        for spec in &specs {
            if self.parameters.contains(&spec.name) {
                debug!(parameter = %spec.name, "model parameter shadows structure factor parameter");
                continue;
            }
            self.parameters.push(Parameter::from(spec));
            self.sf_parameters.push(spec.name.clone());
        }
        self.structure_factor = Some(sf_name.to_string());
        info!(structure_factor = sf_name, injected = self.sf_parameters.len(), "structure factor set");
        Ok(())
    }

    pub fn remove_structure_factor(&mut self) -> Result<(), EngineError> {
        if self.model_name.is_none() {
            return Err(EngineError::NoModel);
        }
        self.parameters.remove_all(&self.sf_parameters);
        self.sf_parameters.clear();
        if let Some(previous) = self.structure_factor.take() {
            info!(structure_factor = %previous, "structure factor removed");
        }
        Ok(())
    }

    pub fn structure_factor(&self) -> Option<&str> {
        self.structure_factor.as_deref()
    }

    pub fn structure_factor_parameters(&self) -> &[String] {
        &self.sf_parameters
    }

    pub fn polydisperse_parameter_names(&self) -> BTreeSet<String> {
        self.polydisperse.clone()
    }

    pub fn polydispersity(&self, name: &str) -> Option<&PolydispersityConfig> {
        self.pd_configs.get(name)
    }

    pub fn polydispersity_configs(&self) -> impl Iterator<Item = &PolydispersityConfig> {
        self.pd_configs.values()
    }

    pub fn set_polydispersity(&mut self, config: PolydispersityConfig) -> Result<(), EngineError> {
        if !self.polydisperse.contains(&config.parameter_name) {
            return Err(EngineError::NotPolydisperse(config.parameter_name));
        }
        if !config.width.is_finite() || config.width < 0.0 {
            return Err(EngineError::InvalidValue {
                name: config.fit_name(),
                reason: format!("width must be a finite non-negative number, got {}", config.width),
            });
        }
        if config.n_points == 0 {
            return Err(EngineError::InvalidValue {
                name: config.fit_name(),
                reason: "n_points must be at least 1".to_string(),
            });
        }
        debug!(
            parameter = %config.parameter_name,
            width = config.width,
            distribution = %config.distribution,
            "polydispersity configured"
        );
        self.pd_configs.insert(config.parameter_name.clone(), config);
        Ok(())
    }

    pub fn enable_polydispersity(&mut self, enabled: bool) {
        self.pd_enabled = enabled;
    }

    pub fn polydispersity_enabled(&self) -> bool {
        self.pd_enabled
    }

    pub fn load_data(&mut self, data: Dataset) {
        info!(points = data.len(), "dataset loaded");
        self.data = Some(data);
    }

    pub fn data(&self) -> Option<&Dataset> {
        self.data.as_ref()
    }

    pub fn last_result(&self) -> Option<&FitResult> {
        self.last_result.as_ref()
    }

    /// Stores `result` and copies its fitted values into the parameters and
    /// polydispersity widths.
    pub fn apply_fit(&mut self, result: FitResult) {
        for parameter_name in self.parameters.names() {
            if let Some(fitted) = result.parameters.get(&parameter_name) {
                if let Some(parameter) = self.parameters.get_mut(&parameter_name) {
                    parameter.value = fitted.value;
                    parameter.stderr = fitted.stderr;
                }
            }
        }
        for config in self.pd_configs.values_mut() {
            if let Some(fitted) = result.parameters.get(&pd_fit_name(&config.parameter_name)) {
                config.width = fitted.value;
            }
        }
        self.last_result = Some(result);
    }
}
