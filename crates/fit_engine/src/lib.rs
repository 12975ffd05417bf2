//! Fitting-engine and model-catalog collaborators used by a fitting session.
//!
//! The session core only talks to the [`FittingEngine`] and [`ModelCatalog`]
//! traits. [`ReferenceFitter`] over [`BuiltinCatalog`] is the implementation
//! shipped with the console front-end.

use std::collections::BTreeSet;

use shared::domain::{FitResult, ParameterSet, ParameterSpec, ParameterUpdate, PolydispersityConfig};
use thiserror::Error;

mod catalog;
pub mod data;
mod dispersion;
mod models;
mod reference;
mod state;

pub use catalog::BuiltinCatalog;
pub use data::Dataset;
pub use reference::{FitOptions, ReferenceFitter};
pub use state::ModelState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("unknown structure factor '{0}'")]
    UnknownStructureFactor(String),
    #[error("parameter '{0}' does not support polydispersity")]
    NotPolydisperse(String),
    #[error("invalid bounds for '{name}': min {min} exceeds max {max}")]
    InvalidBounds { name: String, min: f64, max: f64 },
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("no model selected")]
    NoModel,
    #[error("no data loaded")]
    NoData,
    #[error("no parameters are set to vary")]
    NothingToFit,
    #[error("fit did not converge after {evaluations} evaluations")]
    FitDidNotConverge { evaluations: usize },
    #[error("numerical failure: {0}")]
    Numerical(String),
    #[error("data error: {0}")]
    Data(String),
}

pub trait ModelCatalog: Send + Sync {
    fn list_models(&self) -> Vec<String>;
    fn get_parameters(&self, model_name: &str) -> Result<Vec<ParameterSpec>, EngineError>;
    fn list_structure_factors(&self) -> Vec<String>;
    fn structure_factor_parameters(&self, sf_name: &str)
        -> Result<Vec<ParameterSpec>, EngineError>;

    fn has_model(&self, model_name: &str) -> bool {
        self.list_models().iter().any(|m| m == model_name)
    }

    fn has_structure_factor(&self, sf_name: &str) -> bool {
        self.list_structure_factors().iter().any(|s| s == sf_name)
    }
}

/// Authoritative owner of the domain model: selected model, parameters,
/// polydispersity, structure factor, data and the last fit.
pub trait FittingEngine: Send {
    /// Replaces the whole parameter set with the catalog defaults of `model_name`.
    fn set_model(&mut self, model_name: &str) -> Result<ParameterSet, EngineError>;
    fn model_name(&self) -> Option<&str>;
    fn parameters(&self) -> &ParameterSet;
    /// Applies every supplied field or none of them.
    fn update_parameter(&mut self, name: &str, update: &ParameterUpdate)
        -> Result<(), EngineError>;

    fn set_structure_factor(&mut self, sf_name: &str) -> Result<(), EngineError>;
    fn remove_structure_factor(&mut self) -> Result<(), EngineError>;
    fn structure_factor(&self) -> Option<&str>;

    fn polydisperse_parameter_names(&self) -> BTreeSet<String>;
    fn polydispersity(&self, name: &str) -> Option<&PolydispersityConfig>;
    fn set_polydispersity(&mut self, config: PolydispersityConfig) -> Result<(), EngineError>;
    fn enable_polydispersity(&mut self, enabled: bool);
    fn polydispersity_enabled(&self) -> bool;

    fn load_data(&mut self, data: Dataset);
    fn data(&self) -> Option<&Dataset>;

    /// Runs the optimiser; on success the parameter values hold the best fit.
    fn fit(&mut self) -> Result<FitResult, EngineError>;
    fn last_result(&self) -> Option<&FitResult>;
    /// Model intensity at the loaded data points for the current parameters.
    fn model_curve(&self) -> Result<Vec<f64>, EngineError>;
}
