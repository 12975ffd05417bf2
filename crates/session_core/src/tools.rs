//! Tool surface exposed to the chat transport: JSON schemas and typed
//! argument parsing.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use shared::{
    domain::{Distribution, ParameterUpdate, DEFAULT_PD_WIDTH},
    error::{ErrorCode, ToolError},
    protocol::{ToolName, ToolSchema},
};

/// A tool call whose arguments have been parsed and type-checked.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    ListModels,
    GetModelParameters {
        model_name: String,
    },
    GetCurrentState,
    GetFitResults,
    SetModel {
        model_name: String,
    },
    SetParameter {
        name: String,
        update: ParameterUpdate,
    },
    SetMultipleParameters {
        updates: BTreeMap<String, ParameterUpdate>,
    },
    EnablePolydispersity {
        parameter_name: String,
        distribution: Distribution,
        width: f64,
    },
    SetStructureFactor {
        sf_name: String,
    },
    RemoveStructureFactor,
    RunFit,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelNameArgs {
    model_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SetParameterArgs {
    name: String,
    value: Option<f64>,
    min_bound: Option<f64>,
    max_bound: Option<f64>,
    vary: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterSettings {
    value: Option<f64>,
    #[serde(alias = "min_bound")]
    min: Option<f64>,
    #[serde(alias = "max_bound")]
    max: Option<f64>,
    vary: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SetMultipleArgs {
    #[serde(alias = "updates")]
    parameters: BTreeMap<String, ParameterSettings>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EnablePolydispersityArgs {
    parameter_name: String,
    pd_type: Option<String>,
    pd_value: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StructureFactorArgs {
    sf_name: String,
}

fn arguments<T: DeserializeOwned>(tool: ToolName, raw: &Value) -> Result<T, ToolError> {
    let raw = if raw.is_null() { json!({}) } else { raw.clone() };
    serde_json::from_value(raw)
        .map_err(|e| ToolError::validation(format!("Tool parameter error for '{tool}': {e}")))
}

fn no_arguments(tool: ToolName, raw: &Value) -> Result<(), ToolError> {
    match raw {
        Value::Null => Ok(()),
        Value::Object(map) if map.is_empty() => Ok(()),
        _ => Err(ToolError::validation(format!(
            "Tool parameter error for '{tool}': this tool takes no arguments"
        ))),
    }
}

impl ToolRequest {
    /// Parses a raw tool call. Unknown names and malformed arguments are
    /// rejected before anything else happens.
    pub fn parse(name: &str, raw: &Value) -> Result<Self, ToolError> {
        let tool: ToolName = name
            .parse()
            .map_err(|message: String| ToolError::new(ErrorCode::UnknownTool, message))?;

        let request = match tool {
            ToolName::ListSansModels => {
                no_arguments(tool, raw)?;
                ToolRequest::ListModels
            }
            ToolName::GetModelParameters => {
                let args: ModelNameArgs = arguments(tool, raw)?;
                ToolRequest::GetModelParameters {
                    model_name: args.model_name,
                }
            }
            ToolName::GetCurrentState => {
                no_arguments(tool, raw)?;
                ToolRequest::GetCurrentState
            }
            ToolName::GetFitResults => {
                no_arguments(tool, raw)?;
                ToolRequest::GetFitResults
            }
            ToolName::SetModel => {
                let args: ModelNameArgs = arguments(tool, raw)?;
                ToolRequest::SetModel {
                    model_name: args.model_name,
                }
            }
            ToolName::SetParameter => {
                let args: SetParameterArgs = arguments(tool, raw)?;
                ToolRequest::SetParameter {
                    name: args.name,
                    update: ParameterUpdate {
                        value: args.value,
                        min: args.min_bound,
                        max: args.max_bound,
                        vary: args.vary,
                    },
                }
            }
            ToolName::SetMultipleParameters => {
                let args: SetMultipleArgs = arguments(tool, raw)?;
                ToolRequest::SetMultipleParameters {
                    updates: args
                        .parameters
                        .into_iter()
                        .map(|(name, settings)| {
                            let update = ParameterUpdate {
                                value: settings.value,
                                min: settings.min,
                                max: settings.max,
                                vary: settings.vary,
                            };
                            (name, update)
                        })
                        .collect(),
                }
            }
            ToolName::EnablePolydispersity => {
                let args: EnablePolydispersityArgs = arguments(tool, raw)?;
                let distribution = match args.pd_type.as_deref() {
                    Some(raw) => raw.parse::<Distribution>().map_err(|e| {
                        ToolError::validation(format!("Tool parameter error for '{tool}': {e}"))
                    })?,
                    None => Distribution::default(),
                };
                ToolRequest::EnablePolydispersity {
                    parameter_name: args.parameter_name,
                    distribution,
                    width: args.pd_value.unwrap_or(DEFAULT_PD_WIDTH),
                }
            }
            ToolName::SetStructureFactor => {
                let args: StructureFactorArgs = arguments(tool, raw)?;
                ToolRequest::SetStructureFactor {
                    sf_name: args.sf_name,
                }
            }
            ToolName::RemoveStructureFactor => {
                no_arguments(tool, raw)?;
                ToolRequest::RemoveStructureFactor
            }
            ToolName::RunFit => {
                no_arguments(tool, raw)?;
                ToolRequest::RunFit
            }
        };
        Ok(request)
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolRequest::ListModels => ToolName::ListSansModels,
            ToolRequest::GetModelParameters { .. } => ToolName::GetModelParameters,
            ToolRequest::GetCurrentState => ToolName::GetCurrentState,
            ToolRequest::GetFitResults => ToolName::GetFitResults,
            ToolRequest::SetModel { .. } => ToolName::SetModel,
            ToolRequest::SetParameter { .. } => ToolName::SetParameter,
            ToolRequest::SetMultipleParameters { .. } => ToolName::SetMultipleParameters,
            ToolRequest::EnablePolydispersity { .. } => ToolName::EnablePolydispersity,
            ToolRequest::SetStructureFactor { .. } => ToolName::SetStructureFactor,
            ToolRequest::RemoveStructureFactor => ToolName::RemoveStructureFactor,
            ToolRequest::RunFit => ToolName::RunFit,
        }
    }
}

fn no_input() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

fn schema(tool: ToolName, description: &str, input_schema: Value) -> ToolSchema {
    ToolSchema {
        name: tool.as_str().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Input schemas for every tool, in the order of [`ToolName::ALL`].
pub fn tool_schemas() -> Vec<ToolSchema> {
    ToolName::ALL
        .into_iter()
        .map(|tool| match tool {
            ToolName::ListSansModels => schema(
                tool,
                "List all available SANS models. Returns the model names that can be used with set-model.",
                no_input(),
            ),
            ToolName::GetModelParameters => schema(
                tool,
                "Get parameter details for a specific SANS model: names, default values, bounds and which parameters support polydispersity.",
                json!({
                    "type": "object",
                    "properties": {
                        "model_name": {
                            "type": "string",
                            "description": "Name of the model (e.g., 'sphere', 'cylinder')"
                        }
                    },
                    "required": ["model_name"]
                }),
            ),
            ToolName::GetCurrentState => schema(
                tool,
                "Get the current state of the fitting session: loaded data, current model, structure factor, polydispersity and parameter values.",
                no_input(),
            ),
            ToolName::GetFitResults => schema(
                tool,
                "Get the results from the most recent fit: optimized parameter values, uncertainties and reduced chi-square.",
                no_input(),
            ),
            ToolName::SetModel => schema(
                tool,
                "Load a SANS model for fitting. Replaces all parameters with the model defaults.",
                json!({
                    "type": "object",
                    "properties": {
                        "model_name": {
                            "type": "string",
                            "description": "Name of the model to load (e.g., 'sphere', 'cylinder', 'ellipsoid')"
                        }
                    },
                    "required": ["model_name"]
                }),
            ),
            ToolName::SetParameter => schema(
                tool,
                "Set a parameter's value and/or fitting options.",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Parameter name (e.g., 'radius', 'sld')" },
                        "value": { "type": "number", "description": "New value for the parameter (optional)" },
                        "min_bound": { "type": "number", "description": "Minimum bound for fitting (optional)" },
                        "max_bound": { "type": "number", "description": "Maximum bound for fitting (optional)" },
                        "vary": { "type": "boolean", "description": "Whether the parameter varies during fitting (optional)" }
                    },
                    "required": ["name"]
                }),
            ),
            ToolName::SetMultipleParameters => schema(
                tool,
                "Set multiple parameters at once. Either every update is applied or none is.",
                json!({
                    "type": "object",
                    "properties": {
                        "parameters": {
                            "type": "object",
                            "description": "Mapping of parameter names to settings with optional keys 'value', 'min', 'max', 'vary'. Example: {\"radius\": {\"value\": 50, \"vary\": true}}",
                            "additionalProperties": {
                                "type": "object",
                                "properties": {
                                    "value": { "type": "number" },
                                    "min": { "type": "number" },
                                    "max": { "type": "number" },
                                    "vary": { "type": "boolean" }
                                }
                            }
                        }
                    },
                    "required": ["parameters"]
                }),
            ),
            ToolName::EnablePolydispersity => schema(
                tool,
                "Enable polydispersity for a size parameter. The width is varied in subsequent fits.",
                json!({
                    "type": "object",
                    "properties": {
                        "parameter_name": {
                            "type": "string",
                            "description": "Name of the parameter to make polydisperse (e.g., 'radius')"
                        },
                        "pd_type": {
                            "type": "string",
                            "description": "Distribution type",
                            "enum": Distribution::ALL.map(|d| d.as_str()),
                            "default": "gaussian"
                        },
                        "pd_value": {
                            "type": "number",
                            "description": "Relative width of the distribution (typically 0.01-0.5)",
                            "default": DEFAULT_PD_WIDTH
                        }
                    },
                    "required": ["parameter_name"]
                }),
            ),
            ToolName::SetStructureFactor => schema(
                tool,
                "Add a structure factor to account for interparticle interactions. Replaces any previous structure factor.",
                json!({
                    "type": "object",
                    "properties": {
                        "sf_name": {
                            "type": "string",
                            "description": "Structure factor name (e.g., 'hardsphere')"
                        }
                    },
                    "required": ["sf_name"]
                }),
            ),
            ToolName::RemoveStructureFactor => schema(
                tool,
                "Remove the structure factor from the current model.",
                no_input(),
            ),
            ToolName::RunFit => schema(
                tool,
                "Run the curve fitting optimization with the current model and parameter settings. Returns fit quality and optimized parameter values.",
                no_input(),
            ),
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/tools_tests.rs"]
mod tests;
