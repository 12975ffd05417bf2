use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fit_engine::{BuiltinCatalog, Dataset, EngineError, FittingEngine, ModelCatalog, ModelState};
use shared::{
    domain::{
        pd_fit_name, FitResult, FittedParameter, ParameterSet, ParameterUpdate,
        PolydispersityConfig,
    },
    protocol::{ChatMessage, ChatResponse, ToolSchema},
};

use crate::{
    chat::ChatTransport,
    session::{FitSession, SessionSettings},
};

/// Engine over the built-in catalog whose fit outcome is scripted.
pub(crate) struct ScriptedEngine {
    catalog: BuiltinCatalog,
    state: ModelState,
    fit_error: Option<EngineError>,
    fit_result: Option<FitResult>,
    fail_update_on: Option<String>,
    curve_error: Option<EngineError>,
    pub(crate) fit_calls: usize,
}

impl ScriptedEngine {
    /// Fits succeed, reporting the current values shifted by one percent.
    pub(crate) fn ok() -> Self {
        Self {
            catalog: BuiltinCatalog,
            state: ModelState::new(),
            fit_error: None,
            fit_result: None,
            fail_update_on: None,
            curve_error: None,
            fit_calls: 0,
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            fit_error: Some(EngineError::Numerical(message.to_string())),
            ..Self::ok()
        }
    }

    pub(crate) fn with_fit_result(result: FitResult) -> Self {
        Self {
            fit_result: Some(result),
            ..Self::ok()
        }
    }

    /// Every update of `name` fails inside the engine.
    pub(crate) fn fail_update_on(mut self, name: &str) -> Self {
        self.fail_update_on = Some(name.to_string());
        self
    }

    pub(crate) fn failing_curve(mut self) -> Self {
        self.curve_error = Some(EngineError::Numerical("curve unavailable".to_string()));
        self
    }

    fn scripted_result(&self) -> FitResult {
        let mut parameters: BTreeMap<String, FittedParameter> = self
            .state
            .parameters()
            .iter()
            .filter(|p| p.vary)
            .map(|p| {
                let fitted = FittedParameter {
                    value: (p.value * 1.01).clamp(p.min, p.max),
                    stderr: Some(0.5),
                };
                (p.name.clone(), fitted)
            })
            .collect();
        if self.state.polydispersity_enabled() {
            for config in self.state.polydispersity_configs().filter(|c| c.vary) {
                parameters.insert(
                    pd_fit_name(&config.parameter_name),
                    FittedParameter {
                        value: 0.15,
                        stderr: Some(0.01),
                    },
                );
            }
        }
        FitResult {
            chi_squared: 1.25,
            parameters,
            evaluations: 42,
        }
    }
}

impl FittingEngine for ScriptedEngine {
    fn set_model(&mut self, model_name: &str) -> Result<ParameterSet, EngineError> {
        self.state.select_model(&self.catalog, model_name)
    }

    fn model_name(&self) -> Option<&str> {
        self.state.model_name()
    }

    fn parameters(&self) -> &ParameterSet {
        self.state.parameters()
    }

    fn update_parameter(&mut self, name: &str, update: &ParameterUpdate) -> Result<(), EngineError> {
        if self.fail_update_on.as_deref() == Some(name) {
            return Err(EngineError::Numerical(format!("scripted failure updating '{name}'")));
        }
        self.state.update_parameter(name, update)
    }

    fn set_structure_factor(&mut self, sf_name: &str) -> Result<(), EngineError> {
        self.state.set_structure_factor(&self.catalog, sf_name)
    }

    fn remove_structure_factor(&mut self) -> Result<(), EngineError> {
        self.state.remove_structure_factor()
    }

    fn structure_factor(&self) -> Option<&str> {
        self.state.structure_factor()
    }

    fn polydisperse_parameter_names(&self) -> BTreeSet<String> {
        self.state.polydisperse_parameter_names()
    }

    fn polydispersity(&self, name: &str) -> Option<&PolydispersityConfig> {
        self.state.polydispersity(name)
    }

    fn set_polydispersity(&mut self, config: PolydispersityConfig) -> Result<(), EngineError> {
        self.state.set_polydispersity(config)
    }

    fn enable_polydispersity(&mut self, enabled: bool) {
        self.state.enable_polydispersity(enabled)
    }

    fn polydispersity_enabled(&self) -> bool {
        self.state.polydispersity_enabled()
    }

    fn load_data(&mut self, data: Dataset) {
        self.state.load_data(data)
    }

    fn data(&self) -> Option<&Dataset> {
        self.state.data()
    }

    fn fit(&mut self) -> Result<FitResult, EngineError> {
        self.fit_calls += 1;
        if let Some(err) = &self.fit_error {
            return Err(err.clone());
        }
        let result = self
            .fit_result
            .clone()
            .unwrap_or_else(|| self.scripted_result());
        self.state.apply_fit(result.clone());
        Ok(result)
    }

    fn last_result(&self) -> Option<&FitResult> {
        self.state.last_result()
    }

    fn model_curve(&self) -> Result<Vec<f64>, EngineError> {
        if let Some(err) = &self.curve_error {
            return Err(err.clone());
        }
        let data = self.state.data().ok_or(EngineError::NoData)?;
        Ok(data.intensity().iter().map(|i| i * 0.9).collect())
    }
}

pub(crate) fn sample_dataset() -> Dataset {
    let q: Vec<f64> = (1..=20).map(|i| 0.005 * f64::from(i)).collect();
    let intensity: Vec<f64> = q.iter().map(|q| 10.0 / (1.0 + 100.0 * q * q)).collect();
    let uncertainty: Vec<f64> = intensity.iter().map(|i| i * 0.05).collect();
    Dataset::new(q, intensity, Some(uncertainty)).expect("sample dataset")
}

pub(crate) fn session_with(engine: ScriptedEngine, tools_enabled: bool) -> FitSession<ScriptedEngine> {
    let catalog: Arc<dyn ModelCatalog> = Arc::new(BuiltinCatalog);
    FitSession::new(
        engine,
        catalog,
        SessionSettings {
            tools_enabled,
            ..SessionSettings::default()
        },
    )
}

/// Session with tools enabled, a first render pass done.
pub(crate) fn tools_session() -> FitSession<ScriptedEngine> {
    let mut session = session_with(ScriptedEngine::ok(), true);
    session.render_pass().expect("initial render");
    session
}

/// Session with tools enabled, data loaded and `model` selected, rendered.
pub(crate) fn ready_session(model: &str) -> FitSession<ScriptedEngine> {
    ready_session_with(ScriptedEngine::ok(), model)
}

pub(crate) fn ready_session_with(engine: ScriptedEngine, model: &str) -> FitSession<ScriptedEngine> {
    let mut session = session_with(engine, true);
    session.load_data(sample_dataset()).expect("load data");
    session.select_model(model).expect("select model");
    session.render_pass().expect("render after model");
    session
}

/// Chat transport replaying scripted responses and recording every request.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<ChatResponse, String>>>,
    pub(crate) requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolSchema>)>>,
}

impl ScriptedTransport {
    pub(crate) fn ok(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(message.to_string())])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub(crate) fn request(&self, index: usize) -> (Vec<ChatMessage>, Vec<ToolSchema>) {
        self.requests.lock().expect("requests lock")[index].clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, messages: &[ChatMessage], tools: &[ToolSchema]) -> Result<ChatResponse> {
        self.requests
            .lock()
            .expect("requests lock")
            .push((messages.to_vec(), tools.to_vec()));
        match self.responses.lock().expect("responses lock").pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted transport exhausted")),
        }
    }
}
