//! Render pass: clears the redraw flag, then draws every widget exactly once,
//! seeding missing store entries from the domain model.

use fit_engine::FittingEngine;
use serde::Serialize;
use shared::domain::{FitResult, FitStatus, Parameter, DEFAULT_PD_POINTS};
use tracing::warn;

use crate::{
    error::BridgeError,
    session::FitSession,
    store::{ParamRole, PdRole, AI_TOOLS_ENABLED, PD_ENABLED},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRow {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdRow {
    pub name: String,
    pub width: f64,
    pub n_points: i64,
    pub distribution: String,
    pub vary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FitView {
    None,
    Current(FitResult),
    /// A result exists but the model or parameters changed after it.
    Stale,
}

/// Residual statistics of the current model curve against the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualStats {
    pub points: usize,
    pub chi_squared: f64,
    pub rms: f64,
    pub max_abs: f64,
}

/// Everything one pass displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub pass: u64,
    pub full_redraw: bool,
    pub tools_enabled: bool,
    pub model: Option<String>,
    pub structure_factor: Option<String>,
    pub data_points: Option<usize>,
    pub parameters: Vec<ParameterRow>,
    pub pd_enabled: bool,
    pub polydispersity: Vec<PdRow>,
    pub fit_status: FitStatus,
    pub fit: FitView,
    pub residuals: Option<ResidualStats>,
}

impl<E: FittingEngine> FitSession<E> {
    /// Runs one render pass. The redraw flag is read and cleared before any
    /// widget is drawn; the pass is closed even when drawing fails.
    pub fn render_pass(&mut self) -> Result<PanelView, BridgeError> {
        let full_redraw = self.bridge.take_needs_rerun()?;
        let pass = self.bridge.begin_pass()?;
        let drawn = self.draw(pass, full_redraw);
        let closed = self.bridge.end_pass();
        let view = drawn?;
        closed?;
        Ok(view)
    }

    fn draw(&mut self, pass: u64, full_redraw: bool) -> Result<PanelView, BridgeError> {
        let tools_enabled = self
            .bridge
            .bind_bool(AI_TOOLS_ENABLED, self.settings.tools_enabled)?;

        let domain: Vec<Parameter> = self.engine.parameters().iter().cloned().collect();
        let mut parameters = Vec::with_capacity(domain.len());
        for p in &domain {
            parameters.push(ParameterRow {
                name: p.name.clone(),
                value: self.bridge.bind_float(&ParamRole::Value.key(&p.name), p.value)?,
                min: self.bridge.bind_float(&ParamRole::Min.key(&p.name), p.min)?,
                max: self.bridge.bind_float(&ParamRole::Max.key(&p.name), p.max)?,
                vary: self.bridge.bind_bool(&ParamRole::Vary.key(&p.name), p.vary)?,
            });
        }

        let mut polydispersity = Vec::new();
        let mut pd_enabled = false;
        let pd_names = self.engine.polydisperse_parameter_names();
        if self.engine.model_name().is_some() && !pd_names.is_empty() {
            pd_enabled = self
                .bridge
                .bind_bool(PD_ENABLED, self.engine.polydispersity_enabled())?;
            for name in pd_names {
                let config = self.engine.polydispersity(&name).cloned();
                let (width, n_points, distribution, vary) = match &config {
                    Some(c) => (c.width, i64::from(c.n_points), c.distribution.as_str(), c.vary),
                    None => (0.0, i64::from(DEFAULT_PD_POINTS), "gaussian", false),
                };
                polydispersity.push(PdRow {
                    width: self.bridge.bind_float(&PdRole::Width.key(&name), width)?,
                    n_points: self.bridge.bind_int(&PdRole::NPoints.key(&name), n_points)?,
                    distribution: self
                        .bridge
                        .bind_text(&PdRole::Type.key(&name), distribution)?,
                    vary: self.bridge.bind_bool(&PdRole::Vary.key(&name), vary)?,
                    name,
                });
            }
        }

        let fit = match self.engine.last_result() {
            Some(result) if self.bridge.fit_completed() => FitView::Current(result.clone()),
            Some(_) => FitView::Stale,
            None => FitView::None,
        };

        Ok(PanelView {
            pass,
            full_redraw,
            tools_enabled,
            model: self.engine.model_name().map(str::to_string),
            structure_factor: self.engine.structure_factor().map(str::to_string),
            data_points: self.engine.data().map(|d| d.len()),
            parameters,
            pd_enabled,
            polydispersity,
            fit_status: self.fit_status.clone(),
            fit,
            residuals: self.residual_stats(),
        })
    }

    /// Residual statistics, or `None` (logged) when they cannot be computed.
    pub fn residual_stats(&self) -> Option<ResidualStats> {
        let data = self.engine.data()?;
        self.engine.model_name()?;
        let curve = match self.engine.model_curve() {
            Ok(curve) => curve,
            Err(err) => {
                warn!(error = %err, "residual statistics unavailable");
                return None;
            }
        };
        let sigma = data.sigma();
        let residuals: Vec<f64> = curve
            .iter()
            .zip(data.intensity())
            .zip(&sigma)
            .map(|((model, measured), sigma)| (measured - model) / sigma)
            .collect();
        if residuals.is_empty() || residuals.iter().any(|r| !r.is_finite()) {
            warn!("residual statistics unavailable: non-finite residuals");
            return None;
        }
        let points = residuals.len();
        let sum_sq: f64 = residuals.iter().map(|r| r * r).sum();
        Some(ResidualStats {
            points,
            chi_squared: sum_sq,
            rms: (sum_sq / points as f64).sqrt(),
            max_abs: residuals.iter().fold(0.0, |acc, r| acc.max(r.abs())),
        })
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
