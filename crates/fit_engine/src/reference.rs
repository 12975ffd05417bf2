use std::{collections::BTreeSet, sync::Arc};

use shared::domain::{
    pd_fit_name, FitResult, FittedParameter, ParameterSet, ParameterUpdate, PolydispersityConfig,
};
use tracing::{debug, info, warn};

use crate::{
    catalog::BuiltinCatalog,
    data::Dataset,
    dispersion::dispersion_points,
    models::{evaluate, Dispersion, ModelKind, StructureFactorKind, Values},
    state::ModelState,
    EngineError, FittingEngine, ModelCatalog,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Objective evaluations allowed before the fit is reported as not converged.
    pub max_evaluations: usize,
    /// Relative spread of the simplex objective values at convergence.
    pub f_tolerance: f64,
    /// Relative spread of the simplex vertices at convergence.
    pub x_tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 4000,
            f_tolerance: 1e-10,
            x_tolerance: 1e-6,
        }
    }
}

/// Self-contained engine: evaluates the builtin models and minimises
/// chi-squared with a bounded Nelder-Mead simplex.
pub struct ReferenceFitter {
    catalog: Arc<dyn ModelCatalog>,
    state: ModelState,
    options: FitOptions,
}

impl Default for ReferenceFitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceFitter {
    pub fn new() -> Self {
        Self::with_catalog(Arc::new(BuiltinCatalog))
    }

    pub fn with_catalog(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            catalog,
            state: ModelState::new(),
            options: FitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> Arc<dyn ModelCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn options(&self) -> FitOptions {
        self.options
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    fn problem(&self) -> Result<Problem<'_>, EngineError> {
        let model_name = self.state.model_name().ok_or(EngineError::NoModel)?;
        let data = self.state.data().ok_or(EngineError::NoData)?;
        let kind = ModelKind::from_name(model_name).ok_or_else(|| {
            EngineError::Numerical(format!("model '{model_name}' has no evaluator"))
        })?;
        let structure_factor = match self.state.structure_factor() {
            Some(name) => Some(StructureFactorKind::from_name(name).ok_or_else(|| {
                EngineError::Numerical(format!("structure factor '{name}' has no evaluator"))
            })?),
            None => None,
        };

        let parameters = self.state.parameters();
        let base: Values = parameters
            .iter()
            .map(|p| (p.name.clone(), p.value))
            .collect();

        let dispersions: Vec<&PolydispersityConfig> = if self.state.polydispersity_enabled() {
            self.state
                .polydispersity_configs()
                .filter(|config| parameters.contains(&config.parameter_name))
                .collect()
        } else {
            Vec::new()
        };

        let mut free: Vec<FreeVariable> = parameters
            .iter()
            .filter(|p| p.vary)
            .map(|p| FreeVariable {
                target: Target::Parameter(p.name.clone()),
                start: p.value.clamp(p.min, p.max),
                min: p.min,
                max: p.max,
            })
            .collect();
        free.extend(
            dispersions
                .iter()
                .filter(|config| config.vary)
                .map(|config| FreeVariable {
                    target: Target::Width(config.parameter_name.clone()),
                    start: config.width.clamp(0.0, 1.0),
                    min: 0.0,
                    max: 1.0,
                }),
        );

        Ok(Problem {
            kind,
            structure_factor,
            base,
            dispersions,
            data,
            sigma: data.sigma(),
            free,
        })
    }
}

impl FittingEngine for ReferenceFitter {
    fn set_model(&mut self, model_name: &str) -> Result<ParameterSet, EngineError> {
        self.state.select_model(self.catalog.as_ref(), model_name)
    }

    fn model_name(&self) -> Option<&str> {
        self.state.model_name()
    }

    fn parameters(&self) -> &ParameterSet {
        self.state.parameters()
    }

    fn update_parameter(
        &mut self,
        name: &str,
        update: &ParameterUpdate,
    ) -> Result<(), EngineError> {
        self.state.update_parameter(name, update)
    }

    fn set_structure_factor(&mut self, sf_name: &str) -> Result<(), EngineError> {
        self.state.set_structure_factor(self.catalog.as_ref(), sf_name)
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
        self.state.enable_polydispersity(enabled);
    }

    fn polydispersity_enabled(&self) -> bool {
        self.state.polydispersity_enabled()
    }

    fn load_data(&mut self, data: Dataset) {
        self.state.load_data(data);
    }

    fn data(&self) -> Option<&Dataset> {
        self.state.data()
    }

    fn fit(&mut self) -> Result<FitResult, EngineError> {
        let result = {
            let problem = self.problem()?;
            if problem.free.is_empty() {
                return Err(EngineError::NothingToFit);
            }
            info!(
                model = ?problem.kind,
                free = problem.free.len(),
                points = problem.data.len(),
                "fit started"
            );
            problem.solve(&self.options)?
        };
        info!(
            chi_squared = result.chi_squared,
            evaluations = result.evaluations,
            "fit converged"
        );
        self.state.apply_fit(result.clone());
        Ok(result)
    }

    fn last_result(&self) -> Option<&FitResult> {
        self.state.last_result()
    }

    fn model_curve(&self) -> Result<Vec<f64>, EngineError> {
        let problem = self.problem()?;
        let start: Vec<f64> = problem.free.iter().map(|v| v.start).collect();
        Ok(problem.intensity(&start))
    }
}

enum Target {
    Parameter(String),
    Width(String),
}

struct FreeVariable {
    target: Target,
    start: f64,
    min: f64,
    max: f64,
}

impl FreeVariable {
    fn name(&self) -> String {
        match &self.target {
            Target::Parameter(name) => name.clone(),
            Target::Width(name) => pd_fit_name(name),
        }
    }
}

struct Problem<'a> {
    kind: ModelKind,
    structure_factor: Option<StructureFactorKind>,
    base: Values,
    dispersions: Vec<&'a PolydispersityConfig>,
    data: &'a Dataset,
    sigma: Vec<f64>,
    free: Vec<FreeVariable>,
}

impl Problem<'_> {
    fn intensity(&self, x: &[f64]) -> Vec<f64> {
        let mut values = self.base.clone();
        let mut widths: Vec<(&str, f64)> = Vec::new();
        for (variable, &xi) in self.free.iter().zip(x) {
            match &variable.target {
                Target::Parameter(name) => {
                    values.insert(name.clone(), xi);
                }
                Target::Width(name) => widths.push((name.as_str(), xi)),
            }
        }

        let dispersions: Vec<Dispersion> = self
            .dispersions
            .iter()
            .map(|config| {
                let mut config = (*config).clone();
                if let Some((_, width)) = widths.iter().find(|(n, _)| *n == config.parameter_name) {
                    config.width = *width;
                }
                let center = values.get(&config.parameter_name).copied().unwrap_or(0.0);
                Dispersion {
                    parameter: config.parameter_name.clone(),
                    points: dispersion_points(center, &config),
                }
            })
            .collect();

        evaluate(
            self.kind,
            self.structure_factor,
            &values,
            &dispersions,
            self.data.q(),
        )
    }

    fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.intensity(x)
            .iter()
            .zip(self.data.intensity())
            .zip(&self.sigma)
            .map(|((model, measured), sigma)| (model - measured) / sigma)
            .collect()
    }

    fn chi_squared(&self, x: &[f64]) -> f64 {
        self.residuals(x).iter().map(|r| r * r).sum()
    }

    fn solve(&self, options: &FitOptions) -> Result<FitResult, EngineError> {
        let start: Vec<f64> = self.free.iter().map(|v| v.start).collect();
        let bounds: Vec<(f64, f64)> = self.free.iter().map(|v| (v.min, v.max)).collect();

        let minimum = nelder_mead(|x| self.chi_squared(x), start, &bounds, options);
        if !minimum.converged {
            warn!(evaluations = minimum.evaluations, "fit did not converge");
            return Err(EngineError::FitDidNotConverge {
                evaluations: minimum.evaluations,
            });
        }
        if !minimum.value.is_finite() {
            return Err(EngineError::Numerical(
                "chi-squared is not finite at the optimum".to_string(),
            ));
        }

        let points = self.data.len();
        let dof = points.saturating_sub(self.free.len());
        let reduced = if dof > 0 {
            minimum.value / dof as f64
        } else {
            minimum.value
        };
        let stderr = self.standard_errors(&minimum.x, &bounds, reduced);

        let parameters = self
            .free
            .iter()
            .zip(&minimum.x)
            .zip(stderr)
            .map(|((variable, &value), stderr)| {
                (variable.name(), FittedParameter { value, stderr })
            })
            .collect();

        Ok(FitResult {
            chi_squared: reduced,
            parameters,
            evaluations: minimum.evaluations,
        })
    }

    /// Standard errors from the covariance `(J^T J)^-1 * reduced_chi2`, with
    /// `J` the forward-difference Jacobian of the weighted residuals.
    fn standard_errors(&self, x: &[f64], bounds: &[(f64, f64)], reduced: f64) -> Vec<Option<f64>> {
        let k = x.len();
        let unknown = vec![None; k];
        let base = self.residuals(x);

        let mut jacobian: Vec<Vec<f64>> = Vec::with_capacity(k);
        for j in 0..k {
            let mut h = 1e-6 * x[j].abs().max(1e-6);
            if x[j] + h > bounds[j].1 {
                h = -h;
            }
            let mut shifted = x.to_vec();
            shifted[j] += h;
            let column: Vec<f64> = self
                .residuals(&shifted)
                .iter()
                .zip(&base)
                .map(|(r, r0)| (r - r0) / h)
                .collect();
            jacobian.push(column);
        }

        let normal: Vec<Vec<f64>> = (0..k)
            .map(|a| {
                (0..k)
                    .map(|b| jacobian[a].iter().zip(&jacobian[b]).map(|(u, v)| u * v).sum())
                    .collect()
            })
            .collect();

        let Some(covariance) = invert(normal) else {
            debug!("normal matrix is singular; standard errors unavailable");
            return unknown;
        };
        (0..k)
            .map(|j| {
                let variance = covariance[j][j] * reduced;
                (variance.is_finite() && variance >= 0.0).then(|| variance.sqrt())
            })
            .collect()
    }
}

fn invert(mut a: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut inverse: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if !a[pivot][col].is_finite() || a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        inverse.swap(col, pivot);

        let p = a[col][col];
        for k in 0..n {
            a[col][k] /= p;
            inverse[col][k] /= p;
        }
        let pivot_row = a[col].clone();
        let pivot_inverse = inverse[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[row][k] -= factor * pivot_row[k];
                inverse[row][k] -= factor * pivot_inverse[k];
            }
        }
    }
    Some(inverse)
}

struct Minimum {
    x: Vec<f64>,
    value: f64,
    evaluations: usize,
    converged: bool,
}

struct Objective<F> {
    f: F,
    evaluations: usize,
}

impl<F: FnMut(&[f64]) -> f64> Objective<F> {
    fn call(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let value = (self.f)(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }
}

fn project(mut x: Vec<f64>, bounds: &[(f64, f64)]) -> Vec<f64> {
    for (v, (lo, hi)) in x.iter_mut().zip(bounds) {
        *v = v.max(*lo).min(*hi);
    }
    x
}

fn along(from: &[f64], to: &[f64], t: f64) -> Vec<f64> {
    from.iter().zip(to).map(|(a, b)| a + t * (b - a)).collect()
}

/// Nelder-Mead simplex with vertices projected onto the bounds.
fn nelder_mead(
    f: impl FnMut(&[f64]) -> f64,
    start: Vec<f64>,
    bounds: &[(f64, f64)],
    options: &FitOptions,
) -> Minimum {
    let n = start.len();
    let mut objective = Objective { f, evaluations: 0 };

    let start = project(start, bounds);
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    let f0 = objective.call(&start);
    simplex.push((start.clone(), f0));
    for j in 0..n {
        let mut vertex = start.clone();
        let mut step = if vertex[j] != 0.0 {
            0.05 * vertex[j].abs()
        } else {
            0.00025
        };
        if vertex[j] + step > bounds[j].1 {
            step = -step;
        }
        vertex[j] += step;
        let vertex = project(vertex, bounds);
        let value = objective.call(&vertex);
        simplex.push((vertex, value));
    }

    loop {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best = simplex[0].1;
        let worst = simplex[n].1;

        let f_spread = worst - best;
        let x_spread_ok = simplex[1..].iter().all(|(vertex, _)| {
            vertex
                .iter()
                .zip(&simplex[0].0)
                .all(|(v, b)| (v - b).abs() <= options.x_tolerance * (b.abs() + 1e-8))
        });
        if f_spread.is_finite()
            && f_spread <= options.f_tolerance * best.abs() + 1e-14
            && x_spread_ok
        {
            return Minimum {
                x: simplex[0].0.clone(),
                value: best,
                evaluations: objective.evaluations,
                converged: true,
            };
        }
        if objective.evaluations >= options.max_evaluations {
            return Minimum {
                x: simplex[0].0.clone(),
                value: best,
                evaluations: objective.evaluations,
                converged: false,
            };
        }

        let mut centroid = vec![0.0; n];
        for (vertex, _) in &simplex[..n] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / n as f64;
            }
        }
        let worst_vertex = simplex[n].0.clone();

        let reflected = project(along(&centroid, &worst_vertex, -1.0), bounds);
        let f_reflected = objective.call(&reflected);

        if f_reflected < best {
            let expanded = project(along(&centroid, &worst_vertex, -2.0), bounds);
            let f_expanded = objective.call(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }
        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let (contracted, f_contracted, accept) = if f_reflected < worst {
            let point = project(along(&centroid, &reflected, 0.5), bounds);
            let value = objective.call(&point);
            (point, value, value <= f_reflected)
        } else {
            let point = project(along(&centroid, &worst_vertex, 0.5), bounds);
            let value = objective.call(&point);
            (point, value, value < worst)
        };
        if accept {
            simplex[n] = (contracted, f_contracted);
            continue;
        }

        let anchor = simplex[0].0.clone();
        for entry in simplex.iter_mut().skip(1) {
            let shrunk = project(along(&anchor, &entry.0, 0.5), bounds);
            let value = objective.call(&shrunk);
            *entry = (shrunk, value);
        }
    }
}

#[cfg(test)]
#[path = "tests/reference_tests.rs"]
mod tests;
