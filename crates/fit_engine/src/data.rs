//! One-dimensional scattering datasets: `Q, I(Q)` with optional `dI(Q)`.

use std::{fs, path::Path};

use crate::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    q: Vec<f64>,
    intensity: Vec<f64>,
    uncertainty: Option<Vec<f64>>,
}

impl Dataset {
    pub fn new(
        q: Vec<f64>,
        intensity: Vec<f64>,
        uncertainty: Option<Vec<f64>>,
    ) -> Result<Self, EngineError> {
        if q.is_empty() {
            return Err(EngineError::Data("dataset has no points".to_string()));
        }
        if q.len() != intensity.len() {
            return Err(EngineError::Data(format!(
                "column length mismatch: {} Q values, {} intensities",
                q.len(),
                intensity.len()
            )));
        }
        if let Some(uncertainty) = &uncertainty {
            if uncertainty.len() != q.len() {
                return Err(EngineError::Data(format!(
                    "column length mismatch: {} Q values, {} uncertainties",
                    q.len(),
                    uncertainty.len()
                )));
            }
        }
        if let Some(bad) = q.iter().position(|v| !v.is_finite() || *v <= 0.0) {
            return Err(EngineError::Data(format!(
                "Q must be finite and positive (row {})",
                bad + 1
            )));
        }
        if intensity.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::Data("intensity contains non-finite values".to_string()));
        }
        Ok(Self {
            q,
            intensity,
            uncertainty,
        })
    }

    /// Parses comma, semicolon, tab or whitespace separated columns.
    /// Blank lines, `#` comments and non-numeric header lines are skipped.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let mut q = Vec::new();
        let mut intensity = Vec::new();
        let mut uncertainty = Vec::new();
        let mut has_uncertainty = true;

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line
                .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            let Some(first) = fields.first() else {
                continue;
            };
            if first.parse::<f64>().is_err() {
                // header row
                continue;
            }
            if fields.len() < 2 {
                return Err(EngineError::Data(format!(
                    "line {}: expected at least two columns",
                    line_no + 1
                )));
            }
            let parse = |raw: &str| {
                raw.parse::<f64>().map_err(|_| {
                    EngineError::Data(format!("line {}: invalid number '{raw}'", line_no + 1))
                })
            };
            q.push(parse(fields[0])?);
            intensity.push(parse(fields[1])?);
            match fields.get(2) {
                Some(raw) => uncertainty.push(parse(raw)?),
                None => has_uncertainty = false,
            }
        }

        let uncertainty = (has_uncertainty && !uncertainty.is_empty()).then_some(uncertainty);
        Self::new(q, intensity, uncertainty)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Data(format!("failed to read '{}': {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn uncertainty(&self) -> Option<&[f64]> {
        self.uncertainty.as_deref()
    }

    /// Per-point weights for chi-squared: the supplied uncertainty when it is
    /// positive, otherwise Poisson-like `sqrt(|I|)`.
    pub fn sigma(&self) -> Vec<f64> {
        self.intensity
            .iter()
            .enumerate()
            .map(|(i, intensity)| {
                let supplied = self
                    .uncertainty
                    .as_ref()
                    .map(|u| u[i])
                    .filter(|u| u.is_finite() && *u > 0.0);
                supplied.unwrap_or_else(|| intensity.abs().sqrt().max(1e-12))
            })
            .collect()
    }

    pub fn q_range(&self) -> (f64, f64) {
        let min = self.q.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.q.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }
}

#[cfg(test)]
#[path = "tests/data_tests.rs"]
mod tests;
