//! Plain-text rendering of a panel view.

use std::fmt::Write;

use session_core::{FitView, PanelView, DISPLAY_LIMIT};
use shared::domain::FitResult;

/// Bounds at the display limit are shown as infinite.
fn bound(value: f64) -> String {
    if value >= DISPLAY_LIMIT {
        "inf".to_string()
    } else if value <= -DISPLAY_LIMIT {
        "-inf".to_string()
    } else {
        format!("{value:.6}")
    }
}

pub fn render_panel(view: &PanelView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== pass {}{} | tools {} | fit {}",
        view.pass,
        if view.full_redraw { " (redraw)" } else { "" },
        if view.tools_enabled { "on" } else { "off" },
        view.fit_status,
    );

    let data = match view.data_points {
        Some(points) => format!("{points} points"),
        None => "none".to_string(),
    };
    let model = match (&view.model, &view.structure_factor) {
        (Some(model), Some(sf)) => format!("{model}@{sf}"),
        (Some(model), None) => model.clone(),
        _ => "none".to_string(),
    };
    let _ = writeln!(out, "data: {data} | model: {model}");

    if !view.parameters.is_empty() {
        let _ = writeln!(
            out,
            "  {:<20} {:>14} {:>14} {:>14}  vary",
            "parameter", "value", "min", "max"
        );
        for row in &view.parameters {
            let _ = writeln!(
                out,
                "  {:<20} {:>14.6} {:>14} {:>14}  {}",
                row.name,
                row.value,
                bound(row.min),
                bound(row.max),
                if row.vary { "x" } else { "" },
            );
        }
    }

    if !view.polydispersity.is_empty() {
        let _ = writeln!(
            out,
            "  polydispersity {}",
            if view.pd_enabled { "on" } else { "off" }
        );
        for row in &view.polydispersity {
            let _ = writeln!(
                out,
                "  {:<20} width {:<8.4} n {:<4} {:<12} {}",
                row.name,
                row.width,
                row.n_points,
                row.distribution,
                if row.vary { "vary" } else { "" },
            );
        }
    }

    match &view.fit {
        FitView::Current(result) => out.push_str(&render_fit(result)),
        FitView::Stale => out.push_str("last fit is out of date\n"),
        FitView::None => {}
    }

    if view.data_points.is_some() && view.model.is_some() {
        match &view.residuals {
            Some(stats) => {
                let _ = writeln!(
                    out,
                    "residuals: chi2 {:.4} | rms {:.4} | max |r| {:.4} over {} points",
                    stats.chi_squared, stats.rms, stats.max_abs, stats.points
                );
            }
            None => out.push_str("residuals: unavailable\n"),
        }
    }
    out
}

pub fn render_fit(result: &FitResult) -> String {
    let mut out = format!(
        "fit: reduced chi2 {:.4} after {} evaluations\n",
        result.chi_squared, result.evaluations
    );
    for (name, fitted) in &result.parameters {
        let _ = match fitted.stderr {
            Some(stderr) => writeln!(out, "  {name} = {:.6} +/- {stderr:.6}", fitted.value),
            None => writeln!(out, "  {name} = {:.6}", fitted.value),
        };
    }
    out
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
