use std::collections::BTreeMap;

use session_core::{ParameterRow, PdRow, ResidualStats};
use shared::domain::{FitStatus, FittedParameter};

use super::*;

fn view() -> PanelView {
    PanelView {
        pass: 3,
        full_redraw: true,
        tools_enabled: true,
        model: Some("sphere".to_string()),
        structure_factor: Some("hardsphere".to_string()),
        data_points: Some(20),
        parameters: vec![ParameterRow {
            name: "radius".to_string(),
            value: 45.0,
            min: 0.0,
            max: f64::INFINITY,
            vary: true,
        }],
        pd_enabled: true,
        polydispersity: vec![PdRow {
            name: "radius".to_string(),
            width: 0.1,
            n_points: 35,
            distribution: "schulz".to_string(),
            vary: false,
        }],
        fit_status: FitStatus::Completed,
        fit: FitView::Stale,
        residuals: None,
    }
}

#[test]
fn header_and_tables_are_rendered() {
    let text = render_panel(&view());
    assert!(text.starts_with("== pass 3 (redraw) | tools on | fit completed"));
    assert!(text.contains("data: 20 points | model: sphere@hardsphere"));
    assert!(text.contains("radius"));
    assert!(text.contains("inf"));
    assert!(text.contains("polydispersity on"));
    assert!(text.contains("schulz"));
    assert!(text.contains("last fit is out of date"));
    assert!(text.contains("residuals: unavailable"));
}

#[test]
fn residuals_are_omitted_without_data() {
    let mut view = view();
    view.data_points = None;
    view.residuals = Some(ResidualStats {
        points: 1,
        chi_squared: 1.0,
        rms: 1.0,
        max_abs: 1.0,
    });
    assert!(!render_panel(&view).contains("residuals"));
}

#[test]
fn fit_summary_lists_uncertainties() {
    let result = FitResult {
        chi_squared: 1.02,
        parameters: BTreeMap::from([
            (
                "radius".to_string(),
                FittedParameter {
                    value: 45.1,
                    stderr: Some(0.3),
                },
            ),
            (
                "scale".to_string(),
                FittedParameter {
                    value: 1.0,
                    stderr: None,
                },
            ),
        ]),
        evaluations: 321,
    };
    let text = render_fit(&result);
    assert!(text.starts_with("fit: reduced chi2 1.0200 after 321 evaluations"));
    assert!(text.contains("radius = 45.100000 +/- 0.300000"));
    assert!(text.contains("scale = 1.000000\n"));
}
