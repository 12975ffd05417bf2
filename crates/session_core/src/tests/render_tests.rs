use serde_json::json;
use shared::protocol::ToolCall;

use super::*;
use crate::{
    store::WidgetValue,
    test_support::{ready_session, ready_session_with, session_with, ScriptedEngine},
};

#[test]
fn first_pass_draws_only_the_tools_toggle_without_a_model() {
    let mut session = session_with(ScriptedEngine::ok(), true);
    let view = session.render_pass().expect("render");

    assert_eq!(view.pass, 1);
    assert!(!view.full_redraw);
    assert!(view.tools_enabled);
    assert!(view.parameters.is_empty());
    assert!(view.polydispersity.is_empty());
    assert_eq!(view.fit, FitView::None);
    assert_eq!(view.residuals, None);
    assert!(!session.bridge().pass_open());
}

#[test]
fn rows_show_store_values_over_domain_defaults() {
    let mut session = ready_session("sphere");
    session
        .user_input("value_radius", WidgetValue::Float(33.0))
        .expect("edit");

    let view = session.render_pass().expect("render");
    let radius = view
        .parameters
        .iter()
        .find(|row| row.name == "radius")
        .expect("radius row");
    assert_eq!(radius.value, 33.0);
    assert_eq!(radius.max, crate::bridge::DISPLAY_LIMIT);
    assert_eq!(
        session.engine().parameters().get("radius").map(|p| p.value),
        Some(60.0)
    );
}

#[test]
fn redraw_flag_is_consumed_by_the_next_pass() {
    let mut session = ready_session("sphere");
    session.dispatch(&ToolCall::new(
        "t1",
        "set-parameter",
        json!({ "name": "radius", "value": 50.0 }),
    ));
    assert!(session.bridge().needs_rerun());

    let view = session.render_pass().expect("render");
    assert!(view.full_redraw);
    assert!(!session.bridge().needs_rerun());
    let radius = view
        .parameters
        .iter()
        .find(|row| row.name == "radius")
        .expect("radius row");
    assert_eq!(radius.value, 50.0);

    let quiet = session.render_pass().expect("render");
    assert!(!quiet.full_redraw);
    assert_eq!(quiet.pass, view.pass + 1);
}

#[test]
fn polydispersity_rows_appear_for_size_parameters() {
    let mut session = ready_session("cylinder");
    let view = session.render_pass().expect("render");

    let names: Vec<&str> = view.polydispersity.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(names, vec!["length", "radius"]);
    let radius = &view.polydispersity[1];
    assert_eq!(radius.width, 0.0);
    assert_eq!(radius.n_points, 35);
    assert_eq!(radius.distribution, "gaussian");
    assert!(!view.pd_enabled);
}

#[test]
fn fit_view_distinguishes_current_and_stale_results() {
    let mut session = ready_session("sphere");
    session
        .dispatch(&ToolCall::new("t1", "set-parameter", json!({ "name": "scale", "vary": true })));
    session.render_pass().expect("render");
    session.run_fit().expect("fit");

    let view = session.render_pass().expect("render");
    assert!(matches!(view.fit, FitView::Current(ref result) if result.chi_squared == 1.25));
    assert_eq!(view.fit_status, FitStatus::Completed);

    session
        .dispatch(&ToolCall::new("t2", "set-parameter", json!({ "name": "radius", "value": 70.0 })));
    let view = session.render_pass().expect("render");
    assert_eq!(view.fit, FitView::Stale);
}

#[test]
fn residual_statistics_follow_the_model_curve() {
    let mut session = ready_session("sphere");
    let view = session.render_pass().expect("render");
    let stats = view.residuals.expect("residuals");

    assert_eq!(stats.points, 20);
    // Scripted curve sits at 90% of the data with 5% uncertainty: every
    // normalised residual is exactly 2.
    assert!((stats.rms - 2.0).abs() < 1e-9);
    assert!((stats.max_abs - 2.0).abs() < 1e-9);
    assert!((stats.chi_squared - 80.0).abs() < 1e-9);
}

#[test]
fn unavailable_residuals_do_not_break_the_pass() {
    let mut session = ready_session_with(ScriptedEngine::ok().failing_curve(), "sphere");
    let view = session.render_pass().expect("render");
    assert_eq!(view.residuals, None);
    assert!(!view.parameters.is_empty());
}

#[test]
fn a_pass_cannot_start_inside_another() {
    let mut session = ready_session("sphere");
    session.bridge.begin_pass().expect("begin pass");
    assert_eq!(session.render_pass(), Err(BridgeError::PassAlreadyOpen));
    session.bridge.end_pass().expect("end pass");
    session.render_pass().expect("render after close");
}
