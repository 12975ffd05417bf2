use serde_json::json;
use shared::protocol::ToolCall;

use super::*;
use crate::test_support::{ready_session, ready_session_with, sample_dataset, session_with, ScriptedEngine};

#[test]
fn selecting_a_model_resets_widgets_and_flags() {
    let mut session = ready_session("sphere");
    session
        .user_input("value_radius", WidgetValue::Float(75.0))
        .expect("edit");
    session
        .user_input("pd_width_radius", WidgetValue::Float(0.3))
        .expect("edit pd");
    session.bridge.set_fit_completed(true).expect("flag");

    let parameters = session.select_model("cylinder").expect("select");
    assert!(parameters.contains("length"));

    let bridge = session.bridge();
    assert!(bridge.store().parameter_keys().is_empty());
    assert_eq!(bridge.pd_widget("radius").width, None);
    assert_eq!(bridge.current_model(), Some("cylinder"));
    assert!(bridge.model_selected());
    assert!(!bridge.fit_completed());
    assert!(bridge.needs_rerun());
}

#[test]
fn next_render_rebuilds_widgets_from_the_new_model_defaults() {
    let mut session = ready_session("sphere");
    assert_eq!(session.bridge().parameter_value("radius"), Some(60.0));

    session.select_model("cylinder").expect("select");
    assert_eq!(session.bridge().parameter_value("radius"), None);

    let view = session.render_pass().expect("render");
    assert!(view.full_redraw);
    assert_eq!(session.bridge().parameter_value("radius"), Some(20.0));
    assert_eq!(session.bridge().parameter_value("length"), Some(400.0));
}

#[test]
fn unknown_model_leaves_session_untouched() {
    let mut session = ready_session("sphere");
    let before = session.bridge().store().snapshot();

    let err = session.select_model("teapot").expect_err("unknown model");
    assert_eq!(
        err,
        SessionError::Engine(EngineError::UnknownModel("teapot".to_string()))
    );
    assert_eq!(session.bridge().store().snapshot(), before);
    assert_eq!(session.engine().model_name(), Some("sphere"));
}

#[test]
fn loading_data_marks_previous_fit_stale() {
    let mut session = session_with(ScriptedEngine::ok(), false);
    session.bridge.set_fit_completed(true).expect("flag");
    session.load_data(sample_dataset()).expect("load");

    assert!(session.bridge().data_loaded());
    assert!(!session.bridge().fit_completed());
    assert!(session.bridge().needs_rerun());
    assert_eq!(session.engine().data().map(|d| d.len()), Some(20));
}

#[test]
fn unchanged_widgets_apply_nothing() {
    let mut session = ready_session("sphere");
    assert_eq!(session.apply_parameter_edits().expect("apply"), 0);
    assert_eq!(session.engine().parameters().get("background").map(|p| p.max), Some(f64::INFINITY));
}

#[test]
fn edited_widgets_reach_the_domain_on_apply() {
    let mut session = ready_session("sphere");
    session.bridge.set_fit_completed(true).expect("flag");
    session
        .user_input("value_radius", WidgetValue::Float(45.0))
        .expect("edit value");
    session
        .user_input("vary_radius", WidgetValue::Bool(true))
        .expect("edit vary");
    session
        .user_input("max_radius", WidgetValue::Float(500.0))
        .expect("edit max");

    assert_eq!(session.apply_parameter_edits().expect("apply"), 1);
    let radius = session.engine().parameters().get("radius").expect("radius");
    assert_eq!(radius.value, 45.0);
    assert_eq!(radius.max, 500.0);
    assert!(radius.vary);
    assert!(!session.bridge().fit_completed());
}

#[test]
fn inverted_bounds_are_refused_before_the_domain_changes() {
    let mut session = ready_session("sphere");
    session
        .user_input("min_radius", WidgetValue::Float(90.0))
        .expect("edit min");
    session
        .user_input("max_radius", WidgetValue::Float(10.0))
        .expect("edit max");

    let err = session.apply_parameter_edits().expect_err("min above max");
    assert!(matches!(err, SessionError::InvalidInput { ref key, .. } if key == "radius"));
    let radius = session.engine().parameters().get("radius").expect("radius");
    assert_eq!((radius.min, radius.max), (0.0, f64::INFINITY));
}

#[test]
fn failed_apply_rolls_back_earlier_parameters() {
    let mut session = ready_session_with(ScriptedEngine::ok().fail_update_on("radius"), "sphere");
    session
        .user_input("value_scale", WidgetValue::Float(3.0))
        .expect("edit scale");
    session
        .user_input("value_radius", WidgetValue::Float(45.0))
        .expect("edit radius");

    let err = session.apply_parameter_edits().expect_err("radius update fails");
    assert!(matches!(err, SessionError::Engine(EngineError::Numerical(_))));
    let parameters = session.engine().parameters();
    assert_eq!(parameters.get("scale").map(|p| p.value), Some(1.0));
    assert_eq!(parameters.get("radius").map(|p| p.value), Some(60.0));
}

#[test]
fn polydispersity_edits_follow_the_master_toggle() {
    let mut session = ready_session("sphere");
    session
        .user_input("pd_enabled", WidgetValue::Bool(true))
        .expect("toggle");
    session
        .user_input("pd_width_radius", WidgetValue::Float(0.2))
        .expect("width");
    session
        .user_input("pd_type_radius", WidgetValue::Text("lognormal".to_string()))
        .expect("type");
    session
        .user_input("pd_n_radius", WidgetValue::Int(50))
        .expect("points");

    assert_eq!(session.apply_pd_edits().expect("apply"), 1);
    assert!(session.engine().polydispersity_enabled());
    let config = session.engine().polydispersity("radius").expect("config");
    assert_eq!(config.width, 0.2);
    assert_eq!(config.distribution, Distribution::Lognormal);
    assert_eq!(config.n_points, 50);

    session
        .user_input("pd_enabled", WidgetValue::Bool(false))
        .expect("toggle off");
    assert_eq!(session.apply_pd_edits().expect("apply"), 0);
    assert!(!session.engine().polydispersity_enabled());
}

#[test]
fn unknown_distribution_in_the_widget_is_invalid_input() {
    let mut session = ready_session("sphere");
    session
        .user_input("pd_type_radius", WidgetValue::Text("cauchy".to_string()))
        .expect("type");
    let err = session.apply_pd_edits().expect_err("bad distribution");
    assert!(matches!(err, SessionError::InvalidInput { ref key, .. } if key == "pd_type_radius"));
    assert_eq!(
        session.engine().polydispersity("radius").map(|c| c.distribution),
        Some(Distribution::Gaussian)
    );
}

#[test]
fn presets_update_domain_and_widgets_together() {
    let mut session = ready_session("sphere");
    session.apply_preset(VaryPreset::FitScaleBackground).expect("preset");

    let varied: Vec<String> = session
        .engine()
        .parameters()
        .iter()
        .filter(|p| p.vary)
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(varied, vec!["scale".to_string(), "background".to_string()]);
    assert_eq!(
        session.bridge().parameter_widget("scale").vary,
        Some(true)
    );
    assert_eq!(
        session.bridge().parameter_widget("radius").vary,
        Some(false)
    );
    assert!(session.bridge().needs_rerun());

    session.render_pass().expect("render");
    session.apply_preset(VaryPreset::FixAll).expect("preset");
    assert!(!session.engine().parameters().any_vary());
}

#[test]
fn preset_names_parse() {
    assert_eq!("fit-all".parse::<VaryPreset>(), Ok(VaryPreset::FitAll));
    assert_eq!(
        VaryPreset::FitScaleBackground.as_str().parse::<VaryPreset>(),
        Ok(VaryPreset::FitScaleBackground)
    );
    assert!("fit-some".parse::<VaryPreset>().is_err());
}

#[test]
fn fit_mirrors_varied_values_and_marks_completion() {
    let mut session = ready_session("sphere");
    session.apply_preset(VaryPreset::FitScaleBackground).expect("preset");
    session.render_pass().expect("render");

    let result = session.run_fit().expect("fit");
    assert_eq!(result.chi_squared, 1.25);
    assert!(session.bridge().fit_completed());
    assert_eq!(session.fit_status(), &FitStatus::Completed);
    assert_eq!(session.bridge().parameter_value("scale"), Some(1.01));
    assert_eq!(session.bridge().parameter_value("radius"), Some(60.0));
    assert!(session.bridge().needs_rerun());
}

#[test]
fn fit_without_anything_to_vary_is_not_attempted() {
    let mut session = ready_session("sphere");
    let err = session.run_fit().expect_err("nothing varies");
    assert!(matches!(err, SessionError::NotReady(message) if message.contains("vary=true")));
    assert_eq!(session.engine().fit_calls, 0);
    assert!(!session.bridge().fit_completed());
}

#[test]
fn failed_fit_is_recorded_in_the_status_only() {
    let mut session = ready_session_with(ScriptedEngine::failing("singular matrix"), "sphere");
    session.apply_preset(VaryPreset::FitAll).expect("preset");
    session.render_pass().expect("render");
    let before = session.bridge().store().snapshot();

    let err = session.run_fit().expect_err("fit fails");
    assert!(matches!(err, SessionError::Engine(EngineError::Numerical(_))));
    assert!(matches!(session.fit_status(), FitStatus::Failed(message) if message.contains("singular matrix")));
    assert_eq!(session.bridge().store().snapshot(), before);
}

#[test]
fn human_mutations_are_refused_while_a_pass_is_open() {
    let mut session = ready_session("sphere");
    session.bridge.begin_pass().expect("begin pass");

    assert_eq!(
        session.select_model("cylinder").expect_err("pass open"),
        SessionError::Bridge(BridgeError::PassAlreadyOpen)
    );
    assert!(session.apply_parameter_edits().is_err());
    assert!(session.run_fit().is_err());
    assert_eq!(session.engine().model_name(), Some("sphere"));
}

#[test]
fn state_context_describes_data_model_and_tools() {
    let mut session = session_with(ScriptedEngine::ok(), false);
    assert_eq!(
        session.state_context(),
        "No data loaded\nNo model selected\nAI tools enabled: false"
    );

    session.load_data(sample_dataset()).expect("load");
    session.select_model("sphere").expect("select");
    let context = session.state_context();
    assert!(context.starts_with("Data loaded: 20 points, Q range [0.0050, 0.1000]"));
    assert!(context.contains("Current model: sphere"));
    assert!(context.contains("  radius: 60 (vary: false)"));
    assert!(!context.contains("Last fit chi-square"));
}

#[test]
fn tools_switch_is_a_widget_key() {
    let mut session = session_with(ScriptedEngine::ok(), false);
    assert!(!session.tools_enabled());
    session.set_tools_enabled(true).expect("enable");
    assert!(session.tools_enabled());
    assert_eq!(
        session.bridge().store().get("ai_tools_enabled"),
        Some(&WidgetValue::Bool(true))
    );
}

#[test]
fn history_can_be_cleared() {
    let mut session = session_with(ScriptedEngine::ok(), false);
    session.history.push(ChatEntry::new(shared::protocol::ChatRole::User, "hello"));
    assert_eq!(session.history().len(), 1);
    session.clear_history();
    assert!(session.history().is_empty());
}

#[test]
fn pd_width_above_the_display_range_survives_an_apply() {
    let mut session = ready_session("sphere");
    let invocation = session.dispatch(&ToolCall::local(
        "enable-polydispersity",
        json!({ "parameter_name": "radius", "pd_value": 2.0 }),
    ));
    assert!(invocation.success, "{}", invocation.result);
    session.render_pass().expect("render");
    assert_eq!(session.bridge().pd_widget("radius").width, Some(1.0));

    assert_eq!(session.apply_pd_edits().expect("apply"), 0);
    assert_eq!(
        session.engine().polydispersity("radius").map(|c| c.width),
        Some(2.0)
    );
}

#[test]
fn edits_to_unknown_widgets_are_refused() {
    let mut session = ready_session("sphere");
    let before = session.bridge().store().snapshot();

    let err = session
        .user_input("value_bogus", WidgetValue::Float(3.0))
        .expect_err("no such parameter");
    assert!(matches!(err, SessionError::InvalidInput { ref key, .. } if key == "value_bogus"));
    assert!(session
        .user_input("pd_width_scale", WidgetValue::Float(0.1))
        .is_err());
    assert_eq!(session.bridge().store().snapshot(), before);

    session.render_pass().expect("render");
    assert!(!session.bridge().store().parameter_keys().contains("value_bogus"));
}

#[test]
fn global_flags_are_not_human_editable() {
    let mut session = ready_session("sphere");
    for key in ["fit_completed", "needs_rerun", "current_model", "model_selected"] {
        assert!(
            matches!(
                session.user_input(key, WidgetValue::Bool(true)),
                Err(SessionError::InvalidInput { .. })
            ),
            "{key} should be refused"
        );
    }
    assert!(!session.bridge().fit_completed());
    assert!(!session.bridge().needs_rerun());

    session
        .user_input("pd_enabled", WidgetValue::Bool(true))
        .expect("pd toggle");
    session
        .user_input("ai_tools_enabled", WidgetValue::Bool(false))
        .expect("tools toggle");
    assert!(!session.tools_enabled());
}
