use std::{collections::HashMap, io::Write};

use super::*;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn file_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "anthropic_model = \"claude-test\"\nmax_tool_rounds = 3\ntools_enabled = true\nlog_filter = \"debug\""
    )
    .expect("write config");

    let settings = load_settings(Some(file.path())).expect("load");
    assert_eq!(settings.anthropic_model, "claude-test");
    assert_eq!(settings.max_tool_rounds, 3);
    assert!(settings.tools_enabled);
    assert_eq!(settings.log_filter, "debug");
    assert_eq!(settings.max_tokens, 4096);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    let err = load_settings(Some(&missing)).expect_err("missing file");
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn unknown_file_keys_are_rejected() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "fit_speed = 11").is_err());
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_key_wins_over_plain_key() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        env(&[("ANTHROPIC_API_KEY", "plain"), ("APP__ANTHROPIC_API_KEY", "prefixed")]),
    );
    assert_eq!(settings.anthropic_api_key.as_deref(), Some("prefixed"));
}

#[test]
fn blank_api_key_counts_as_missing() {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, env(&[("ANTHROPIC_API_KEY", "  ")]));
    assert_eq!(settings.anthropic_api_key, None);
}

#[test]
fn unparseable_numeric_overrides_are_ignored() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        env(&[
            ("APP__MAX_TOOL_ROUNDS", "lots"),
            ("APP__FIT_MAX_EVALUATIONS", "250"),
            ("APP__TOOLS_ENABLED", "true"),
        ]),
    );
    assert_eq!(settings.max_tool_rounds, 10);
    assert_eq!(settings.fit_max_evaluations, 250);
    assert!(settings.tools_enabled);
}

#[test]
fn session_settings_carry_the_core_subset() {
    let settings = Settings {
        tools_enabled: true,
        max_tool_rounds: 4,
        fit_warn_after_secs: 2,
        ..Settings::default()
    };
    let session = settings.session_settings();
    assert!(session.tools_enabled);
    assert_eq!(session.max_tool_rounds, 4);
    assert_eq!(session.fit_warn_after, Duration::from_secs(2));
}
