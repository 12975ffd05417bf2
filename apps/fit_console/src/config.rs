use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use session_core::SessionSettings;

pub const DEFAULT_CONFIG_FILE: &str = "sans_fit.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub max_tokens: u32,
    pub max_tool_rounds: usize,
    pub tools_enabled: bool,
    pub fit_max_evaluations: usize,
    pub fit_warn_after_secs: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".into(),
            anthropic_base_url: "https://api.anthropic.com".into(),
            max_tokens: 4096,
            max_tool_rounds: 10,
            tools_enabled: false,
            fit_max_evaluations: 4000,
            fit_warn_after_secs: 5,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tools_enabled: self.tools_enabled,
            fit_warn_after: Duration::from_secs(self.fit_warn_after_secs),
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

/// Keys accepted in the TOML file. Anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    anthropic_api_key: Option<String>,
    anthropic_model: Option<String>,
    anthropic_base_url: Option<String>,
    max_tokens: Option<u32>,
    max_tool_rounds: Option<usize>,
    tools_enabled: Option<bool>,
    fit_max_evaluations: Option<usize>,
    fit_warn_after_secs: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then the TOML file, then environment overrides.
///
/// An explicit `path` must exist; the default `sans_fit.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    if required || path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file.anthropic_api_key {
        settings.anthropic_api_key = Some(v);
    }
    if let Some(v) = file.anthropic_model {
        settings.anthropic_model = v;
    }
    if let Some(v) = file.anthropic_base_url {
        settings.anthropic_base_url = v;
    }
    if let Some(v) = file.max_tokens {
        settings.max_tokens = v;
    }
    if let Some(v) = file.max_tool_rounds {
        settings.max_tool_rounds = v;
    }
    if let Some(v) = file.tools_enabled {
        settings.tools_enabled = v;
    }
    if let Some(v) = file.fit_max_evaluations {
        settings.fit_max_evaluations = v;
    }
    if let Some(v) = file.fit_warn_after_secs {
        settings.fit_warn_after_secs = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
    Ok(())
}

pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ANTHROPIC_API_KEY") {
        settings.anthropic_api_key = Some(v);
    }
    if let Some(v) = lookup("APP__ANTHROPIC_API_KEY") {
        settings.anthropic_api_key = Some(v);
    }
    if settings
        .anthropic_api_key
        .as_deref()
        .is_some_and(|key| key.trim().is_empty())
    {
        settings.anthropic_api_key = None;
    }

    if let Some(v) = lookup("APP__ANTHROPIC_MODEL") {
        settings.anthropic_model = v;
    }
    if let Some(v) = lookup("APP__ANTHROPIC_BASE_URL") {
        settings.anthropic_base_url = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Some(parsed) = lookup("APP__MAX_TOKENS").and_then(|v| v.parse().ok()) {
        settings.max_tokens = parsed;
    }
    if let Some(parsed) = lookup("APP__MAX_TOOL_ROUNDS").and_then(|v| v.parse().ok()) {
        settings.max_tool_rounds = parsed;
    }
    if let Some(parsed) = lookup("APP__TOOLS_ENABLED").and_then(|v| v.parse().ok()) {
        settings.tools_enabled = parsed;
    }
    if let Some(parsed) = lookup("APP__FIT_MAX_EVALUATIONS").and_then(|v| v.parse().ok()) {
        settings.fit_max_evaluations = parsed;
    }
    if let Some(parsed) = lookup("APP__FIT_WARN_AFTER_SECS").and_then(|v| v.parse().ok()) {
        settings.fit_warn_after_secs = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
