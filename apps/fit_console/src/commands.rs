//! Console commands typed at the prompt. Anything not starting with `:` is chat.

use std::path::PathBuf;

use serde_json::Value;
use session_core::{VaryPreset, WidgetValue};

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    LoadData(PathBuf),
    SelectModel(String),
    Edit { key: String, value: WidgetValue },
    ApplyParameters,
    ApplyPolydispersity,
    Preset(VaryPreset),
    Fit,
    Tools(bool),
    Tool { name: String, arguments: Value },
    State,
    ClearChat,
    Help,
    Quit,
    Chat(String),
}

pub const HELP: &str = "\
:data <path>            load a Q, I(Q)[, dI(Q)] file
:model <name>           select a model
:edit <key> <value>     edit a widget (value_radius 50, vary_radius true, pd_type_radius schulz)
:apply                  apply the parameter table
:apply-pd               apply the polydispersity table
:preset <name>          fit-scale-background | fit-all | fix-all
:fit                    run a fit
:tools on|off           toggle AI tools
:tool <name> [json]     call a tool directly
:state                  print the state context sent with chat messages
:clear                  clear the chat history
:quit                   exit
anything else is sent to the assistant";

/// Returns `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Some(ConsoleCommand::Chat(line.to_string())));
    };

    let (verb, args) = match rest.split_once(char::is_whitespace) {
        Some((verb, args)) => (verb, args.trim()),
        None => (rest, ""),
    };

    let command = match verb {
        "data" => ConsoleCommand::LoadData(PathBuf::from(required(verb, args)?)),
        "model" => ConsoleCommand::SelectModel(required(verb, args)?.to_string()),
        "edit" => {
            let (key, raw) = required(verb, args)?
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: :edit <key> <value>".to_string())?;
            ConsoleCommand::Edit {
                key: key.to_string(),
                value: parse_widget_value(key, raw.trim()),
            }
        }
        "apply" => ConsoleCommand::ApplyParameters,
        "apply-pd" => ConsoleCommand::ApplyPolydispersity,
        "preset" => ConsoleCommand::Preset(required(verb, args)?.parse()?),
        "fit" => ConsoleCommand::Fit,
        "tools" => match args {
            "on" => ConsoleCommand::Tools(true),
            "off" => ConsoleCommand::Tools(false),
            _ => return Err("usage: :tools on|off".to_string()),
        },
        "tool" => {
            let (name, raw) = match required(verb, args)?.split_once(char::is_whitespace) {
                Some((name, raw)) => (name, raw.trim()),
                None => (args, "{}"),
            };
            let arguments = serde_json::from_str(raw)
                .map_err(|e| format!("tool arguments must be JSON: {e}"))?;
            ConsoleCommand::Tool {
                name: name.to_string(),
                arguments,
            }
        }
        "state" => ConsoleCommand::State,
        "clear" => ConsoleCommand::ClearChat,
        "help" => ConsoleCommand::Help,
        "quit" | "q" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command ':{other}' (try :help)")),
    };
    Ok(Some(command))
}

fn required<'a>(verb: &str, args: &'a str) -> Result<&'a str, String> {
    if args.is_empty() {
        Err(format!(":{verb} needs an argument (try :help)"))
    } else {
        Ok(args)
    }
}

/// Point counts are integers; every other numeric widget is a float.
fn parse_widget_value(key: &str, raw: &str) -> WidgetValue {
    if let Ok(flag) = raw.parse::<bool>() {
        return WidgetValue::Bool(flag);
    }
    if key.starts_with("pd_n_") {
        if let Ok(n) = raw.parse::<i64>() {
            return WidgetValue::Int(n);
        }
    }
    match raw.parse::<f64>() {
        Ok(v) => WidgetValue::Float(v),
        Err(_) => WidgetValue::Text(raw.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
