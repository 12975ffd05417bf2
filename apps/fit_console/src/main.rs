use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod console;
mod transport;
mod view;

use commands::{parse_command, ConsoleCommand};
use config::load_settings;
use console::Console;

#[derive(Parser, Debug)]
#[command(about = "Interactive SANS model fitting with an optional AI assistant")]
struct Args {
    /// TOML settings file (defaults to ./sans_fit.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dataset to load at startup
    #[arg(long)]
    data: Option<PathBuf>,
    /// Model to select at startup
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    tools_enabled: bool,
    /// Read commands from a file instead of stdin
    #[arg(long)]
    script: Option<PathBuf>,
}

enum Input {
    Script(std::vec::IntoIter<String>),
    Stdin(Lines<BufReader<Stdin>>),
}

impl Input {
    async fn open(script: Option<&Path>) -> Result<Self> {
        match script {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read script '{}'", path.display()))?;
                let lines: Vec<String> = raw.lines().map(str::to_string).collect();
                Ok(Self::Script(lines.into_iter()))
            }
            None => Ok(Self::Stdin(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            Input::Script(lines) => {
                let line = lines.next();
                if let Some(line) = &line {
                    println!("> {line}");
                }
                Ok(line)
            }
            Input::Stdin(lines) => {
                print!("> ");
                std::io::stdout().flush()?;
                Ok(lines.next_line().await?)
            }
        }
    }
}

fn report(outcome: Result<String>) {
    match outcome {
        Ok(message) if message.is_empty() => {}
        Ok(message) => println!("{message}"),
        Err(err) => {
            error!("{err:#}");
            println!("error: {err:#}");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if args.tools_enabled {
        settings.tools_enabled = true;
    }

    let filter =
        EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    info!(
        model = %settings.anthropic_model,
        tools_enabled = settings.tools_enabled,
        "fit console starting"
    );

    let mut console = Console::new(&settings);
    if let Some(path) = args.data {
        report(console.execute(ConsoleCommand::LoadData(path)).await);
    }
    if let Some(model) = args.model {
        report(console.execute(ConsoleCommand::SelectModel(model)).await);
    }
    println!("{}", console.render()?);

    let mut input = Input::open(args.script.as_deref()).await?;
    while let Some(line) = input.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        report(console.execute(command).await);
        println!("{}", console.render()?);
    }
    Ok(())
}
