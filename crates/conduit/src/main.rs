//! Conduit - run a graph of event pipelines
//!
//! # Usage
//!
//! ```bash
//! # Run the pipelines of a configuration file
//! conduit run --config conduit.toml
//!
//! # Check a configuration without running it
//! conduit validate --config conduit.toml
//! ```

mod cmd;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use conduit_config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Conduit - run a graph of event pipelines
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "CONDUIT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipelines (default)
    Run,

    /// Check a configuration and print its pipelines
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cmd::resolve_config_path(cli.config)?;

    match cli.command {
        Some(Command::Validate) => cmd::validate::run(&config_path),
        Some(Command::Run) | None => {
            let (level, format) = resolve_logging(cli.log_level.as_deref(), &config_path);
            init_logging(&level, format)?;
            cmd::run::run(&config_path).await
        }
    }
}

/// Resolve log level and format: CLI flag > config file > defaults
fn resolve_logging(cli_level: Option<&str>, config_path: &Path) -> (String, LogFormat) {
    let config = config_path
        .exists()
        .then(|| Config::from_file(config_path).ok())
        .flatten();

    let format = config.as_ref().map(|c| c.log.format).unwrap_or_default();
    let level = match (cli_level, &config) {
        (Some(level), _) => level.to_string(),
        (None, Some(config)) => config.log.level.as_str().to_string(),
        (None, None) => "info".to_string(),
    };
    (level, format)
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let layer = fmt::layer().with_target(true).with_thread_ids(false);
    let layer = match format {
        LogFormat::Console => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    Ok(())
}
