//! Nimbus - US weather over the Model Context Protocol
//!
//! Main entry point for the Nimbus CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{call, config, serve, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Nimbus - US weather over the Model Context Protocol
#[derive(Parser)]
#[command(name = "nimbus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding nimbus.toml (default: current directory)
    #[arg(long, global = true, env = "NIMBUS_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the weather server on stdin/stdout
    Serve(serve::ServeArgs),

    /// List the tools the weather server offers
    Tools(tools::ToolsArgs),

    /// Look up the weather through the server
    Call(call::CallArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),
}

/// Crates whose spans and events the console shows.
const LOG_TARGETS: &[&str] = &[
    "nimbus",
    "nimbus_mcp",
    "nimbus_agent",
    "nimbus_weather",
    "nimbus_config",
];

fn console_filter(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = nimbus_config::load_config(cli.project_dir.as_deref())?;
    let logging = loaded.config.logging();

    // Console goes to stderr: stdout carries protocol frames under `serve`.
    let console_env = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(console_filter(&logging.level, cli.verbose))
        });

    let log_dir = logging.dir.clone().or_else(|| {
        nimbus_config::xdg_config_dir().map(|d| d.join("logs"))
    });
    let (file_writer, _guard) = match log_dir {
        Some(dir) if logging.file => {
            let appender = tracing_appender::rolling::daily(dir, "nimbus.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        _ => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_env),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(file_filter()))
        }))
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Call(args) => call::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

fn file_filter() -> String {
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}=trace"))
        .collect();
    directives.push("info".to_string());
    directives.join(",")
}
