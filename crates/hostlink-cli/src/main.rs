mod cli;
mod commands;
mod completions;
mod config;
mod error;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error::handle_error(err);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return Ok(());
    }

    let config = config::CliConfig::load(cli.config.as_deref());
    let log_dir = cli.log_dir.clone().or_else(|| config.log.dir.clone());
    let _guard = init_logging(cli.verbose, config.log.filter.as_deref(), log_dir)?;

    match cli.command {
        Commands::Run(args) => {
            let channel = config.channel_config(&args.channel)?;
            commands::run::run(channel, args.stay).await
        }
        Commands::Config(args) => {
            let channel = config.channel_config(&args.channel)?;
            commands::config::run(channel, args.format)
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Logs go to stderr (stdout carries envelopes) and, with a log directory,
/// to a daily rolling file as well.
fn init_logging(
    verbose: bool,
    filter: Option<&str>,
    log_dir: Option<std::path::PathBuf>,
) -> Result<Option<WorkerGuard>> {
    let default_filter = match (verbose, filter) {
        (true, _) => "debug",
        (false, Some(filter)) => filter,
        (false, None) => "warn",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "hostlink.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(Some(guard))
}
