//! Backtest Engine Binary
//!
//! Replays per-instrument CSV price files through the reference strategy,
//! portfolio, execution and statistics collaborators and prints the results
//! as JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin backtest-engine -- --config backtest.yaml --instruments GOOG,MSFT
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (overrides `observability.logging.level`)
//! - Any `${VAR}` referenced by the config file; a `.env` file in the current
//!   or an ancestor directory is loaded first

use std::sync::Arc;

use anyhow::{Context, Result};
use backtest_engine::config::{Config, DEFAULT_CONFIG_PATH, read_config};
use backtest_engine::telemetry::init_tracing;
use backtest_engine::{SessionReport, build_session};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "backtest-engine", version, about = "Event-driven backtest engine")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Testing mode: no heartbeat and no report artifacts.
    #[arg(long)]
    testing: bool,

    /// Instruments to replay, overriding the configuration.
    #[arg(long, value_delimiter = ',')]
    instruments: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();

    let config = resolve_config(&args)?;
    init_tracing(&config.observability.logging);

    tracing::info!(
        config = %args.config,
        dir = %config.data.dir.display(),
        kind = %config.data.kind,
        instruments = ?config.data.instruments,
        "Starting backtest engine"
    );

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let source = Arc::new(config.data.csv_source());
    let session = build_session(&config, source, shutdown_token.clone())
        .context("failed to assemble session")?;

    let report: SessionReport = match tokio::task::spawn_blocking(move || session.run())
        .await
        .context("session thread panicked")?
    {
        Ok(report) => report,
        Err(abort) => {
            let partial = serde_json::to_string_pretty(&abort.partial_results)
                .context("failed to encode partial results")?;
            println!("{partial}");
            return Err(anyhow::Error::new(abort).context("backtest aborted"));
        }
    };

    let json = serde_json::to_string_pretty(&report).context("failed to encode results")?;
    println!("{json}");

    tracing::info!(termination = %report.termination, "Backtest engine stopped");
    Ok(())
}

/// Load the config file and apply command line overrides.
fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = read_config(Some(&args.config))
        .with_context(|| format!("failed to load config from {}", args.config))?;

    if args.testing {
        config.session.testing = true;
    }
    if let Some(instruments) = &args.instruments {
        config.data.instruments.clone_from(instruments);
    }
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", args.config))?;
    Ok(config)
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Cancel the session on Ctrl+C or SIGTERM.
///
/// The loop observes the token at its next cycle boundary and still runs
/// finalization.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, interrupting backtest");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, interrupting backtest");
        }
    }

    shutdown_token.cancel();
}
