//! # Local Feed
//!
//! Command-line front end of the dashboard aggregation layer. Each subcommand
//! resolves one resource and prints it as JSON on stdout; logs go to stderr.
//!
//! ## Usage
//!
//! ```sh
//! local_feed news --category sports
//! local_feed snapshot --output-dir ./out --every 120
//! ```

use clap::Parser;
use serde::Serialize;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command};
use local_feed::config::DashboardConfig;
use local_feed::outputs::json;
use local_feed::utils::ensure_writable_dir;
use local_feed::Dashboard;

/// Print one resource outcome; a failed resource prints `{"error": ...}` and fails the process.
fn emit<T: Serialize>(outcome: local_feed::Result<T>, pretty: bool) -> Result<(), Box<dyn Error>> {
    println!("{}", json::render_outcome(&outcome, pretty)?);
    outcome.map(|_| ()).map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("local_feed starting up");

    let args = Cli::parse();
    debug!(?args.command, ?args.config, "Parsed CLI arguments");

    let mut config = match &args.config {
        Some(path) => DashboardConfig::load(path).await?,
        None => DashboardConfig::default(),
    };
    if let Some(timeout_ms) = args.timeout_ms {
        config.settings.fetch_timeout_ms = timeout_ms;
    }
    let dashboard = Dashboard::with_fetcher(config)?;

    match args.command {
        Command::News { category } => emit(dashboard.news(&category).await, args.pretty)?,
        Command::Weather { location } => emit(dashboard.weather(&location).await, args.pretty)?,
        Command::Stocks => emit(dashboard.stocks().await, args.pretty)?,
        Command::Fx => emit(dashboard.fx().await, args.pretty)?,
        Command::Meta => emit(Ok(dashboard.meta()), args.pretty)?,
        Command::Snapshot { output_dir, every } => {
            // Early check: ensure the output dir is writable
            if let Err(e) = ensure_writable_dir(&output_dir).await {
                error!(
                    path = %output_dir,
                    error = %e,
                    "Output directory is not writable (fix perms or choose a different path)"
                );
                return Err(e.into());
            }

            loop {
                let report = json::write_snapshot(&dashboard, &output_dir, args.pretty).await?;
                info!(written = report.written, failed = report.failed, "Snapshot pass complete");
                match every {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs.max(1))).await,
                    None => break,
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
