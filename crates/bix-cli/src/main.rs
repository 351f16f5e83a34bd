use std::sync::Arc;

use anyhow::Context;
use bix_config::PipelineConfig;
use bix_core::{
    init_logging, BiApiClient, ExportScheduler, MeshCredentials, MeshMailboxClient,
    ProcessToolRunner, RunCoordinator, ShutdownSignal,
};
use bix_types::DateWindow;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "bix", about = "BI referral export to the MESH mailbox", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one export now and print the summary
    Run {
        /// First day of the window (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Day after the window (YYYY-MM-DD, exclusive); defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Run exports on EXPORT_SCHEDULE until Ctrl+C / SIGTERM
    Serve,
    /// Validate configuration and print the resolved settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { from, to } => run_once(config, from, to).await,
        Commands::Serve => serve(config).await,
        Commands::Check => {
            check(&config);
            Ok(())
        }
    }
}

fn build_coordinator(config: PipelineConfig) -> anyhow::Result<RunCoordinator> {
    let source = BiApiClient::from_config(&config).context("Failed to build reporting client")?;
    let credentials =
        MeshCredentials::load(&config).context("Failed to load mailbox credentials")?;
    let transport =
        MeshMailboxClient::new(&config, credentials).context("Failed to build mailbox client")?;
    Ok(RunCoordinator::new(
        config,
        Arc::new(source),
        Arc::new(ProcessToolRunner),
        Arc::new(transport),
    ))
}

fn resolve_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    lookback_days: u32,
) -> anyhow::Result<DateWindow> {
    let lookback = Duration::days(i64::from(lookback_days));
    let window = match (from, to) {
        (None, None) => DateWindow::ending_at(Utc::now(), lookback_days)?,
        (Some(from), None) => DateWindow::from_dates(from, Utc::now().date_naive())?,
        (None, Some(to)) => DateWindow::from_dates(to - lookback, to)?,
        (Some(from), Some(to)) => DateWindow::from_dates(from, to)?,
    };
    Ok(window)
}

async fn run_once(
    config: PipelineConfig,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_file.as_deref(), config.log_json);

    let window = resolve_window(from, to, config.export_lookback_days)?;
    let coordinator = build_coordinator(config)?;

    let summary = coordinator.run(window).await.context("Export failed")?;
    println!("{summary}");
    Ok(())
}

async fn serve(config: PipelineConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_file.as_deref(), config.log_json);
    info!("bix scheduler starting...");

    let coordinator = Arc::new(build_coordinator(config)?);
    let scheduler =
        ExportScheduler::from_config(coordinator).context("Failed to parse EXPORT_SCHEDULE")?;

    let shutdown = ShutdownSignal::new();
    let listener = shutdown.subscribe();
    tokio::spawn(async move { shutdown.request_on_os_signal().await });

    info!("bix is running. Press Ctrl+C to stop.");
    let handle = tokio::spawn(async move { scheduler.run_until_shutdown(listener).await });
    if let Err(e) = handle.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }

    info!("bix stopped.");
    Ok(())
}

fn check(config: &PipelineConfig) {
    println!("Configuration OK");
    for (key, value) in config.describe() {
        println!("  {key:<34} {value}");
    }
}
