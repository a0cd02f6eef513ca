//! cast-send - Scheduler trigger for Castboard
//!
//! Runs a publishing cycle every poll interval, or a single cycle with
//! `--once` (for cron and systemd timers).

use anyhow::Context;
use clap::{Parser, ValueEnum};
use libcastboard::logging::{LogFormat, LoggingConfig};
use libcastboard::service::events::Event;
use libcastboard::service::publisher::{CycleContext, CycleReport, Publisher};
use libcastboard::service::CastboardService;
use libcastboard::{CastboardError, Config};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

const TRIGGER: &str = "cast-send";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SummaryFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cast-send")]
#[command(version)]
#[command(about = "Publish scheduled posts when they fall due")]
#[command(long_about = "\
cast-send - Publish scheduled posts when they fall due

DESCRIPTION:
    cast-send runs a publishing cycle at a fixed interval. Each cycle selects
    every scheduled post whose time has passed, delivers it to each of its
    targets and records the outcome in the activity log.

USAGE:
    # Run in foreground (logs to stderr)
    cast-send

    # Run a single cycle and print a summary
    cast-send --once

    # Custom poll interval, JSON logs
    cast-send --poll-interval 30 --log-format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/castboard/config.toml (or CASTBOARD_CONFIG)
    Database location: [database] path (or CASTBOARD_DB_PATH)

    [scheduling]
    poll_interval = 60  # seconds between cycles
    workers = 1         # posts processed concurrently
    claim_lease = 300   # seconds a claimed post stays reserved

EXIT CODES:
    0 - Clean shutdown, or --once cycle completed
    1 - Publishing cycle failed
    2 - Configuration or database error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_name = "FORMAT", env = "CASTBOARD_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Summary format printed by --once
    #[arg(long, value_enum, default_value = "text")]
    format: SummaryFormat,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging_config(&cli).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Environment settings, with the command line taking precedence
fn logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = LoggingConfig::from_env();
    config.format = cli.log_format;
    config.verbose = cli.verbose;
    config
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<CastboardError>()
        .map(CastboardError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let poll_interval = cli.poll_interval.unwrap_or(config.scheduling.poll_interval).max(1);

    let service = CastboardService::from_config(config)
        .await
        .context("Failed to open database")?;

    spawn_event_logger(&service);

    if cli.once {
        let report = run_cycle(service.publisher()).await?;
        print_summary(&report, cli.format)?;
        return Ok(());
    }

    info!("cast-send starting, poll interval {}s", poll_interval);

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    run_daemon_loop(service.publisher(), poll_interval, shutdown).await;

    info!("cast-send stopped");
    Ok(())
}

async fn run_cycle(publisher: &Publisher) -> anyhow::Result<CycleReport> {
    let ctx = CycleContext::new(TRIGGER);
    publisher
        .run_cycle(&ctx)
        .await
        .map_err(|e| anyhow::anyhow!("Publishing cycle {} failed: {}", ctx.cycle_id, e))
}

fn print_summary(report: &CycleReport, format: SummaryFormat) -> anyhow::Result<()> {
    match format {
        SummaryFormat::Json => println!("{}", serde_json::to_string(report)?),
        SummaryFormat::Text => println!(
            "cycle {}: {} due, {} published, {} failed, {} skipped",
            report.cycle_id,
            report.due(),
            report.published(),
            report.failed(),
            report.skipped()
        ),
    }
    Ok(())
}

/// Stand-in for read-side caches: surface invalidation and cycle events in the log
fn spawn_event_logger(service: &CastboardService) {
    let mut events = service.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                Event::OwnerStale { owner } => debug!(owner = %owner, "Owner aggregates stale"),
                other => debug!(event = ?other, "Cycle event"),
            }
        }
    });
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping after the current cycle", sig);
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    Ok(())
}

async fn run_daemon_loop(publisher: &Publisher, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match run_cycle(publisher).await {
            Ok(report) if report.due() > 0 => info!(
                published = report.published(),
                failed = report.failed(),
                skipped = report.skipped(),
                "Cycle finished"
            ),
            Ok(_) => debug!("No posts due"),
            Err(e) => error!("{:#}", e),
        }

        // Sleep until next poll (check shutdown every second)
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
