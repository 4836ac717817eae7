//! CLI Entry Point for pulse-daq
//!
//! Provides command-line interface for:
//! - Acquiring detector events from a serial link (or replaying a raw capture)
//! - Checking a configuration file before a run
//!
//! # Usage
//!
//! Acquire from the default serial port:
//! ```bash
//! pulse-daq run --port /dev/ttyACM0
//! ```
//!
//! Replay a raw capture and exit when it has been ingested:
//! ```bash
//! pulse-daq run --replay captures/raw.txt --output-dir /tmp/pulse
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulse_daq::config::{AppConfig, SourceKind, DEFAULT_CONFIG_PATH};
use pulse_daq::event_log::EventLogWriter;
use pulse_daq::scheduler::{AggregateSnapshot, IngestionScheduler};
use pulse_daq::source::open_source;
use pulse_daq::store::BoundedEventStore;
use pulse_daq::tracing_setup;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "pulse-daq")]
#[command(about = "Pulse detector event acquisition and live statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire events until Ctrl-C (or until a replay file ends)
    Run {
        /// Configuration file (TOML format)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Serial device to read from (overrides source.port)
        #[arg(long)]
        port: Option<String>,

        /// Replay raw records from a file instead of the serial link
        #[arg(long, conflicts_with = "port")]
        replay: Option<PathBuf>,

        /// Directory for the event log (overrides storage.output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Load, validate and print the effective configuration
    CheckConfig {
        /// Configuration file (TOML format)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config: path,
            port,
            replay,
            output_dir,
        } => {
            let mut config = AppConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            if let Some(port) = port {
                config.source.kind = SourceKind::Serial;
                config.source.port = port;
            }
            if let Some(replay) = replay {
                config.source.kind = SourceKind::File;
                config.source.path = Some(replay);
            }
            if let Some(output_dir) = output_dir {
                config.storage.output_dir = output_dir;
            }
            run(config).await
        }
        Commands::CheckConfig { config: path } => {
            let config = AppConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.validate()?;
            println!("✅ Configuration is valid ({})", path.display());
            println!();
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    config.validate()?;
    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    println!("🚀 {} - Pulse Detector Acquisition", config.application.name);
    println!();

    let store = BoundedEventStore::new(config.store.capacity)?;
    let writer = EventLogWriter::create_in(&config.storage.output_dir, &config.storage.file_prefix)?;
    println!("📝 Event log: {}", writer.path().display());

    let source = open_source(&config.source)
        .await
        .context("opening record source")?;
    println!("🔌 Source: {}", source.name());

    let replay = config.source.kind == SourceKind::File;
    let scheduler = IngestionScheduler::new(source, writer, store, config.aggregation.clone())?
        .with_max_records_per_tick(config.source.max_records_per_tick)
        .exit_on_source_close(replay);

    let mut handle = scheduler.spawn();
    let presenter = tokio::spawn(present(handle.subscribe()));

    println!("▶️  Acquiring (Ctrl+C to stop)");
    println!();

    let finished = tokio::select! {
        result = handle.wait() => Some(result),
        _ = signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            info!("Interrupt received; draining and closing the event log");
            handle.shutdown().await
        }
    };
    presenter.abort();

    match result {
        Ok(summary) => {
            println!();
            println!("✅ Acquisition stopped");
            println!("   Events logged: {}", summary.events_total);
            println!("   Malformed records skipped: {}", summary.malformed_total);
            println!("   Event log: {}", summary.log_path.display());
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Acquisition failed");
            eprintln!();
            eprintln!("❌ Acquisition failed: {}", e);
            Err(e.into())
        }
    }
}

/// Console presenter: one summary line per published snapshot.
async fn present(mut snapshots: watch::Receiver<Arc<AggregateSnapshot>>) {
    let mut last_total = 0;
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let gap_mode = snapshot
            .aggregates
            .gaps
            .mode_bin()
            .and_then(|i| snapshot.aggregates.gaps.bins().nth(i))
            .map(|(lo, hi, _)| format!("[{lo}, {hi})"));

        if snapshot.events_total == last_total {
            debug!(tick = snapshot.tick, stored = snapshot.store_len, "No new events");
            continue;
        }
        last_total = snapshot.events_total;
        info!(
            tick = snapshot.tick,
            events = snapshot.events_total,
            stored = snapshot.store_len,
            malformed = snapshot.malformed_total,
            evicted = snapshot.evicted_total,
            windows = snapshot.aggregates.windows,
            mean_gap = ?snapshot.aggregates.mean_gap,
            gap_mode = ?gap_mode,
            "Snapshot"
        );
    }
}
