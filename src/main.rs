//! # News Scraper
//!
//! A configurable news-article harvester. It walks the listing pages of the
//! news sources named in a YAML file, picks out article links, extracts each
//! article's title, author, body and publication date, and merges the results
//! into a deduplicated CSV dataset that grows across runs.
//!
//! ## Features
//!
//! - Declarative per-source rulesets with shared templates (`extends`)
//! - Per-publisher link classification (CNN, New York Times, AP News, generic)
//! - Multi-strategy publication date inference (URL, JSON-LD, meta tags,
//!   `<time>`, date-like classes)
//! - Start-date cutoff and per-source article caps
//! - Periodic checkpoints and a clean flush on Ctrl-C
//! - Console logs, plus an optional DEBUG-level log file (`--log-file`)
//!
//! ## Usage
//!
//! ```sh
//! news_scraper --config config.yaml --save-interval 20
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture, per source:
//! 1. **Classifying**: fetch the listing page and keep article links
//! 2. **Fetching**: download each article not already in the dataset
//! 3. **Assembling**: extract fields, infer the date, apply the cutoff
//! 4. **Persisting**: merge into the store, checkpointing as configured

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Layer, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod scrapers;
mod storage;
mod utils;

use cli::Cli;
use config::{Settings, init_sources, load_config};
use pipeline::run_pipeline;
use utils::{ensure_writable_dir, log_file_appender, output_dir};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tfmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339())
        .with_filter(filter);
    let file_layer = match &args.log_file {
        Some(path) => Some(
            tfmt::layer()
                .with_writer(log_file_appender(path)?)
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_filter(LevelFilter::DEBUG),
        ),
        None => None,
    };
    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    let start_time = std::time::Instant::now();
    info!("news_scraper starting up");
    debug!(?args, "Parsed CLI arguments");

    // ---- Configuration ----
    let config = match load_config(&args.config).await {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    let mut sources = init_sources(&config);
    if let Some(wanted) = &args.source {
        sources.retain(|name, _| name == wanted);
        if sources.is_empty() {
            error!(source = %wanted, "Source not found in configuration");
            return Ok(ExitCode::FAILURE);
        }
    }

    let mut settings = Settings::resolve(config.settings, Local::now().date_naive());
    if let Some(interval) = args.save_interval {
        settings.save_interval = interval;
    }
    info!(
        sources = sources.len(),
        output = %settings.output_csv.display(),
        save_interval = settings.save_interval,
        "Configuration resolved"
    );

    // Early check: ensure the dataset directory is writable
    let dir = output_dir(&settings.output_csv);
    if let Err(e) = ensure_writable_dir(&dir).await {
        error!(
            path = %dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Cancellation ----
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received; finishing current articles and saving");
                on_interrupt.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    // ---- Scrape ----
    let run_span = info_span!("run", config = %args.config.display());
    let code = run_pipeline(sources, settings, cancel)
        .instrument(run_span)
        .await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        code,
        "Execution complete"
    );

    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
