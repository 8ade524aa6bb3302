use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;
use log::{info, warn};
use serde::Serialize;

use fall_monitor_rs::alerts::AlertWire;
use fall_monitor_rs::decoder;
use fall_monitor_rs::fall_detector::FallDetector;
use fall_monitor_rs::fusion::FusionEngine;
use fall_monitor_rs::types::FusedReading;
use fall_monitor_rs::MasterConfig;

/// Replay recorded node payloads through decoder, fusion and fall detector.
///
/// Liveness is not replayed: it runs on the master's own clock.
#[derive(Parser, Debug)]
struct Args {
    /// Recorded payloads, one JSON object per line (.jsonl or .jsonl.gz)
    #[arg(long)]
    log: PathBuf,

    /// JSON config file (missing fields take defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the sync window
    #[arg(long)]
    sync_window_ms: Option<u64>,

    /// Print every fused reading, not just alerts
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ReplayEvent<'a> {
    Fused(&'a FusedReading),
    Alert(AlertWire),
}

#[derive(Debug, Default, Serialize)]
struct ReplaySummary {
    lines: usize,
    rejected: usize,
    fused: usize,
    alerts: usize,
}

fn open_log(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let inner: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(inner)))
}

fn replay(reader: impl BufRead, config: &MasterConfig, verbose: bool) -> Result<ReplaySummary> {
    let mut fusion = FusionEngine::from_config(config);
    let mut detector = FallDetector::from_config(config);
    let mut summary = ReplaySummary::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", lineno + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let reading = match decoder::decode_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!("line {}: {}", lineno + 1, e);
                summary.rejected += 1;
                continue;
            }
        };

        let Some(fused) = fusion.ingest(reading) else {
            continue;
        };
        summary.fused += 1;
        if verbose {
            println!("{}", serde_json::to_string(&ReplayEvent::Fused(&fused))?);
        }

        if let Some(alert) = detector.process(&fused) {
            summary.alerts += 1;
            println!(
                "{}",
                serde_json::to_string(&ReplayEvent::Alert(AlertWire::from(&alert)))?
            );
        }
    }

    Ok(summary)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MasterConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MasterConfig::default(),
    };
    if let Some(window) = args.sync_window_ms {
        config.sync_window_ms = window;
    }

    let reader = open_log(&args.log)?;
    let summary = replay(reader, &config, args.verbose)?;
    info!(
        "Replayed {} lines: {} rejected, {} fused, {} alerts",
        summary.lines, summary.rejected, summary.fused, summary.alerts
    );
    Ok(())
}
