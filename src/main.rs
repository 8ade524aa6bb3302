use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

use fall_monitor_rs::alerts::{AlertHandler, ConsolePublisher, LogAnnunciator, WebhookPublisher};
use fall_monitor_rs::dashboard;
use fall_monitor_rs::sources::{self, Scenario, StopReason};
use fall_monitor_rs::{spawn_master, MasterConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// Simulated radar nodes, one per configured module
    Sim,
    /// Newline-delimited JSON payloads on stdin
    Stdin,
}

#[derive(Parser, Debug)]
#[command(name = "fall_monitor")]
#[command(about = "Radar fall-detection master node", long_about = None)]
struct Args {
    /// JSON config file (missing fields take defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where node payloads come from
    #[arg(long, value_enum, default_value = "sim")]
    source: Source,

    /// Serve GET /status on this port (overrides config)
    #[arg(long)]
    status_port: Option<u16>,

    /// Duration in seconds (0 = run forever)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Occupant script for the simulated nodes
    #[arg(long, value_enum, default_value = "fall")]
    scenario: Scenario,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MasterConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MasterConfig::default(),
    };
    if args.status_port.is_some() {
        config.status_port = args.status_port;
    }

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("[{}] Fall monitor starting", ts_now());
    info!("  Source: {:?}", args.source);
    info!("  Duration: {} seconds (0=continuous)", args.duration);
    info!("  Modules: {:?}", config.modules);

    let mut handlers: Vec<Box<dyn AlertHandler>> = vec![
        Box::new(ConsolePublisher::new(config.alert_topic.clone())),
        Box::new(LogAnnunciator::new()),
    ];
    if let Some(url) = &config.alert_webhook_url {
        info!("  Webhook: {}", url);
        handlers.push(Box::new(WebhookPublisher::new(url.clone())));
    }

    let master = Arc::new(spawn_master(&config, handlers)?);

    if let Some(port) = config.status_port {
        let board = master.board.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::start_status_server(board, port).await {
                error!("Status endpoint stopped: {}", e);
            }
        });
    }

    let (payload_tx, payload_rx) = mpsc::channel::<Vec<u8>>(config.reading_queue);
    match args.source {
        Source::Sim => {
            info!("  Scenario: {:?}", args.scenario);
            for (i, anchor) in config.modules.iter().enumerate() {
                // Small per-node clock skew, well inside the sync window.
                let skew_ms = i as u64 * 15;
                tokio::spawn(sources::node_loop(
                    anchor.clone(),
                    args.scenario,
                    skew_ms,
                    payload_tx.clone(),
                ));
            }
        }
        Source::Stdin => {
            tokio::spawn(sources::stdin_loop(payload_tx.clone()));
        }
    }
    drop(payload_tx);

    let transport_master = master.clone();
    let transport = tokio::spawn(async move {
        sources::forward_payloads(payload_rx, &transport_master).await;
    });

    let deadline = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    // Let queued readings and alerts drain once the input runs dry.
    let drain = config.send_timeout() * 5;
    match sources::run_until_done(transport, deadline, drain).await {
        StopReason::Deadline => info!("[{}] Duration reached, stopping...", ts_now()),
        StopReason::InputExhausted => info!("[{}] Input exhausted", ts_now()),
        StopReason::Interrupted => info!("[{}] Interrupted, stopping...", ts_now()),
    }

    let snapshot = master.board.snapshot();
    info!(
        "Readings accepted={} rejected={} fused={} falls={} dropped={}",
        snapshot.readings_accepted,
        snapshot.readings_rejected,
        snapshot.fused_emitted,
        snapshot.falls_confirmed,
        snapshot.messages_dropped
    );
    master.abort();
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
