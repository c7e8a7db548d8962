/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use restbus::broker::BrokerConnection;
use restbus::config::{parse_overrides, CliOverrides, RestbusConfig};
use restbus::scheduler::Restbus;
use restbus::selection::{select_e2e_counters, select_frames};
use restbus::signal::FrameSelection;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Restbus – publish frames at their cycle times through a signal broker.
///
/// Example:
///   restbus --namespace ChassisBus --frame SpeedFrame -s VehicleSpeed=10,20,30 -v
#[derive(Debug, Parser)]
#[command(
    name = "restbus",
    about = "Restbus – keep frames alive through a vehicle-signal broker",
    long_about = None,
)]
struct Cli {
    /// URL of the broker [default: http://127.0.0.1:50051].
    #[arg(long = "url")]
    url: Option<String>,

    /// API key, required when accessing brokers running in the cloud.
    #[arg(long = "x-api-key")]
    x_api_key: Option<String>,

    /// Personal or service-account access token.
    #[arg(short = 't', long = "access-token")]
    access_token: Option<String>,

    /// Upload this configuration folder to the broker and reload it before
    /// selecting frames.
    #[arg(short = 'c', long = "configure", value_name = "DIRECTORY")]
    configure: Option<PathBuf>,

    /// Namespace to select frames on.
    #[arg(short = 'n', long = "namespace")]
    namespace: Option<String>,

    /// Frame to publish (repeatable).  If none is given, all frames in the
    /// namespace are used.
    #[arg(short = 'f', long = "frame")]
    frames: Vec<String>,

    /// Publish every frame except the ones given with --frame.
    #[arg(short = 'e', long = "exclude", default_value_t = false)]
    exclude: bool,

    /// Print the selection and per-wave scheduling information.
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,

    /// Manually set the value(s) of a signal, cycled round-robin (repeatable).
    #[arg(short = 's', long = "set", value_name = "NAME=VALUE[,VALUE...]")]
    set: Vec<String>,

    /// Path to a YAML restbus configuration file.
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Abort if a single publish call takes longer than this.
    #[arg(long = "publish-timeout-ms")]
    publish_timeout_ms: Option<u64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Restbus failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let overrides = parse_overrides(&cli.set)?;

    let file_config = match &cli.config {
        Some(path) => RestbusConfig::load_from_file(path)?,
        None => RestbusConfig::default(),
    };
    let config = file_config.merge_cli(CliOverrides {
        url: cli.url,
        x_api_key: cli.x_api_key,
        access_token: cli.access_token,
        configure: cli.configure,
        namespace: cli.namespace,
        frames: cli.frames,
        exclude: cli.exclude,
        verbose: cli.verbose,
        publish_timeout_ms: cli.publish_timeout_ms,
        overrides,
    });

    if config.namespace.is_empty() {
        bail!("no namespace given: use --namespace or set `namespace` in the configuration file");
    }

    info!(
        url          = %config.url,
        configure    = ?config.configure,
        namespace    = %config.namespace,
        client_id    = %config.client_id,
        frames       = ?config.frames,
        exclude      = config.exclude,
        overrides    = config.overrides.len(),
        "Configuration"
    );

    // ── Discover frames ───────────────────────────────────────────────────────
    let broker = BrokerConnection::connect(
        &config.url,
        config.x_api_key.as_deref(),
        config.access_token.as_deref(),
    )
    .await?;

    if let Some(folder) = &config.configure {
        info!("Configuring broker with {}", folder.display());
        broker.upload_folder(folder).await?;
        broker.reload_configuration().await?;
    }

    let frames = broker
        .list_signals(&config.namespace)
        .await
        .with_context(|| format!("Cannot list signals in namespace {}", config.namespace))?;

    if config.frames.is_empty() {
        info!(
            "No frames specified, selecting all frames in namespace {}",
            config.namespace
        );
    }

    let counters = select_e2e_counters(&frames);
    let selection = select_frames(&frames, &config.frames, config.exclude, &config.overrides)?;

    if selection.is_empty() {
        info!("No frames selected, exit...");
        return Ok(());
    }

    info!(
        "Running restbus for {} frames on namespace {}",
        selection.len(),
        config.namespace
    );
    if config.verbose {
        log_selection(&selection);
    }

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut restbus = Restbus::new(selection, counters, broker.publisher())?
        .with_client_id(config.client_id.clone())
        .with_verbose(config.verbose)
        .with_publish_timeout(config.publish_timeout_ms.map(Duration::from_millis));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Keyboard interrupt received. Closing scheduler.");
                let _ = stop_tx.send(true);
            }
            Err(e) => warn!("Cannot listen for Ctrl-C, run until exhausted: {}", e),
        }
    });

    let summary = restbus.run(stop_rx).await?;

    info!(
        outcome     = ?summary.outcome,
        waves       = summary.waves,
        frames_sent = summary.frames_sent,
        "Restbus finished"
    );
    Ok(())
}

fn log_selection(selection: &[FrameSelection]) {
    for frame in selection {
        if frame.is_cyclic() {
            info!(
                "- Frame {} with cycle time {} ms.",
                frame.name, frame.cycle_time_ms
            );
        } else {
            info!("- Frame {} without cycle time.", frame.name);
        }
        for series in &frame.signals {
            let values: Vec<String> = series
                .values()
                .iter()
                .map(|v| v.payload.to_string())
                .collect();
            info!(
                "  - Signal {}, default value(s): {}.",
                series.name(),
                values.join(", ")
            );
        }
    }
}
