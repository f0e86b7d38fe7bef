//! Prometheus exporter for Rainforest RAVEn smart meter telemetry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use raven_exporter::{ExporterConfig, HttpServer, MeterMetrics, Pipeline};
use raven_exporter::serial;

/// Export Rainforest RAVEn smart meter readings as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "raven-exporter")]
#[command(about = "Export RAVEn smart meter readings as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port the RAVEn stick is attached to, e.g. COM4 or /dev/ttyUSB0.
    #[arg(long)]
    serial_port: Option<String>,

    /// Serial baud rate (overrides config).
    #[arg(long)]
    baud_rate: Option<u32>,

    /// HTTP listen address for the metrics endpoint (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Path for the metrics endpoint (overrides config).
    #[arg(long)]
    metrics_path: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(port) = args.serial_port {
        config.serial.port = port;
    }
    if let Some(baud_rate) = args.baud_rate {
        config.serial.baud_rate = baud_rate;
    }
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(path) = args.metrics_path {
        config.prometheus.path = path;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    config.validate()?;

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("raven_exporter={}", config.logging.level).parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(port = %config.serial.port, "RAVEn exporter starting");

    let metrics = Arc::new(MeterMetrics::new());

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(metrics.clone(), listen_addr, config.prometheus.path.clone());
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("Metrics server error: {}", e);
        }
    });

    let stream = serial::open(&config.serial)?;
    let pipeline = Pipeline::new(metrics.clone());

    let outcome = tokio::select! {
        result = pipeline.run(stream) => Some(result),
        _ = shutdown_signal() => None,
    };

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    match outcome {
        Some(Err(e)) => {
            error!(error = %e, "Telemetry pipeline failed");
            Err(e.into())
        }
        Some(Ok(())) => {
            warn!("Serial stream ended");
            Ok(())
        }
        None => {
            info!("Shutdown requested");
            Ok(())
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
