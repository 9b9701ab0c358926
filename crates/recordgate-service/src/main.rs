//! RecordGate Service
//!
//! Serves resources from local storage with record-level policies applied
//! per user and purpose.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use recordgate_service::{create_router, AppState, ConfigOverrides, ServiceConfig};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "recordgate-service")]
#[command(about = "RecordGate record-level data service", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RECORDGATE_CONFIG", default_value = "recordgate.yaml")]
    config: String,

    /// Policy file or directory
    #[arg(short, long, env = "RECORDGATE_POLICY")]
    policy: Option<String>,

    /// Root directory plain resource paths resolve against
    #[arg(short = 'r', long, env = "RECORDGATE_FS_ROOT")]
    fs_root: Option<String>,

    /// Reads served at once before new ones are refused
    #[arg(short = 'm', long)]
    max_concurrent_reads: Option<usize>,

    /// Listen address
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            port: self.port,
            policy: self.policy.clone(),
            fs_root: self.fs_root.clone(),
            max_concurrent_reads: self.max_concurrent_reads,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting RecordGate service");

    let config = ServiceConfig::load(&cli.config, &cli.overrides())?;
    info!("Configuration loaded successfully");
    info!("Policy: {}", config.policy_path);
    info!("Reader: {} (max {} concurrent reads)", config.reader.id, config.reader.max_concurrent_reads);

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let state = AppState::new(config, metrics_handle)?;
    info!("Application state initialized successfully");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("recordgate=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recordgate=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("recordgate_reads_total", "Reads accepted and opened");
    metrics::describe_counter!("recordgate_reads_refused_total", "Reads refused for lack of capacity");
    metrics::describe_counter!(
        "recordgate_reads_bypassed_total",
        "Reads copied verbatim because no rule applied"
    );
    metrics::describe_counter!("recordgate_reads_failed_total", "Reads that ended in an error");
    metrics::describe_counter!(
        "recordgate_records_processed_total",
        "Records deserialised and passed through rules"
    );
    metrics::describe_counter!(
        "recordgate_records_returned_total",
        "Records written after rules were applied"
    );
    metrics::describe_histogram!("recordgate_records_withheld", "Records withheld per filtered read");

    info!("Metrics exporter initialized");
    Ok(handle)
}
