use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn, Level};
use tracing_subscriber;

use floodgate::config::FloodgateConfig;
use floodgate::http::{AppState, HttpServer};
use floodgate::limiter::{epoch_ms, PolicySet, RateLimiter};
use floodgate::store::{MemoryStore, WindowStore};

#[derive(Parser, Debug)]
#[command(name = "floodgate")]
#[command(about = "Fixed-window request rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Floodgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let mut config = match args.config.as_deref() {
        Some(path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    // Initialize the counter store and the rate limiter over it
    let store = Arc::new(MemoryStore::new());
    let limiter = Arc::new(RateLimiter::with_timeout(
        store.clone(),
        Duration::from_millis(config.rate_limiting.store_timeout_ms),
    ));

    // Bind the policy presets; invalid configuration is fatal here
    let policies = Arc::new(PolicySet::from_config(
        limiter.clone(),
        config.policies.clone(),
    )?);
    info!(policies = policies.len(), "Rate limiter initialized");

    // Best-effort sweep of expired counters
    spawn_sweeper(
        store.clone(),
        Duration::from_secs(config.rate_limiting.sweep_interval_secs),
    );

    // Create and start the HTTP server
    let state = AppState::new(limiter, policies, &config.rate_limiting);
    let server = HttpServer::new(config.server.listen_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate Rate Limiting Service stopped");
    Ok(())
}

/// Periodically delete counters whose window has fully elapsed.
///
/// Stale counters are reset on next access anyway; this only reclaims
/// memory for keys that never come back.
fn spawn_sweeper(store: Arc<dyn WindowStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match store.delete_expired(epoch_ms()).await {
                Ok(removed) if removed > 0 => {
                    debug!(removed = removed, "Swept expired rate limit counters");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Counter sweep failed"),
            }
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
