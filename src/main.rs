//! Check-in gateway - door occupancy and visit ledger service
//!
//! Serves the live headcount for the door screen, records each check-in as a
//! visit, and exposes the admin billing views over a JSON HTTP API.
//!
//! Module structure:
//! - `domain/` - Core types (members, visits, billing rules, calendar)
//! - `io/` - External interfaces (SQLite store, HTTP, Prometheus)
//! - `services/` - Business logic (OccupancyStore, VisitLedger)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use checkin_gateway::infra::{Config, Metrics};
use checkin_gateway::io::{start_server, AppState, SqliteStore};
use checkin_gateway::services::{OccupancyStore, VisitLedger};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Check-in gateway - occupancy counter and visit ledger
#[derive(Parser, Debug)]
#[command(name = "checkin-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Override the HTTP listen port from the config file
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug to see expiry sweeps and every request
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "checkin-gateway starting");

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config);
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        port = %config.port(),
        capacity = %config.capacity(),
        session_timeout_secs = %config.session_timeout().as_secs(),
        billing_threshold = %config.billing_threshold(),
        database_path = %config.database_path(),
        utc_offset = %config.calendar().offset(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let store = SqliteStore::open(config.database_path())
        .with_context(|| format!("Failed to open database {}", config.database_path()))?;
    let ledger = Arc::new(VisitLedger::from_config(store, &config, metrics.clone()));
    let occupancy = Arc::new(OccupancyStore::from_config(&config, metrics.clone()));

    // Start metrics reporter (0 disables the periodic log line)
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        let occupancy_clone = occupancy.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            loop {
                interval.tick().await;
                // Touch the store so the gauge reflects expired sessions
                occupancy_clone.current_count();
                metrics_clone.report().log();
            }
        });
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let ip: IpAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;
    let addr = SocketAddr::new(ip, config.port());

    let state = Arc::new(AppState {
        occupancy,
        ledger,
        metrics,
        site_id: config.site_id().to_string(),
    });

    // Run HTTP server until shutdown
    start_server(addr, state, shutdown_rx).await?;

    info!("checkin-gateway shutdown complete");
    Ok(())
}
