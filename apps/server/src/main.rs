//! RoonLink Server - headless gateway between a Roon Core and polling clients.
//!
//! Registers with the Roon Core as an extension, mirrors zone state in memory
//! and serves it over plain HTTP GET for devices that can only poll.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use roonlink_core::{bootstrap_services, start_server};
use tokio::signal;

use crate::config::ServerConfig;

/// RoonLink Server - Roon Core state over plain HTTP polling.
#[derive(Parser, Debug)]
#[command(name = "roonlink-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ROONLINK_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind address (overrides config file).
    #[arg(short = 'b', long)]
    bind_address: Option<IpAddr>,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Roon Core host; skips network discovery (overrides config file).
    #[arg(long)]
    core_host: Option<String>,

    /// Zone used when a request names none (overrides config file).
    #[arg(short = 'z', long)]
    zone_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("RoonLink Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(ip) = args.bind_address {
        config.bind_address = ip;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(host) = args.core_host {
        config.core_host = Some(host);
    }
    if let Some(zone_id) = args.zone_id {
        config.default_zone_id = Some(zone_id);
    }

    log::info!(
        "Configuration: bind={}:{}, core={}, default_zone={}, presets={}",
        config.bind_address,
        config.bind_port,
        config.core_host.as_deref().unwrap_or("discover"),
        config.default_zone_id.as_deref().unwrap_or("first seen"),
        config.presets.len()
    );

    let services =
        bootstrap_services(config.to_core_config()).context("Failed to bootstrap services")?;
    log::info!("Services bootstrapped successfully");

    services.start_background_tasks();

    // The server stops accepting on the same token that stops the Core session.
    let app_state = services.app_state();
    let cancel = services.cancel_token.clone();
    let mut server_handle =
        tokio::spawn(async move { start_server(app_state, cancel.cancelled_owned()).await });

    let early_exit = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server_handle => Some(result),
    };
    if early_exit.is_none() {
        log::info!("Shutdown signal received, cleaning up...");
    }

    // Graceful shutdown
    services.shutdown();

    let result = match early_exit {
        Some(result) => result,
        None => server_handle.await,
    };
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e).context("HTTP server failed"),
        Err(e) => return Err(e).context("HTTP server task failed"),
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
