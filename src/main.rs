//! Channel Relay Server - Entry Point
//!
//! Reads configuration, binds the listener and serves until Ctrl-C.

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use channel_relay::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=channel_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("channel_relay=info")),
        )
        .init();

    let mut config = Config::from_env()?;

    // Optional host:port from the command line wins over the environment
    if let Some(addr) = env::args().nth(1) {
        config = config.with_listen_addr(&addr)?;
    }

    info!(
        "Starting chat relay on {} (outbound buffer {}, max line {} bytes)",
        config.socket_addr_string(),
        config.outbound_buffer,
        config.max_line_length
    );

    let server = Server::bind(config).await?;
    server.run(shutdown_signal()).await?;

    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
