//! netclient-echo-server: a TCP echo server for exercising network clients
//!
//! Every received chunk is echoed back with these non-standard features:
//! - any `x` is replaced by `ThisIsLong`
//! - a chunk starting with `COMPRESS` switches the connection to raw
//!   deflate after the reply
//! - `DISCONNECT` anywhere in a chunk closes the connection
//!
//! Configuration via CLI arguments or TOML file.

mod codec;
mod config;
mod error;
mod protocols;
mod server;
mod session;

use config::Config;
use server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        mode = ?config.mode,
        max_sessions = config.max_sessions,
        "Starting netclient-echo-server"
    );

    // Bind failures are fatal
    let server = Server::bind(&config)?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received");
                shutdown.shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });

    server.run().await?;
    Ok(())
}
