//! pingline: a line-oriented ping/pong server
//!
//! Clients connect over TCP, get a greeting with their own address, and send
//! `\r`-terminated commands:
//! - `ping` answers `pong`
//! - `quit` answers `Goodbye.` and closes the connection
//! - anything else answers `Invalid message.`
//!
//! Features:
//! - One task per connection, so a slow client never stalls the others
//! - Backspace editing for raw terminal clients
//! - Optional remote `shutdown` command
//! - Configuration via CLI arguments or TOML file

mod config;
mod error;
mod protocols;
mod runtime;
mod server;

use config::Config;
use server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        workers = ?config.workers,
        backlog = config.backlog,
        allow_shutdown = config.allow_shutdown,
        "Starting pingline server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers.filter(|n| *n > 0) {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(run(config))?;
    info!("Server stopped");
    Ok(())
}

async fn run(config: Config) -> Result<(), error::ServerError> {
    let server = Server::new(config);

    // Ctrl-C stops the acceptor the same way a remote `shutdown` does
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                shutdown.trigger();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    server.run().await
}
