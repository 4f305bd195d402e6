//! ringserve binary: load configuration, bind, and serve forever.

use ringserve::config::Config;
use ringserve::runtime::{self, Listener};
use tracing::{error, info};
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
        protocol = ?config.protocol,
        runtime = ?config.runtime,
        max_connections = config.max_connections,
        buffer_size = config.buffer_size,
        multishot_accept = config.multishot_accept,
        "Starting ringserve"
    );

    let listener = Listener::bind(config.listen, config.backlog).map_err(|e| {
        error!(error = %e, "Server setup failed");
        e
    })?;
    info!(addr = %listener.local_addr()?, "Listening");

    runtime::run(&config, &listener).map_err(|e| {
        error!(error = %e, "Event loop failed");
        e
    })?;
    Ok(())
}
