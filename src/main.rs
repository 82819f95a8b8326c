//! db-bridge - Main entry point.
//!
//! Wires configuration, the database pool, the capability registry, and the
//! session store together, then runs the HTTP transport until shutdown.

use clap::Parser;
use db_bridge::capability::CapabilityRegistry;
use db_bridge::config::Config;
use db_bridge::db::{DbPool, QueryExecutor};
use db_bridge::session::SessionStore;
use db_bridge::tools;
use db_bridge::transport::{HttpTransport, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    // Fail fast on an unusable connection string
    let backend = config.database_backend()?;

    info!(
        backend = %backend,
        "Starting db-bridge v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Connect the shared pool; startup fails if the database is unreachable
    let pool = DbPool::connect(&config.database, config.max_connections).await?;

    // Build the capability registry. A duplicate name is a configuration
    // bug and prevents the process from starting.
    let executor = QueryExecutor::with_defaults(config.query_timeout_secs, config.row_limit);
    let mut registry = CapabilityRegistry::new();
    tools::register_all(&mut registry, pool.clone(), executor)?;
    let registry = Arc::new(registry);
    info!(capabilities = registry.len(), "Capability registry ready");

    // Session store plus its idle reaper
    let store = Arc::new(SessionStore::new());
    store
        .clone()
        .start_reaper(Duration::from_secs(config.session_idle_secs));

    let transport = HttpTransport::new(
        store,
        registry,
        pool,
        &config.host,
        config.port,
        &config.endpoint,
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
