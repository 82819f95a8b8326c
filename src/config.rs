//! Configuration handling.
//!
//! All settings come from CLI arguments with environment-variable
//! fallbacks. The only required values are the database connection string
//! and (implicitly, via its default) the listen port.

use crate::db::DatabaseBackend;
use crate::error::BridgeResult;
use clap::Parser;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_ENDPOINT: &str = "/rpc";
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 300;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Read-only database bridge over HTTP with session support.
#[derive(Debug, Parser)]
#[command(name = "db-bridge", version, about)]
pub struct Config {
    /// Database connection URL (sqlite://, postgres://, or mysql://)
    #[arg(long, env = "DATABASE_URL")]
    pub database: String,

    /// Host address to bind to
    #[arg(long, env = "BRIDGE_HOST", default_value = DEFAULT_HTTP_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "BRIDGE_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Protocol endpoint path
    #[arg(long, env = "BRIDGE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,

    /// Seconds of inactivity before a session is expired
    #[arg(long, default_value_t = DEFAULT_SESSION_IDLE_SECS)]
    pub session_idle_secs: u64,

    /// Default query timeout in seconds
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS)]
    pub query_timeout_secs: u64,

    /// Default maximum rows returned per query
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
    pub row_limit: u32,

    /// Maximum connections in the database pool
    #[arg(long)]
    pub max_connections: Option<u32>,
}

impl Config {
    /// Validate the connection string early so a bad URL fails at startup,
    /// not on the first query.
    pub fn database_backend(&self) -> BridgeResult<DatabaseBackend> {
        DatabaseBackend::from_url(&self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["db-bridge", "--database", "sqlite://data.db"]);
        assert_eq!(config.host, DEFAULT_HTTP_HOST);
        assert_eq!(config.port, DEFAULT_HTTP_PORT);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.session_idle_secs, DEFAULT_SESSION_IDLE_SECS);
        assert!(!config.json_logs);
        assert_eq!(config.max_connections, None);
    }

    #[test]
    fn test_explicit_values() {
        let config = parse(&[
            "db-bridge",
            "--database",
            "postgres://u:p@localhost/app",
            "--port",
            "9000",
            "--endpoint",
            "/bridge",
            "--session-idle-secs",
            "60",
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.endpoint, "/bridge");
        assert_eq!(config.session_idle_secs, 60);
        assert_eq!(
            config.database_backend().unwrap(),
            DatabaseBackend::Postgres
        );
    }

    #[test]
    fn test_database_is_required() {
        assert!(Config::try_parse_from(["db-bridge"]).is_err());
    }

    #[test]
    fn test_bad_database_url_detected() {
        let config = parse(&["db-bridge", "--database", "oracle://somewhere"]);
        assert!(config.database_backend().is_err());
    }
}
