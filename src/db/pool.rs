//! Connection pool setup.
//!
//! One pool is created at startup from the configured connection URL. The
//! backend is selected by URL scheme; database-specific pools are used
//! rather than `AnyPool` so the full type support of each driver is
//! available to row decoding.

use crate::error::{BridgeError, BridgeResult};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::time::Duration;
use tracing::info;
use url::Url;

/// Default maximum pool size for MySQL/PostgreSQL.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// SQLite gets a single connection; the driver serializes writers anyway.
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
/// Default connection acquire timeout in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// The database backend behind the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    MySql,
}

impl DatabaseBackend {
    /// Detect the backend from a connection URL scheme.
    pub fn from_url(url: &str) -> BridgeResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| BridgeError::connection(format!("Invalid database URL: {}", e), ""))?;
        match parsed.scheme() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(BridgeError::connection(
                format!("Unsupported database scheme '{}'", other),
                "Use a sqlite://, postgres://, or mysql:// URL",
            )),
        }
    }
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgresql"),
            Self::MySql => write!(f, "mysql"),
        }
    }
}

/// Backend-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl DbPool {
    /// Connect to the database identified by `url`.
    pub async fn connect(url: &str, max_connections: Option<u32>) -> BridgeResult<Self> {
        let backend = DatabaseBackend::from_url(url)?;
        let acquire_timeout = Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS);

        info!(backend = %backend, "Connecting to database");

        let pool = match backend {
            DatabaseBackend::Sqlite => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS_SQLITE))
                    .acquire_timeout(acquire_timeout)
                    .connect(url)
                    .await
                    .map_err(BridgeError::from)?;
                DbPool::Sqlite(pool)
            }
            DatabaseBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
                    .acquire_timeout(acquire_timeout)
                    .connect(url)
                    .await
                    .map_err(BridgeError::from)?;
                DbPool::Postgres(pool)
            }
            DatabaseBackend::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
                    .acquire_timeout(acquire_timeout)
                    .connect(url)
                    .await
                    .map_err(BridgeError::from)?;
                DbPool::MySql(pool)
            }
        };

        Ok(pool)
    }

    /// Get the backend for this pool.
    pub fn backend(&self) -> DatabaseBackend {
        match self {
            DbPool::Sqlite(_) => DatabaseBackend::Sqlite,
            DbPool::Postgres(_) => DatabaseBackend::Postgres,
            DbPool::MySql(_) => DatabaseBackend::MySql,
        }
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        match self {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            DatabaseBackend::from_url("sqlite://data.db").unwrap(),
            DatabaseBackend::Sqlite
        );
        assert_eq!(
            DatabaseBackend::from_url("postgres://u:p@localhost/db").unwrap(),
            DatabaseBackend::Postgres
        );
        assert_eq!(
            DatabaseBackend::from_url("postgresql://u:p@localhost/db").unwrap(),
            DatabaseBackend::Postgres
        );
        assert_eq!(
            DatabaseBackend::from_url("mysql://u:p@localhost/db").unwrap(),
            DatabaseBackend::MySql
        );
    }

    #[test]
    fn test_backend_from_url_rejects_unknown_scheme() {
        assert!(DatabaseBackend::from_url("redis://localhost").is_err());
        assert!(DatabaseBackend::from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let pool = DbPool::connect("sqlite::memory:", None).await;
        // "sqlite::memory:" has no // authority but must still parse
        assert!(pool.is_ok());
        assert_eq!(pool.unwrap().backend(), DatabaseBackend::Sqlite);
    }
}
