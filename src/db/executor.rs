//! Read-only statement execution.
//!
//! The executor is the single surface the capabilities depend on: execute a
//! parameterized statement and return rows plus row count. Row limits are
//! enforced by streaming (`limit + 1` rows are fetched so truncation can be
//! reported without materializing the full result), and every call is
//! wrapped in a timeout.
//!
//! Each backend gets its own submodule with an identical shape; the
//! structure is intentionally parallel so differences stand out.

use crate::db::pool::DbPool;
use crate::db::types::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT,
    QueryParam, QueryResult, RowToJson,
};
use crate::error::{BridgeError, BridgeResult};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Statement executor with default limits.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
    default_limit: u32,
}

impl QueryExecutor {
    /// Create an executor with stock defaults.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS as u64),
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Create an executor with custom defaults (both still capped).
    pub fn with_defaults(timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            default_timeout: Duration::from_secs(
                timeout_secs.min(MAX_QUERY_TIMEOUT_SECS as u64),
            ),
            default_limit: row_limit.min(MAX_ROW_LIMIT),
        }
    }

    /// Execute a read-only statement and collect its rows.
    ///
    /// Callers are expected to have validated `sql` through the read-only
    /// guard already; this layer only enforces limits and timeouts.
    pub async fn fetch(
        &self,
        pool: &DbPool,
        sql: &str,
        params: &[QueryParam],
        limit: Option<u32>,
        timeout_secs: Option<u32>,
    ) -> BridgeResult<QueryResult> {
        let start = Instant::now();
        // Clamp to [1, MAX] so limit=0 cannot mark every result truncated
        let row_limit = limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT))
            .unwrap_or(self.default_limit);
        let query_timeout = timeout_secs
            .map(|t| Duration::from_secs(t.min(MAX_QUERY_TIMEOUT_SECS) as u64))
            .unwrap_or(self.default_timeout);

        debug!(
            sql = %sql,
            params = params.len(),
            limit = row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing statement"
        );

        match pool {
            DbPool::Sqlite(p) => {
                let rows = sqlite::fetch_rows(p, sql, params, row_limit, query_timeout).await?;
                Ok(build_result(rows, row_limit, start))
            }
            DbPool::Postgres(p) => {
                let rows = postgres::fetch_rows(p, sql, params, row_limit, query_timeout).await?;
                Ok(build_result(rows, row_limit, start))
            }
            DbPool::MySql(p) => {
                let rows = mysql::fetch_rows(p, sql, params, row_limit, query_timeout).await?;
                Ok(build_result(rows, row_limit, start))
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a QueryResult from fetched rows (at most `limit + 1` of them).
fn build_result<R: RowToJson>(rows: Vec<R>, row_limit: u32, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    if rows.is_empty() {
        return QueryResult::empty(execution_time_ms);
    }

    let columns = rows[0].column_metadata();
    let truncated = rows.len() > row_limit as usize;
    let json_rows: Vec<_> = rows
        .iter()
        .take(row_limit as usize)
        .map(|r| r.to_json_map())
        .collect();
    let row_count = json_rows.len();

    if truncated {
        warn!(limit = row_limit, "Query result truncated");
    }

    QueryResult {
        columns,
        rows: json_rows,
        row_count,
        truncated,
        execution_time_ms,
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> BridgeResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(BridgeError::from)?);
    }
    Ok(rows)
}

fn timeout_error(query_timeout: Duration) -> BridgeError {
    BridgeError::timeout("statement execution", query_timeout.as_secs() as u32)
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::{SqliteArguments, SqliteRow};

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> BridgeResult<Vec<SqliteRow>> {
        let fetch_limit = row_limit as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows_future = query.fetch(pool).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error(query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;
    use sqlx::postgres::{PgArguments, PgRow};

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> BridgeResult<Vec<PgRow>> {
        let fetch_limit = row_limit as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows_future = query.fetch(pool).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error(query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
        }
    }
}

mod mysql {
    use super::*;
    use sqlx::MySqlPool;
    use sqlx::mysql::{MySqlArguments, MySqlRow};

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> BridgeResult<Vec<MySqlRow>> {
        let fetch_limit = row_limit as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows_future = query.fetch(pool).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error(query_timeout)),
        }
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, sqlx::MySql, MySqlArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
        }
    }
}
