//! The `run_select_query` capability.
//!
//! Executes a caller-supplied read-only statement. The SQL passes through
//! the read-only guard before the executor ever sees it; mutation payloads
//! are rejected at the input-validation layer and never reach the database.

use crate::db::types::MAX_ROW_LIMIT;
use crate::db::{ColumnMetadata, DbPool, QueryExecutor, QueryParam};
use crate::error::BridgeResult;
use crate::tools::sql_guard;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Input for run_select_query.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunSelectQueryInput {
    /// Read-only SQL statement (SELECT, WITH, SHOW, DESCRIBE, EXPLAIN,
    /// VALUES). Write operations are rejected.
    pub sql: String,
    /// Positional parameters (use ? or $1,$2... placeholders in SQL)
    #[serde(default)]
    pub params: Vec<QueryParamInput>,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Query timeout in seconds. Default: 30, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

/// Input parameter that can be various JSON types.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParamInput {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<QueryParamInput> for QueryParam {
    fn from(input: QueryParamInput) -> Self {
        match input {
            QueryParamInput::Null => QueryParam::Null,
            QueryParamInput::Bool(v) => QueryParam::Bool(v),
            QueryParamInput::Int(v) => QueryParam::Int(v),
            QueryParamInput::Float(v) => QueryParam::Float(v),
            QueryParamInput::String(v) => QueryParam::String(v),
        }
    }
}

/// Output from run_select_query.
#[derive(Debug, Clone, Serialize)]
pub struct RunSelectQueryOutput {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// True if the result was cut off at the row limit
    pub truncated: bool,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Handler for the query capability.
pub struct QueryToolHandler {
    pool: DbPool,
    executor: QueryExecutor,
}

impl QueryToolHandler {
    pub fn new(pool: DbPool, executor: QueryExecutor) -> Self {
        Self { pool, executor }
    }

    pub async fn run(&self, input: RunSelectQueryInput) -> BridgeResult<RunSelectQueryOutput> {
        sql_guard::validate_read_only(&input.sql, self.pool.backend())?;

        let warning = input.limit.and_then(|requested| {
            (requested > MAX_ROW_LIMIT).then(|| {
                format!(
                    "Requested limit {} exceeds maximum allowed ({}). Results capped to {} rows.",
                    requested, MAX_ROW_LIMIT, MAX_ROW_LIMIT
                )
            })
        });

        let params: Vec<QueryParam> = input.params.into_iter().map(Into::into).collect();
        let result = self
            .executor
            .fetch(&self.pool, &input.sql, &params, input.limit, input.timeout_secs)
            .await?;

        info!(
            row_count = result.row_count,
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        Ok(RunSelectQueryOutput {
            columns: result.columns,
            rows: result.rows,
            row_count: result.row_count,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn test_input_deserialization() {
        let input: RunSelectQueryInput = serde_json::from_str(
            r#"{
                "sql": "SELECT * FROM users WHERE id = ?",
                "params": [42],
                "limit": 100
            }"#,
        )
        .unwrap();
        assert_eq!(input.sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(input.params.len(), 1);
        assert!(matches!(input.params[0], QueryParamInput::Int(42)));
        assert_eq!(input.limit, Some(100));
        assert_eq!(input.timeout_secs, None);
    }

    async fn sqlite_handler() -> QueryToolHandler {
        let pool = DbPool::connect("sqlite::memory:", None).await.unwrap();
        let DbPool::Sqlite(ref sqlite) = pool else {
            unreachable!()
        };
        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (name) VALUES ('alice'), ('bob')")
            .execute(sqlite)
            .await
            .unwrap();
        QueryToolHandler::new(pool, QueryExecutor::new())
    }

    #[tokio::test]
    async fn test_run_select() {
        let handler = sqlite_handler().await;
        let output = handler
            .run(RunSelectQueryInput {
                sql: "SELECT name FROM users ORDER BY id".to_string(),
                params: vec![],
                limit: None,
                timeout_secs: None,
            })
            .await
            .unwrap();
        assert_eq!(output.row_count, 2);
        assert_eq!(output.rows[0]["name"], "alice");
        assert!(output.warning.is_none());
    }

    #[tokio::test]
    async fn test_run_rejects_mutation_before_database() {
        let handler = sqlite_handler().await;
        let err = handler
            .run(RunSelectQueryInput {
                sql: "  delete FROM users".to_string(),
                params: vec![],
                limit: None,
                timeout_secs: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput { .. }));

        // The table is untouched
        let output = handler
            .run(RunSelectQueryInput {
                sql: "SELECT COUNT(*) AS n FROM users".to_string(),
                params: vec![],
                limit: None,
                timeout_secs: None,
            })
            .await
            .unwrap();
        assert_eq!(output.rows[0]["n"], 2);
    }

    #[tokio::test]
    async fn test_run_warns_on_excessive_limit() {
        let handler = sqlite_handler().await;
        let output = handler
            .run(RunSelectQueryInput {
                sql: "SELECT 1".to_string(),
                params: vec![],
                limit: Some(MAX_ROW_LIMIT + 1),
                timeout_secs: None,
            })
            .await
            .unwrap();
        assert!(output.warning.unwrap().contains("capped"));
    }
}
