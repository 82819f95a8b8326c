//! Schema introspection capabilities: `list_tables` and `describe_table`.
//!
//! Both use the same executor call shape as the query capability, with
//! fixed per-backend statements (`sqlite_master` / `PRAGMA table_info` for
//! SQLite, `information_schema` for PostgreSQL and MySQL).

use crate::db::{DbPool, QueryExecutor, QueryParam, QueryResult};
use crate::error::{BridgeError, BridgeResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Input for list_tables.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list (PostgreSQL/MySQL). Defaults to "public" on
    /// PostgreSQL and the connection's database on MySQL; ignored by
    /// SQLite.
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from list_tables.
#[derive(Debug, Clone, Serialize)]
pub struct ListTablesOutput {
    pub tables: Vec<String>,
    pub count: usize,
}

/// Input for describe_table.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Table name to describe
    pub table: String,
    /// Schema the table lives in (PostgreSQL/MySQL); same defaults as
    /// list_tables
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from describe_table.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeTableOutput {
    pub table: String,
    pub columns: Vec<ColumnDescription>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// Handler for the schema introspection capabilities.
pub struct SchemaToolHandler {
    pool: DbPool,
    executor: QueryExecutor,
}

impl SchemaToolHandler {
    pub fn new(pool: DbPool, executor: QueryExecutor) -> Self {
        Self { pool, executor }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> BridgeResult<ListTablesOutput> {
        let result = match &self.pool {
            DbPool::Sqlite(_) => {
                self.fetch_fixed(
                    "SELECT name FROM sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                    &[],
                )
                .await?
            }
            DbPool::Postgres(_) => {
                let schema = input.schema.unwrap_or_else(|| "public".to_string());
                self.fetch_fixed(
                    "SELECT table_name FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_type IN ('BASE TABLE', 'VIEW') \
                     ORDER BY table_name",
                    &[QueryParam::String(schema)],
                )
                .await?
            }
            DbPool::MySql(_) => match input.schema {
                Some(schema) => {
                    self.fetch_fixed(
                        "SELECT TABLE_NAME AS table_name FROM information_schema.TABLES \
                         WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME",
                        &[QueryParam::String(schema)],
                    )
                    .await?
                }
                None => {
                    self.fetch_fixed(
                        "SELECT TABLE_NAME AS table_name FROM information_schema.TABLES \
                         WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME",
                        &[],
                    )
                    .await?
                }
            },
        };

        let tables: Vec<String> = result
            .rows
            .iter()
            .filter_map(|row| first_string(row))
            .collect();
        let count = tables.len();

        info!(count = count, "Listed tables");

        Ok(ListTablesOutput { tables, count })
    }

    pub async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> BridgeResult<DescribeTableOutput> {
        let columns = match &self.pool {
            DbPool::Sqlite(_) => self.describe_sqlite(&input.table).await?,
            DbPool::Postgres(_) => {
                let schema = input.schema.clone().unwrap_or_else(|| "public".to_string());
                let result = self
                    .fetch_fixed(
                        "SELECT column_name, data_type, is_nullable, column_default \
                         FROM information_schema.columns \
                         WHERE table_schema = $1 AND table_name = $2 \
                         ORDER BY ordinal_position",
                        &[
                            QueryParam::String(schema),
                            QueryParam::String(input.table.clone()),
                        ],
                    )
                    .await?;
                information_schema_columns(&result)
            }
            DbPool::MySql(_) => {
                let result = self
                    .fetch_fixed(
                        "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
                                IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default \
                         FROM information_schema.COLUMNS \
                         WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ? \
                         ORDER BY ORDINAL_POSITION",
                        &[
                            input
                                .schema
                                .clone()
                                .map(QueryParam::String)
                                .unwrap_or(QueryParam::Null),
                            QueryParam::String(input.table.clone()),
                        ],
                    )
                    .await?;
                information_schema_columns(&result)
            }
        };

        if columns.is_empty() {
            return Err(BridgeError::database(
                format!("Table '{}' not found", input.table),
                None,
            ));
        }

        info!(table = %input.table, columns = columns.len(), "Described table");

        Ok(DescribeTableOutput {
            table: input.table,
            columns,
        })
    }

    async fn describe_sqlite(&self, table: &str) -> BridgeResult<Vec<ColumnDescription>> {
        // PRAGMA does not take bind parameters; the identifier is validated
        // before interpolation
        validate_identifier(table)?;
        let result = self
            .fetch_fixed(&format!("PRAGMA table_info('{}')", table), &[])
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                Some(ColumnDescription {
                    name: row.get("name")?.as_str()?.to_string(),
                    data_type: row
                        .get("type")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("")
                        .to_string(),
                    nullable: row.get("notnull").and_then(JsonValue::as_i64) == Some(0),
                    default_value: row
                        .get("dflt_value")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string),
                })
            })
            .collect())
    }

    async fn fetch_fixed(&self, sql: &str, params: &[QueryParam]) -> BridgeResult<QueryResult> {
        // Introspection never needs more rows than the hard cap
        self.executor
            .fetch(&self.pool, sql, params, Some(crate::db::types::MAX_ROW_LIMIT), None)
            .await
    }
}

/// First column of a result row as a string.
fn first_string(row: &serde_json::Map<String, JsonValue>) -> Option<String> {
    row.values().next()?.as_str().map(str::to_string)
}

fn information_schema_columns(result: &QueryResult) -> Vec<ColumnDescription> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(ColumnDescription {
                name: row.get("column_name")?.as_str()?.to_string(),
                data_type: row
                    .get("data_type")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("")
                    .to_string(),
                nullable: row.get("is_nullable").and_then(JsonValue::as_str) == Some("YES"),
                default_value: row
                    .get("column_default")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

/// Accept only plain identifiers for interpolation into PRAGMA statements.
fn validate_identifier(name: &str) -> BridgeResult<()> {
    if name.is_empty() {
        return Err(BridgeError::invalid_input("Table name must not be empty"));
    }
    if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(BridgeError::invalid_input(format!(
            "Invalid table name '{}': only alphanumeric characters and underscores are allowed",
            name
        )))
    }
}
