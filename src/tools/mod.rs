//! The capabilities the bridge exposes, plus the read-only SQL guard.

pub mod query;
pub mod schema;
pub mod sql_guard;

pub use query::{QueryToolHandler, RunSelectQueryInput, RunSelectQueryOutput};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListTablesInput, ListTablesOutput, SchemaToolHandler,
};

use crate::capability::CapabilityRegistry;
use crate::db::{DbPool, QueryExecutor};
use crate::error::{BridgeError, BridgeResult};
use serde_json::Value as JsonValue;
use std::sync::Arc;

fn to_json<T: serde::Serialize>(value: T) -> BridgeResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| BridgeError::internal(e.to_string()))
}

/// Register every shipped capability.
///
/// Called once at startup; a duplicate name here is a configuration bug and
/// the resulting `DuplicateCapability` error is fatal.
pub fn register_all(
    registry: &mut CapabilityRegistry,
    pool: DbPool,
    executor: QueryExecutor,
) -> BridgeResult<()> {
    let query_handler = Arc::new(QueryToolHandler::new(pool.clone(), executor.clone()));
    registry.register::<RunSelectQueryInput, _, _>(
        "run_select_query",
        "Execute a read-only SQL statement and return rows plus row count.\n\
         Supports positional parameters (? or $1,$2...) to keep values out of the SQL text.\n\
         Write operations (INSERT/UPDATE/DELETE/DDL) are rejected.",
        move |input| {
            let handler = query_handler.clone();
            async move { to_json(handler.run(input).await?) }
        },
    )?;

    let schema_handler = Arc::new(SchemaToolHandler::new(pool, executor));

    let handler = schema_handler.clone();
    registry.register::<ListTablesInput, _, _>(
        "list_tables",
        "List all tables and views in the database.\n\
         PostgreSQL/MySQL accept an optional schema name.",
        move |input| {
            let handler = handler.clone();
            async move { to_json(handler.list_tables(input).await?) }
        },
    )?;

    registry.register::<DescribeTableInput, _, _>(
        "describe_table",
        "Get column information for a table: names, types, nullability, defaults.",
        move |input| {
            let handler = schema_handler.clone();
            async move { to_json(handler.describe_table(input).await?) }
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_all_registers_three_capabilities() {
        let pool = DbPool::connect("sqlite::memory:", None).await.unwrap();
        let mut registry = CapabilityRegistry::new();
        register_all(&mut registry, pool, QueryExecutor::new()).unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["describe_table", "list_tables", "run_select_query"]);
    }

    #[tokio::test]
    async fn test_registering_twice_is_fatal() {
        let pool = DbPool::connect("sqlite::memory:", None).await.unwrap();
        let mut registry = CapabilityRegistry::new();
        register_all(&mut registry, pool.clone(), QueryExecutor::new()).unwrap();
        let err = register_all(&mut registry, pool, QueryExecutor::new()).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateCapability { .. }));
    }
}
