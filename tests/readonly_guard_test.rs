//! Read-only enforcement exercised through the full capability path:
//! registry -> input validation -> guard -> executor. Mutation payloads
//! must be rejected before the database collaborator sees them.

use db_bridge::capability::CapabilityRegistry;
use db_bridge::db::{DbPool, QueryExecutor};
use db_bridge::protocol::error_codes;
use db_bridge::tools;
use serde_json::json;

async fn registry_with_sqlite() -> (CapabilityRegistry, DbPool) {
    let pool = DbPool::connect("sqlite::memory:", None).await.unwrap();
    let DbPool::Sqlite(ref sqlite) = pool else {
        unreachable!()
    };
    sqlx::query("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER NOT NULL)")
        .execute(sqlite)
        .await
        .unwrap();
    sqlx::query("INSERT INTO accounts (balance) VALUES (100), (250)")
        .execute(sqlite)
        .await
        .unwrap();

    let mut registry = CapabilityRegistry::new();
    tools::register_all(&mut registry, pool.clone(), QueryExecutor::new()).unwrap();
    (registry, pool)
}

async fn row_count(pool: &DbPool) -> i64 {
    let DbPool::Sqlite(sqlite) = pool else {
        unreachable!()
    };
    sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(sqlite)
        .await
        .unwrap()
}

#[tokio::test]
async fn mutation_payloads_rejected_regardless_of_casing_and_whitespace() {
    let (registry, pool) = registry_with_sqlite().await;

    let payloads = [
        "DELETE FROM accounts",
        "delete from accounts",
        "DeLeTe FROM accounts WHERE id = 1",
        "   DELETE FROM accounts",
        "\n\t delete from accounts",
        "INSERT INTO accounts (balance) VALUES (0)",
        "insert into accounts (balance) values (0)",
        "UPDATE accounts SET balance = 0",
        "update accounts set balance = 0",
        "DROP TABLE accounts",
        "  drop table accounts",
        "TRUNCATE accounts",
        "CREATE TABLE other (id INTEGER)",
        "ALTER TABLE accounts ADD COLUMN extra TEXT",
        "REPLACE INTO accounts (id, balance) VALUES (1, 0)",
    ];

    for sql in payloads {
        let err = registry
            .invoke("run_select_query", json!({ "sql": sql }))
            .await
            .unwrap_err();
        let obj: db_bridge::protocol::ErrorObject = err.into();
        assert_eq!(
            obj.code,
            error_codes::INVALID_PARAMS,
            "payload should be rejected as invalid input: {:?}",
            sql
        );
    }

    // Nothing reached the database
    assert_eq!(row_count(&pool).await, 2);
}

#[tokio::test]
async fn smuggled_mutations_rejected() {
    let (registry, pool) = registry_with_sqlite().await;

    let payloads = [
        // write behind a read-only prefix
        "SELECT 1; DELETE FROM accounts",
        "WITH x AS (SELECT 1) DELETE FROM accounts",
        "EXPLAIN DELETE FROM accounts",
        // comment tricks
        "/* SELECT */ DELETE FROM accounts",
        "-- harmless\nDROP TABLE accounts",
        // transaction and administrative control
        "BEGIN",
        "COMMIT",
        "VACUUM",
        "PRAGMA writable_schema = 1",
        "ATTACH DATABASE 'other.db' AS other",
    ];

    for sql in payloads {
        assert!(
            registry
                .invoke("run_select_query", json!({ "sql": sql }))
                .await
                .is_err(),
            "payload should be rejected: {:?}",
            sql
        );
    }

    assert_eq!(row_count(&pool).await, 2);
}

#[tokio::test]
async fn read_only_statements_pass() {
    let (registry, _) = registry_with_sqlite().await;

    let payloads = [
        "SELECT * FROM accounts",
        "select balance from accounts where id = 1",
        "  SELECT COUNT(*) FROM accounts",
        "WITH rich AS (SELECT * FROM accounts WHERE balance > 200) SELECT * FROM rich",
        "SELECT * FROM accounts WHERE balance > ?",
        "EXPLAIN QUERY PLAN SELECT * FROM accounts",
        "VALUES (1), (2)",
        // keywords inside literals are data, not statements
        "SELECT * FROM accounts WHERE CAST(id AS TEXT) != 'DELETE'",
    ];

    for sql in payloads {
        let args = if sql.contains('?') {
            json!({ "sql": sql, "params": [0] })
        } else {
            json!({ "sql": sql })
        };
        let result = registry.invoke("run_select_query", args).await;
        assert!(result.is_ok(), "payload should pass: {:?} -> {:?}", sql, result.err());
    }
}

#[tokio::test]
async fn guard_runs_before_schema_validation_errors_reach_the_database() {
    let (registry, pool) = registry_with_sqlite().await;

    // Arguments that fail schema validation never reach the guard or the
    // database either
    let err = registry
        .invoke("run_select_query", json!({ "sql": 42 }))
        .await
        .unwrap_err();
    let obj: db_bridge::protocol::ErrorObject = err.into();
    assert_eq!(obj.code, error_codes::INVALID_PARAMS);

    assert_eq!(row_count(&pool).await, 2);
}
