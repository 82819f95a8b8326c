//! Read-only enforcement for caller-supplied SQL.
//!
//! `run_select_query` accepts free-text SQL, so the guard rejects anything
//! that could mutate data before it reaches the database. Three layers run
//! in order, each sufficient to reject on its own:
//!
//! 1. prefix allow-list — after comment stripping, the statement must begin
//!    with a read-only clause;
//! 2. mutation-keyword denylist over the statement with string literals,
//!    quoted identifiers, and comments removed;
//! 3. AST classification with [sqlparser](https://docs.rs/sqlparser/) using
//!    the backend's dialect; every parsed statement must be a read-only
//!    form, and unparseable input is rejected.
//!
//! The denylist alone would be bypassable and the prefix check alone is
//! shallow; together with the AST pass the guard rejects write statements
//! regardless of casing, whitespace, or formatting tricks.

use crate::db::DatabaseBackend;
use crate::error::{BridgeError, BridgeResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// Clauses a read-only statement may begin with.
const READ_ONLY_PREFIXES: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES",
];

/// Keywords that mark a statement as mutating or administrative. Checked as
/// whole tokens against the sanitized statement text.
const MUTATION_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "GRANT", "REVOKE", "ATTACH", "DETACH", "COPY", "VACUUM", "REINDEX", "CALL", "EXEC", "EXECUTE",
    "COMMIT", "ROLLBACK", "SAVEPOINT", "SET", "LOCK", "PRAGMA",
];

/// Validate that `sql` contains only read-only statements.
///
/// Returns `Ok(())` if every statement is allowed, or
/// `Err(BridgeError::InvalidInput)` naming the violation otherwise.
pub fn validate_read_only(sql: &str, backend: DatabaseBackend) -> BridgeResult<()> {
    let sanitized = sanitize(sql);
    let trimmed = sanitized.trim();

    if trimmed.is_empty() {
        return Err(BridgeError::invalid_input("Empty SQL statement"));
    }

    check_prefix(trimmed)?;
    check_denylist(trimmed)?;
    check_ast(sql, backend)?;

    Ok(())
}

/// Remove comments and blank out quoted strings/identifiers so keyword scans
/// cannot be confused by literal content.
fn sanitize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            // line comment
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            // block comment
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            // string literal / quoted identifier; '' escapes are consumed
            // because the closing quote of the pair reopens the state
            '\'' | '"' | '`' => {
                let quote = c;
                for c in chars.by_ref() {
                    if c == quote {
                        break;
                    }
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Leading keyword of the statement, handling forms like "SELECT(1)".
fn first_token(sanitized: &str) -> String {
    sanitized
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_uppercase()
}

fn check_prefix(sanitized: &str) -> BridgeResult<()> {
    let first = first_token(sanitized);
    if READ_ONLY_PREFIXES.contains(&first.as_str()) {
        Ok(())
    } else {
        Err(BridgeError::invalid_input(format!(
            "Statement must begin with a read-only clause ({}); found '{}'",
            READ_ONLY_PREFIXES.join(", "),
            first
        )))
    }
}

fn check_denylist(sanitized: &str) -> BridgeResult<()> {
    for token in sanitized.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.is_empty() {
            continue;
        }
        let upper = token.to_uppercase();
        if MUTATION_KEYWORDS.contains(&upper.as_str()) {
            return Err(BridgeError::invalid_input(format!(
                "Mutation keyword '{}' is not permitted in a read-only statement",
                upper
            )));
        }
    }
    Ok(())
}

fn get_dialect(backend: DatabaseBackend) -> Box<dyn Dialect> {
    match backend {
        DatabaseBackend::Postgres => Box::new(PostgreSqlDialect {}),
        DatabaseBackend::MySql => Box::new(MySqlDialect {}),
        DatabaseBackend::Sqlite => Box::new(SQLiteDialect {}),
    }
}

fn check_ast(sql: &str, backend: DatabaseBackend) -> BridgeResult<()> {
    let dialect = get_dialect(backend);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .map_err(|e| BridgeError::invalid_input(format!("Failed to parse SQL statement: {}", e)))?;

    if statements.is_empty() {
        return Err(BridgeError::invalid_input("Empty SQL statement"));
    }

    for stmt in &statements {
        if !is_read_only(stmt) {
            return Err(BridgeError::invalid_input(
                "Only read-only statements are permitted",
            ));
        }
    }

    Ok(())
}

fn is_read_only(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(_) => true,
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ExplainTable { .. } => true,
        // EXPLAIN is read-only only when the explained statement is
        Statement::Explain { statement, .. } => is_read_only(statement),
        _ => false,
    }
}
