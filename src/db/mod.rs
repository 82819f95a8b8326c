//! Database layer: connection pool, statement execution, row conversion.

pub mod executor;
pub mod pool;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{DatabaseBackend, DbPool};
pub use types::{ColumnMetadata, QueryParam, QueryResult};
