//! Error types for the bridge.
//!
//! This module defines all error types using `thiserror`. The variants follow
//! the protocol's error taxonomy: transport-level rejections
//! (`MalformedRequest`, `SessionExpired`, `StreamConflict`) map to 4xx HTTP
//! responses, while capability-level failures (`InvalidInput`,
//! `CapabilityExecution`) travel as structured error payloads inside an
//! otherwise successful exchange.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("Unknown or expired session: {session_id}")]
    SessionExpired { session_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unknown capability: {name}")]
    CapabilityNotFound { name: String },

    #[error("Capability execution failed: {message}")]
    CapabilityExecution { message: String },

    #[error("Capability '{name}' is already registered")]
    DuplicateCapability { name: String },

    #[error("Session {session_id} already has an active event stream")]
    StreamConflict { session_id: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create a malformed request error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Create a session expired error.
    pub fn session_expired(session_id: impl Into<String>) -> Self {
        Self::SessionExpired {
            session_id: session_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a capability not found error.
    pub fn capability_not_found(name: impl Into<String>) -> Self {
        Self::CapabilityNotFound { name: name.into() }
    }

    /// Create a capability execution error.
    pub fn capability_execution(message: impl Into<String>) -> Self {
        Self::CapabilityExecution {
            message: message.into(),
        }
    }

    /// Create a duplicate capability error.
    pub fn duplicate_capability(name: impl Into<String>) -> Self {
        Self::DuplicateCapability { name: name.into() }
    }

    /// Create a stream conflict error.
    pub fn stream_conflict(session_id: impl Into<String>) -> Self {
        Self::StreamConflict {
            session_id: session_id.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for errors the transport router rejects before a session ever
    /// sees the payload (mapped to 4xx responses).
    pub fn is_transport_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest { .. }
                | Self::SessionExpired { .. }
                | Self::StreamConflict { .. }
        )
    }
}

/// Convert sqlx errors to BridgeError.
impl From<sqlx::Error> for BridgeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => BridgeError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                BridgeError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => BridgeError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => BridgeError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                BridgeError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => BridgeError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => BridgeError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => BridgeError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                BridgeError::database(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => BridgeError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                BridgeError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                BridgeError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => BridgeError::internal("Database worker crashed"),
            _ => BridgeError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
