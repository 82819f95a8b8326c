//! db-bridge library.
//!
//! A bridge process exposing read-only database-query capabilities to
//! automation clients over a session-oriented HTTP protocol (single-shot
//! request/response plus an optional SSE push channel per session).

pub mod capability;
pub mod config;
pub mod db;
pub mod error;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;

pub use capability::CapabilityRegistry;
pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use session::{Session, SessionStore};
