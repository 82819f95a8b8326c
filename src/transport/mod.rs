//! Transport layer.
//!
//! The bridge speaks its protocol over HTTP: single-shot request/response
//! plus an optional per-session SSE push channel. The trait keeps the seam
//! the server loop is built behind, so a different transport can be slotted
//! in without touching session or capability code.

pub mod http;

pub use http::{HttpTransport, SESSION_ID_HEADER};

use crate::error::BridgeResult;
use std::future::Future;

/// Trait for protocol transport implementations.
pub trait Transport: Send + Sync {
    /// Start the transport and begin handling requests.
    ///
    /// This method should block until the transport is shut down.
    fn run(&self) -> impl Future<Output = BridgeResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
