//! Session layer: the per-connection state machine and the process-wide
//! store that owns every live session.

pub mod session;
pub mod store;

pub use session::{Session, SessionEvent, SessionState};
pub use store::{DEFAULT_SESSION_IDLE_SECS, SessionStore, generate_session_id};
