//! One protocol session.
//!
//! A session is the conversational context behind one identifier. It walks
//! the state machine `AwaitingHandshake → Active → Closed`: `activate`
//! completes the handshake, continuations are dispatched through
//! `handle_message`, and `close` is terminal. Request handling within a
//! session is strictly sequential — `handle_message` holds the dispatch
//! mutex for the duration of the call, so a second request for the same
//! session queues behind the first. A session owns at most one live event
//! stream; a second attach attempt is rejected rather than superseding the
//! first.

use crate::capability::CapabilityRegistry;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{CallParams, ErrorObject, Request, Response, error_codes, methods};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// Buffered events per session stream before pushes start to backpressure.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Active,
    Closed,
}

/// A server-initiated payload delivered over the session's event stream.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub event: String,
    pub data: JsonValue,
}

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    capabilities: Arc<CapabilityRegistry>,
    state: Mutex<SessionState>,
    /// Serializes request handling within this session.
    dispatch: Mutex<()>,
    /// The single live push channel, if a stream is attached.
    stream: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    last_activity: Mutex<Instant>,
}

impl Session {
    /// Create a session in `AwaitingHandshake`.
    pub fn new(id: String, capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            capabilities,
            state: Mutex::new(SessionState::AwaitingHandshake),
            dispatch: Mutex::new(()),
            stream: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn is_closed(&self) -> bool {
        self.state().await == SessionState::Closed
    }

    /// Complete the handshake: `AwaitingHandshake → Active`.
    pub async fn activate(&self) -> BridgeResult<()> {
        let mut state = self.state.lock().await;
        match *state {
            SessionState::AwaitingHandshake => {
                *state = SessionState::Active;
                Ok(())
            }
            _ => Err(BridgeError::malformed("Handshake already completed")),
        }
    }

    /// Transition to `Closed`. Returns true if this call performed the
    /// transition, false if the session was already closed. Dropping the
    /// stream sender ends an attached event stream.
    pub async fn close(&self) -> bool {
        let transitioned = {
            let mut state = self.state.lock().await;
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        };
        if transitioned {
            self.stream.lock().await.take();
            info!(session_id = %self.id, "Session closed");
        }
        transitioned
    }

    /// Time since the last handled message or stream attach.
    pub async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// Attach the session's single event stream.
    ///
    /// Fails with `StreamConflict` while a previous stream is still live;
    /// the caller must close the session (or let the old stream drop) first.
    pub async fn attach_stream(&self) -> BridgeResult<mpsc::Receiver<SessionEvent>> {
        if self.state().await != SessionState::Active {
            return Err(BridgeError::session_expired(&self.id));
        }
        self.touch().await;
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Err(BridgeError::stream_conflict(&self.id));
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *stream = Some(tx);
        debug!(session_id = %self.id, "Event stream attached");
        Ok(rx)
    }

    /// Deliver a server-initiated event. Returns false when no stream is
    /// attached or the receiver is gone; pushes are best-effort.
    pub async fn push_event(&self, event: impl Into<String>, data: JsonValue) -> bool {
        let sender = self.stream.lock().await.clone();
        match sender {
            Some(tx) => tx
                .send(SessionEvent {
                    event: event.into(),
                    data,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Handle one continuation message.
    ///
    /// Requests are processed under the dispatch mutex, in the order the
    /// transport delivers them; no two capability invocations for this
    /// session run concurrently.
    pub async fn handle_message(&self, request: Request) -> Response {
        let _guard = self.dispatch.lock().await;
        self.touch().await;

        let id = request.id.clone();

        if self.state().await != SessionState::Active {
            return Response::failure(id, BridgeError::session_expired(&self.id).into());
        }

        let outcome: Result<JsonValue, ErrorObject> = match request.method.as_str() {
            methods::INITIALIZE => Err(BridgeError::malformed(
                "Session is already initialized; initialize is only valid without a session identifier",
            )
            .into()),
            methods::CAPABILITIES_LIST => Ok(serde_json::json!({
                "capabilities": self.capabilities.list(),
            })),
            methods::CAPABILITIES_CALL => {
                self.handle_call(request.params).await.map_err(Into::into)
            }
            methods::SESSION_CLOSE => {
                self.close().await;
                Ok(serde_json::json!({ "closed": true }))
            }
            other => Err(ErrorObject::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method '{}'", other),
            )),
        };

        match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        }
    }

    async fn handle_call(&self, params: Option<JsonValue>) -> BridgeResult<JsonValue> {
        let params = params
            .ok_or_else(|| BridgeError::invalid_input("Missing params for capabilities/call"))?;
        let call: CallParams = serde_json::from_value(params)
            .map_err(|e| BridgeError::invalid_input(format!("Invalid call params: {}", e)))?;
        let arguments = call.arguments.unwrap_or_else(|| serde_json::json!({}));

        debug!(session_id = %self.id, capability = %call.name, "Invoking capability");
        self.capabilities.invoke(&call.name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    fn request(method: &str, params: Option<JsonValue>) -> Request {
        serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct NoopInput {}

    fn test_session() -> Session {
        let mut registry = CapabilityRegistry::new();
        registry
            .register::<NoopInput, _, _>("noop", "Do nothing.", |_| async move {
                Ok(JsonValue::Null)
            })
            .unwrap();
        Session::new("ses_test".to_string(), Arc::new(registry))
    }

    #[tokio::test]
    async fn test_state_machine_transitions() {
        let session = test_session();
        assert_eq!(session.state().await, SessionState::AwaitingHandshake);
        session.activate().await.unwrap();
        assert_eq!(session.state().await, SessionState::Active);
        // re-activation is a handshake violation
        assert!(session.activate().await.is_err());
        assert!(session.close().await);
        assert_eq!(session.state().await, SessionState::Closed);
        // close is terminal and idempotent
        assert!(!session.close().await);
        assert!(session.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_handle_message_dispatches_capability() {
        let session = test_session();
        session.activate().await.unwrap();
        let resp = session
            .handle_message(request(
                "capabilities/call",
                Some(serde_json::json!({"name": "noop"})),
            ))
            .await;
        assert_eq!(resp.id, Some(RequestId::Number(1)));
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn test_handle_message_lists_capabilities() {
        let session = test_session();
        session.activate().await.unwrap();
        let resp = session.handle_message(request("capabilities/list", None)).await;
        let result = resp.result.unwrap();
        assert_eq!(result["capabilities"][0]["name"], "noop");
    }

    #[tokio::test]
    async fn test_unknown_method_is_embedded_error() {
        let session = test_session();
        session.activate().await.unwrap();
        let resp = session.handle_message(request("no/such/method", None)).await;
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
        // session stays usable
        assert_eq!(session.state().await, SessionState::Active);
    }

    #[tokio::test]
    async fn test_initialize_on_active_session_rejected() {
        let session = test_session();
        session.activate().await.unwrap();
        let resp = session.handle_message(request("initialize", None)).await;
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_session_close_method() {
        let session = test_session();
        session.activate().await.unwrap();
        let resp = session.handle_message(request("session/close", None)).await;
        assert!(resp.error.is_none());
        assert!(session.is_closed().await);
    }

    #[tokio::test]
    async fn test_stream_exclusivity() {
        let session = test_session();
        session.activate().await.unwrap();

        let _rx = session.attach_stream().await.unwrap();
        let err = session.attach_stream().await.unwrap_err();
        assert!(matches!(err, BridgeError::StreamConflict { .. }));
    }

    #[tokio::test]
    async fn test_push_event_reaches_stream() {
        let session = test_session();
        session.activate().await.unwrap();

        let mut rx = session.attach_stream().await.unwrap();
        assert!(
            session
                .push_event("session/ready", serde_json::json!({}))
                .await
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "session/ready");

        // closing drops the sender and ends the stream
        session.close().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_push_event_without_stream_is_noop() {
        let session = test_session();
        session.activate().await.unwrap();
        assert!(
            !session
                .push_event("session/ready", serde_json::json!({}))
                .await
        );
    }
}
