//! HTTP transport: the protocol-facing dispatcher.
//!
//! One endpoint carries the whole protocol:
//!
//! - `POST` — a single protocol message; one inbound body yields exactly one
//!   JSON reply. An `initialize` message with no session header performs the
//!   handshake and receives the new identifier in the `X-Session-Id`
//!   response header; every other message must carry that header.
//! - `GET` (SSE) — opens the session's long-lived push channel. At most one
//!   stream per session; a second attach is rejected with 409 rather than
//!   superseding the first. When the client drops the stream, the session is
//!   proactively deleted so abandoned connections do not accumulate.
//! - `DELETE` — explicit session termination.
//!
//! The session identifier travels in the same header for all three, so a
//! client can move between single-shot and streaming delivery without
//! losing its session.

use crate::capability::CapabilityRegistry;
use crate::db::DbPool;
use crate::error::BridgeError;
use crate::protocol::{
    self, ErrorObject, InitializeResult, Request, RequestId, Response, ServerInfo, error_codes,
};
use crate::session::SessionStore;
use crate::transport::Transport;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::post;
use futures_util::stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Header carrying the session identifier in both delivery modes.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// SSE keep-alive interval.
const KEEP_ALIVE_SECS: u64 = 15;

/// Guidance returned to clients in the handshake result.
const INSTRUCTIONS: &str = "Read-only database bridge.\n\
    \n\
    ## Workflow\n\
    1. POST an `initialize` message (no X-Session-Id header) to open a session\n\
    2. Send every further message with the X-Session-Id response header value\n\
    3. Call `capabilities/list` to discover operations, `capabilities/call` to run them\n\
    4. Optionally GET the endpoint with the same header to receive server events\n\
    5. POST `session/close` (or DELETE the endpoint) when done\n\
    \n\
    Sessions expire after a period of inactivity; an unknown-session error\n\
    means a new handshake is required.";

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct RouterState {
    pub store: Arc<SessionStore>,
    pub capabilities: Arc<CapabilityRegistry>,
}

/// HTTP transport implementation.
pub struct HttpTransport {
    state: RouterState,
    pool: DbPool,
    host: String,
    port: u16,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        store: Arc<SessionStore>,
        capabilities: Arc<CapabilityRegistry>,
        pool: DbPool,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            state: RouterState {
                store,
                capabilities,
            },
            pool,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the protocol endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the axum router. Exposed so tests can drive the transport
    /// without binding a socket.
    pub fn router(state: RouterState, endpoint: &str) -> axum::Router {
        axum::Router::new()
            .route(
                endpoint,
                post(handle_message).get(handle_stream).delete(handle_close),
            )
            .with_state(state)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> Result<(), BridgeError> {
        let bind_addr = self.bind_addr();
        info!("Starting bridge with HTTP transport on {}", bind_addr);

        let app = Self::router(self.state.clone(), &self.endpoint);

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            BridgeError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "Bridge endpoint ready");

        // Graceful shutdown: open SSE streams may keep the server alive
        // indefinitely, so force exit after a timeout once the shutdown
        // signal is received
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(BridgeError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.pool.close().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Extract the session identifier header, if present.
fn header_session_id(headers: &HeaderMap) -> Result<Option<String>, BridgeError> {
    match headers.get(SESSION_ID_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| BridgeError::malformed("Session identifier header is not valid text")),
    }
}

fn error_response(status: StatusCode, id: Option<RequestId>, err: &BridgeError) -> HttpResponse {
    (status, Json(Response::failure(id, err.into()))).into_response()
}

/// POST: classify the message as handshake vs continuation and dispatch.
async fn handle_message(
    State(state): State<RouterState>,
    headers: HeaderMap,
    body: String,
) -> HttpResponse {
    let request: Request = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(Response::failure(
                    None,
                    ErrorObject::new(error_codes::PARSE_ERROR, format!("Invalid JSON: {}", e)),
                )),
            )
                .into_response();
        }
    };

    if let Err(err) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, request.id, &err);
    }

    let session_id = match header_session_id(&headers) {
        Ok(id) => id,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, request.id, &err),
    };

    match session_id {
        Some(id) => handle_continuation(&state, &id, request).await,
        None if request.is_initialize() => handle_initialize(&state, request).await,
        None => error_response(
            StatusCode::BAD_REQUEST,
            request.id,
            &BridgeError::malformed(
                "A session identifier is required for every message except initialize",
            ),
        ),
    }
}

/// Continuation of an existing session.
async fn handle_continuation(state: &RouterState, id: &str, request: Request) -> HttpResponse {
    let Some(session) = state.store.get(id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            request.id,
            &BridgeError::session_expired(id),
        );
    };

    if request.is_initialize() {
        return error_response(
            StatusCode::BAD_REQUEST,
            request.id,
            &BridgeError::malformed("initialize is only valid without a session identifier"),
        );
    }

    debug!(session_id = %id, method = %request.method, "Dispatching continuation");

    // Dispatch on a task of its own: if the client drops the connection
    // mid-request, the in-flight capability call still runs to completion
    // and its reply is discarded along with the connection.
    let dispatch = {
        let session = session.clone();
        tokio::spawn(async move { session.handle_message(request).await })
    };
    let response = match dispatch.await {
        Ok(response) => response,
        Err(e) => {
            error!(session_id = %id, error = %e, "Dispatch task failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                &BridgeError::internal("Request dispatch failed"),
            );
        }
    };

    // An explicit close transitions the session; the store entry goes with it
    if session.is_closed().await {
        state.store.delete(id).await;
    }

    Json(response).into_response()
}

/// Handshake: create a session and issue its identifier out-of-band.
async fn handle_initialize(state: &RouterState, request: Request) -> HttpResponse {
    let id = request.id;

    let params = match protocol::parse_initialize(request.params) {
        Ok(params) => params,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, id, &err),
    };

    let session = match state.store.create(state.capabilities.clone()).await {
        Ok(session) => session,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, id, &err),
    };

    if let Some(client) = &params.client {
        info!(
            session_id = %session.id(),
            client = %client.name,
            version = client.version.as_deref().unwrap_or("unknown"),
            "Client connected"
        );
    }

    let result = InitializeResult {
        protocol_version: protocol::PROTOCOL_VERSION.to_string(),
        session_id: session.id().to_string(),
        server: ServerInfo::current(),
        instructions: INSTRUCTIONS.to_string(),
    };
    let result = match serde_json::to_value(result) {
        Ok(value) => value,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                id,
                &BridgeError::internal(e.to_string()),
            );
        }
    };

    let mut response = Json(Response::success(id, result)).into_response();
    if let Ok(value) = HeaderValue::from_str(session.id()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// Deletes the session entry when the client side of a stream goes away.
struct StreamGuard {
    store: Arc<SessionStore>,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let store = self.store.clone();
        let session_id = std::mem::take(&mut self.session_id);
        tokio::spawn(async move {
            if store.delete(&session_id).await {
                info!(session_id = %session_id, "Session removed after stream disconnect");
            }
        });
    }
}

/// GET: attach the session's push channel and stream events until either
/// side closes.
async fn handle_stream(State(state): State<RouterState>, headers: HeaderMap) -> HttpResponse {
    let session_id = match header_session_id(&headers) {
        Ok(Some(id)) => id,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                None,
                &BridgeError::malformed(
                    "A session identifier is required to open the event stream",
                ),
            );
        }
        Err(err) => return error_response(StatusCode::BAD_REQUEST, None, &err),
    };

    let Some(session) = state.store.get(&session_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            None,
            &BridgeError::session_expired(&session_id),
        );
    };

    let rx = match session.attach_stream().await {
        Ok(rx) => rx,
        Err(err @ BridgeError::StreamConflict { .. }) => {
            return error_response(StatusCode::CONFLICT, None, &err);
        }
        Err(err) => return error_response(StatusCode::NOT_FOUND, None, &err),
    };

    session
        .push_event(
            "session/ready",
            serde_json::json!({ "session_id": session_id }),
        )
        .await;

    info!(session_id = %session_id, "Event stream opened");

    let guard = StreamGuard {
        store: state.store.clone(),
        session_id,
    };
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let sse = Event::default().event(event.event).json_data(event.data);
        Some((sse, (rx, guard)))
    });

    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(KEEP_ALIVE_SECS))
                .text("keep-alive"),
        )
        .into_response()
}

/// DELETE: explicit session termination.
async fn handle_close(State(state): State<RouterState>, headers: HeaderMap) -> HttpResponse {
    let session_id = match header_session_id(&headers) {
        Ok(Some(id)) => id,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                None,
                &BridgeError::malformed("A session identifier is required"),
            );
        }
        Err(err) => return error_response(StatusCode::BAD_REQUEST, None, &err),
    };

    if state.store.delete(&session_id).await {
        info!(session_id = %session_id, "Session terminated by client");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            None,
            &BridgeError::session_expired(&session_id),
        )
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
