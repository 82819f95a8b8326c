//! Wire format for the bridge protocol.
//!
//! Messages are JSON-RPC 2.0 exchanged over HTTP. A client opens a session
//! with `initialize` (no session header), then drives it with
//! `capabilities/list`, `capabilities/call`, and `session/close`
//! continuations that carry the session identifier in the `X-Session-Id`
//! header. The same header is used for the SSE event stream, so clients can
//! move between single-shot and streaming delivery without losing the
//! session.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Protocol revision negotiated during the handshake.
pub const PROTOCOL_VERSION: &str = "1.0";

/// JSON-RPC error codes used by the bridge.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Unknown or stale session identifier; the client must re-handshake.
    pub const SESSION_EXPIRED: i64 = -32000;
    /// The capability handler or its database call failed.
    pub const CAPABILITY_FAILED: i64 = -32001;
}

/// Request identifier; clients may use numbers or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// An inbound protocol message.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

impl Request {
    /// Structural validation shared by every delivery mode.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.jsonrpc != "2.0" {
            return Err(BridgeError::malformed(format!(
                "Unsupported jsonrpc version '{}', expected \"2.0\"",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(BridgeError::malformed("Missing method"));
        }
        Ok(())
    }

    pub fn is_initialize(&self) -> bool {
        self.method == methods::INITIALIZE
    }
}

/// Method names understood by a session.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const CAPABILITIES_LIST: &str = "capabilities/list";
    pub const CAPABILITIES_CALL: &str = "capabilities/call";
    pub const SESSION_CLOSE: &str = "session/close";
}

/// An outbound protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Build a success response.
    pub fn success(id: Option<RequestId>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&BridgeError> for ErrorObject {
    fn from(err: &BridgeError) -> Self {
        use error_codes::*;
        let code = match err {
            BridgeError::MalformedRequest { .. } => INVALID_REQUEST,
            BridgeError::SessionExpired { .. } => SESSION_EXPIRED,
            BridgeError::InvalidInput { .. } => INVALID_PARAMS,
            BridgeError::CapabilityNotFound { .. } => METHOD_NOT_FOUND,
            BridgeError::CapabilityExecution { .. } => CAPABILITY_FAILED,
            BridgeError::StreamConflict { .. } => INVALID_REQUEST,
            BridgeError::Connection { suggestion, .. } => {
                return ErrorObject::new(INTERNAL_ERROR, err.to_string())
                    .with_data(serde_json::json!({ "suggestion": suggestion }));
            }
            _ => INTERNAL_ERROR,
        };
        ErrorObject::new(code, err.to_string())
    }
}

impl From<BridgeError> for ErrorObject {
    fn from(err: BridgeError) -> Self {
        ErrorObject::from(&err)
    }
}

/// Client-supplied handshake parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub client: Option<ClientInfo>,
}

/// Identity the client reports during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Handshake result returned to the client. The session identifier is also
/// issued in the `X-Session-Id` response header; the copy here is for
/// clients that only look at bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub session_id: String,
    pub server: ServerInfo,
    pub instructions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Validate and decode handshake parameters.
///
/// A missing `params` object is accepted (all fields are optional); a
/// mismatched protocol version is not.
pub fn parse_initialize(params: Option<JsonValue>) -> Result<InitializeParams, BridgeError> {
    let params: InitializeParams = match params {
        None => InitializeParams::default(),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| BridgeError::malformed(format!("Invalid initialize params: {}", e)))?,
    };
    if let Some(ref requested) = params.protocol_version {
        if requested != PROTOCOL_VERSION {
            return Err(BridgeError::malformed(format!(
                "Unsupported protocol version '{}', server speaks '{}'",
                requested, PROTOCOL_VERSION
            )));
        }
    }
    Ok(params)
}

/// Parameters of a `capabilities/call` request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let req: Request = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"method":"capabilities/call","params":{"name":"list_tables"}}"#,
        )
        .unwrap();
        assert_eq!(req.id, Some(RequestId::Number(1)));
        assert_eq!(req.method, "capabilities/call");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_string_id() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"abc","method":"initialize"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::String("abc".to_string())));
        assert!(req.is_initialize());
    }

    #[test]
    fn test_request_rejects_wrong_version() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"1.0","id":1,"method":"initialize"}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, BridgeError::MalformedRequest { .. }));
    }

    #[test]
    fn test_response_serialization_omits_absent_fields() {
        let resp = Response::success(Some(RequestId::Number(7)), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));

        let resp = Response::failure(
            Some(RequestId::Number(7)),
            ErrorObject::new(error_codes::INVALID_PARAMS, "bad"),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("-32602"));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_error_code_mapping() {
        let obj: ErrorObject = BridgeError::invalid_input("x").into();
        assert_eq!(obj.code, error_codes::INVALID_PARAMS);

        let obj: ErrorObject = BridgeError::session_expired("s").into();
        assert_eq!(obj.code, error_codes::SESSION_EXPIRED);

        let obj: ErrorObject = BridgeError::capability_execution("boom").into();
        assert_eq!(obj.code, error_codes::CAPABILITY_FAILED);

        let obj: ErrorObject = BridgeError::capability_not_found("nope").into();
        assert_eq!(obj.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_connection_error_carries_suggestion() {
        let obj: ErrorObject = BridgeError::connection("down", "retry later").into();
        assert_eq!(obj.code, error_codes::INTERNAL_ERROR);
        assert_eq!(obj.data.unwrap()["suggestion"], "retry later");
    }

    #[test]
    fn test_parse_initialize_defaults() {
        let params = parse_initialize(None).unwrap();
        assert!(params.protocol_version.is_none());
        assert!(params.client.is_none());
    }

    #[test]
    fn test_parse_initialize_version_mismatch() {
        let err =
            parse_initialize(Some(serde_json::json!({"protocol_version": "9.9"}))).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedRequest { .. }));
    }
}
