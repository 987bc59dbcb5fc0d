//! JSON-RPC 2.0 envelope types and error codes.
//!
//! This module is intentionally free of business logic so the transport
//! layer stays thin and stable. Reserved codes follow the JSON-RPC spec;
//! server-defined codes live in -32099..-32000.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use grimbox_domain::DomainError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Reserved JSON-RPC error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Server-defined error codes (-32099..-32000).
pub const SESSION_EXPIRED: i32 = -32000;
pub const SESSION_INVALID: i32 = -32001;
pub const NOT_IN_COMBAT: i32 = -32002;
pub const OUT_OF_RANGE: i32 = -32003;
pub const INSUFFICIENT_RESOURCES: i32 = -32004;
pub const CONFLICT: i32 = -32005;
pub const NOT_FOUND: i32 = -32006;
pub const NO_LINE_OF_SIGHT: i32 = -32007;
pub const ALREADY_AFFECTED: i32 = -32008;
pub const REQUEST_TIMEOUT: i32 = -32009;

/// An incoming JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Absent for notifications; echoed back in the response otherwise
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    pub fn is_valid_version(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method '{method}' not found"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, detail)
    }

    pub fn session_expired() -> Self {
        Self::new(SESSION_EXPIRED, "session has expired")
    }

    pub fn session_invalid() -> Self {
        Self::new(SESSION_INVALID, "unknown or invalid session")
    }
}

impl From<&DomainError> for RpcError {
    fn from(err: &DomainError) -> Self {
        let code = match err {
            DomainError::Validation(_) | DomainError::Parse(_) => INVALID_PARAMS,
            DomainError::NotFound { .. } => NOT_FOUND,
            DomainError::NotInRange { .. } | DomainError::OutOfBounds(_) => OUT_OF_RANGE,
            DomainError::NoLineOfSight => NO_LINE_OF_SIGHT,
            DomainError::InsufficientResources(_) => INSUFFICIENT_RESOURCES,
            DomainError::AlreadyAffected => ALREADY_AFFECTED,
            DomainError::NotInCombat => NOT_IN_COMBAT,
            DomainError::Blocked(..)
            | DomainError::Constraint(_)
            | DomainError::InvalidStateTransition(_)
            | DomainError::NotYourTurn(_)
            | DomainError::InvalidTarget(_) => CONFLICT,
        };
        Self::new(code, err.to_string())
    }
}

/// An outgoing JSON-RPC response; exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let raw = json!({
            "jsonrpc": "2.0",
            "method": "joinGame",
            "params": {"player_name": "Aria"},
            "id": 1
        });
        let request: RpcRequest = serde_json::from_value(raw).expect("parses");
        assert!(request.is_valid_version());
        assert_eq!(request.method, "joinGame");
        assert_eq!(request.id, Some(json!(1)));
    }

    #[test]
    fn test_response_shape() {
        let ok = RpcResponse::success(json!(7), json!({"success": true}));
        let value = serde_json::to_value(&ok).expect("serializes");
        assert_eq!(value["jsonrpc"], "2.0");
        assert!(value.get("error").is_none());

        let err = RpcResponse::failure(json!(7), RpcError::session_expired());
        let value = serde_json::to_value(&err).expect("serializes");
        assert_eq!(value["error"]["code"], SESSION_EXPIRED);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_domain_error_mapping() {
        let err = DomainError::NotInRange {
            distance: 9,
            max: 4,
        };
        assert_eq!(RpcError::from(&err).code, OUT_OF_RANGE);

        let err = DomainError::constraint("tile occupied");
        assert_eq!(RpcError::from(&err).code, CONFLICT);

        let err = DomainError::validation("bad name");
        assert_eq!(RpcError::from(&err).code, INVALID_PARAMS);
    }

    #[test]
    fn test_server_codes_in_reserved_range() {
        for code in [
            SESSION_EXPIRED,
            SESSION_INVALID,
            NOT_IN_COMBAT,
            OUT_OF_RANGE,
            INSUFFICIENT_RESOURCES,
            CONFLICT,
            NOT_FOUND,
            NO_LINE_OF_SIGHT,
            ALREADY_AFFECTED,
            REQUEST_TIMEOUT,
        ] {
            assert!((-32099..=-32000).contains(&code));
        }
    }
}
