//! JSON-RPC 2.0 response envelopes and request ids.
//!
//! Field declaration order matches the wire order used in responses:
//! `jsonrpc`, then `result` or `error`, then `id`.

use serde::Serialize;

use crate::error::RpcError;

/// The only protocol tag this server accepts.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID, either a string or a number.
///
/// Numbers keep their source text (serde_json `arbitrary_precision`), so an
/// id such as `123456789012345678901234567890` is echoed digit for digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(serde_json::Number),
}

impl RequestId {
    /// Recover an id from an arbitrary JSON value. Only strings and numbers
    /// are valid ids; anything else yields `None`.
    pub fn recover(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Number(n) => Some(Self::Number(n.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<RequestId> for serde_json::Value {
    fn from(id: RequestId) -> Self {
        match id {
            RequestId::String(s) => Self::String(s),
            RequestId::Number(n) => Self::Number(n),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// JSON-RPC 2.0 success response. A `None` id serializes as `null`, which
/// happens when the request carried an explicit `null` id.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub jsonrpc: &'static str,
    pub result: serde_json::Value,
    pub id: Option<RequestId>,
}

/// JSON-RPC 2.0 error response. A `None` id serializes as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub jsonrpc: &'static str,
    pub error: RpcError,
    pub id: Option<RequestId>,
}

impl SuccessResponse {
    pub fn new(id: Option<RequestId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result,
            id,
        }
    }
}

impl ErrorResponse {
    pub fn new(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            error,
            id,
        }
    }
}
