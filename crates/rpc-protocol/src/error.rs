//! Error objects and the reserved JSON-RPC 2.0 error codes.

use serde::Serialize;
use thiserror::Error;

/// Reserved JSON-RPC 2.0 codes plus handler-supplied application codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    /// Application code chosen by a handler.
    Custom(i64),
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Custom(c) => *c,
        }
    }

    /// Canonical message text for the reserved codes.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::Custom(_) => "Application error",
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// Handlers return this for application failures; the dispatcher builds the
/// reserved variants itself.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("JSON-RPC error [{code}]: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Error carrying the canonical message for `code`.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }

    /// Application error with a handler-chosen code.
    pub fn application(code: i64, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Custom(code), message)
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::from_code(ErrorCode::ParseError)
    }

    pub fn invalid_request() -> Self {
        Self::from_code(ErrorCode::InvalidRequest)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::from_code(ErrorCode::MethodNotFound)
            .with_data(serde_json::Value::String(method.to_string()))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InvalidParams)
            .with_data(serde_json::Value::String(detail.into()))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InternalError)
            .with_data(serde_json::Value::String(detail.into()))
    }
}
