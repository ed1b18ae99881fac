//! Response builders.
//!
//! Both builders are pure: they render an envelope to text and never fail.
//! Should serialization ever fail (it cannot for `serde_json::Value` payloads),
//! a fixed internal-error envelope is returned instead.

use serde::Serialize;

use crate::error::RpcError;
use crate::jsonrpc::{ErrorResponse, RequestId, SuccessResponse};

const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

/// Render an error response correlated to `id` (`null` when unknown).
pub fn build_error_response(id: Option<RequestId>, error: RpcError) -> String {
    render(&ErrorResponse::new(id, error))
}

/// Render a success response carrying `result`.
pub fn build_success_response(id: Option<RequestId>, result: serde_json::Value) -> String {
    render(&SuccessResponse::new(id, result))
}

fn render<T: Serialize>(envelope: &T) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|_| FALLBACK_RESPONSE.to_string())
}
