//! JSON-RPC 2.0 protocol types.
//!
//! Response envelopes, request ids, the reserved error codes, and the
//! response builders shared by the dispatcher and by generated method adapters.

pub mod error;
pub mod factory;
pub mod jsonrpc;

pub use error::{ErrorCode, RpcError};
pub use factory::{build_error_response, build_success_response};
pub use jsonrpc::{ErrorResponse, JSONRPC_VERSION, RequestId, SuccessResponse};
