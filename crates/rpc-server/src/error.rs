//! Error types for server setup. Request-level failures are never errors;
//! they become response values inside `RpcServer::receive`.

use thiserror::Error;

use crate::callbacks::CallbackId;

/// Configuration error raised while registering methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("method name must not be empty")]
    EmptyName,

    #[error("method name is reserved for the dispatcher: {0}")]
    Reserved(String),

    #[error("method already registered: {0}")]
    Duplicate(String),
}

/// Failure to invoke a disposable callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("callback has been disposed or never existed: {0}")]
    Disposed(CallbackId),
}

/// Failure to construct a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no tokio runtime is running on this thread")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
