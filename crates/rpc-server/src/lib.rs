//! JSON-RPC 2.0 dispatch engine.
//!
//! Methods are registered as `(name, handler)` pairs in a [`MethodRegistry`],
//! usually through an [`ApiBinder`]. [`RpcServer::receive`] validates each
//! incoming message, resolves its handler, and resolves to the response text
//! (or nothing, for notifications). Functions handed to the remote side live
//! in a [`CallbackRegistry`] and are reached through the reserved `$/callback`
//! and `$/dispose` methods. The server implements the transport's
//! `MessageHandler` so it can be served directly.

pub mod binder;
pub mod callbacks;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use binder::{ApiBinder, adapt};
pub use callbacks::{
    CALLBACK_METHOD, CallbackHandle, CallbackId, CallbackRef, CallbackRegistry, DISPOSE_METHOD,
};
pub use dispatcher::RpcServer;
pub use error::{CallbackError, RegistryError, ServerError};
pub use registry::{
    Handler, MethodRegistry, RESERVED_PREFIX, RegistrationPolicy, ResponseFuture,
    handler_fn,
};
