//! JSON-RPC Transport Layer
//!
//! Serves a [`MessageHandler`] over WebSocket (`/ws`) and HTTP (`/rpc`).
//! The transport never interprets payloads: each text message goes to the
//! handler and whatever text comes back is written to the peer. Handlers that
//! resolve to `None` send nothing (HTTP answers `204 No Content`).

pub mod server;

pub use server::{MessageHandler, TransportConfig, TransportError, TransportServer};
