//! CallbackRegistry — disposable function handles that can cross the wire.
//!
//! A method that needs to hand a function to the remote side registers it
//! here and returns the [`CallbackRef`] marker instead. The remote side then
//! calls it through the reserved methods handled by the dispatcher:
//!
//! ```text
//! {"jsonrpc":"2.0","method":"$/callback","params":{"$callback":"<uuid>","args":[1]},"id":1}
//! {"jsonrpc":"2.0","method":"$/dispose","params":{"$callback":"<uuid>"},"id":2}
//! ```
//!
//! The callback's handler receives a request whose `params` are `args` and
//! whose `id` is the caller's. Disposal is always explicit.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::CallbackError;
use crate::registry::{Handler, ResponseFuture};

/// Identifier of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(Uuid);

impl CallbackId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Wire marker standing in for a function value: `{"$callback": "<uuid>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRef {
    #[serde(rename = "$callback")]
    pub id: CallbackId,
}

/// Reserved method that invokes a live callback.
pub const CALLBACK_METHOD: &str = "$/callback";

/// Reserved method that disposes a callback; resolves to whether it was live.
pub const DISPOSE_METHOD: &str = "$/dispose";

/// Params of a [`CALLBACK_METHOD`] call.
#[derive(Debug, Deserialize)]
pub(crate) struct CallbackInvocation {
    #[serde(rename = "$callback")]
    pub id: CallbackId,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Keyed store of live callbacks.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<CallbackId, Handler>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under a fresh id.
    pub fn register(self: &Arc<Self>, handler: Handler) -> CallbackHandle {
        let id = CallbackId::new();
        self.callbacks.write().insert(id, handler);
        debug!("Callback registered: {id}");
        CallbackHandle {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Invoke a live callback with a raw request text.
    pub fn invoke(&self, id: CallbackId, json: String) -> Result<ResponseFuture, CallbackError> {
        // Clone out of the lock so the callback runs without holding it
        let handler = self
            .callbacks
            .read()
            .get(&id)
            .cloned()
            .ok_or(CallbackError::Disposed(id))?;
        Ok(handler(json))
    }

    /// Remove a callback. Returns `false` if it was already gone.
    pub fn dispose(&self, id: CallbackId) -> bool {
        let removed = self.callbacks.write().remove(&id).is_some();
        if removed {
            debug!("Callback disposed: {id}");
        }
        removed
    }

    pub fn contains(&self, id: CallbackId) -> bool {
        self.callbacks.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }
}

/// Owner-side handle to a registered callback.
///
/// Dropping the handle does not dispose the callback.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    id: CallbackId,
    registry: Weak<CallbackRegistry>,
}

impl CallbackHandle {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Marker to embed in params or results.
    pub fn to_ref(&self) -> CallbackRef {
        CallbackRef { id: self.id }
    }

    /// Dispose the callback. Returns `false` if it was already disposed or
    /// the registry no longer exists.
    pub fn dispose(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.dispose(self.id))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::handler_fn;

    fn echo() -> Handler {
        handler_fn(|json| async move { Some(format!("echo:{json}")) })
    }

    #[tokio::test]
    async fn register_invoke_dispose() {
        let registry = Arc::new(CallbackRegistry::new());
        let handle = registry.register(echo());
        let id = handle.id();

        let out = registry.invoke(id, "x".into()).unwrap().await;
        assert_eq!(out.as_deref(), Some("echo:x"));

        assert!(handle.dispose());
        assert!(registry.is_empty());
        assert_eq!(registry.invoke(id, "x".into()).err(), Some(CallbackError::Disposed(id)));
    }

    #[test]
    fn double_dispose_reports_false() {
        let registry = Arc::new(CallbackRegistry::new());
        let handle = registry.register(echo());
        let id = handle.id();

        assert!(registry.dispose(id));
        assert!(!registry.dispose(id));
        assert!(!handle.dispose());
    }

    #[test]
    fn dropping_handle_keeps_callback() {
        let registry = Arc::new(CallbackRegistry::new());
        let id = registry.register(echo()).id();
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn handle_outliving_registry() {
        let registry = Arc::new(CallbackRegistry::new());
        let handle = registry.register(echo());
        drop(registry);
        assert!(!handle.dispose());
    }

    #[test]
    fn callback_ref_wire_form() {
        let registry = Arc::new(CallbackRegistry::new());
        let handle = registry.register(echo());

        let wire = serde_json::to_value(handle.to_ref()).unwrap();
        assert_eq!(wire, json!({"$callback": handle.id().to_string()}));

        let back: CallbackRef = serde_json::from_value(wire).unwrap();
        assert_eq!(back.id, handle.id());
    }
}
