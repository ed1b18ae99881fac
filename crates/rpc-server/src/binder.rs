//! ApiBinder — turns typed async functions into registry handlers.
//!
//! Each bound function gets an adapter that re-reads the full request text,
//! decodes `params` into the function's parameter type, runs it, and renders
//! the response. Notifications run the function but never produce text.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use rpc_protocol::{RequestId, RpcError, build_error_response, build_success_response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{Handler, MethodRegistry};

/// Binds a group of methods into a registry, optionally under a namespace.
///
/// ```ignore
/// ApiBinder::new(&registry)
///     .namespace("calc")
///     .method("add", |(a, b): (i64, i64)| async move { Ok::<_, RpcError>(a + b) })?
///     .method("neg", |n: i64| async move { Ok::<_, RpcError>(-n) })?;
/// ```
pub struct ApiBinder<'r> {
    registry: &'r MethodRegistry,
    namespace: Option<String>,
}

impl<'r> ApiBinder<'r> {
    pub fn new(registry: &'r MethodRegistry) -> Self {
        Self {
            registry,
            namespace: None,
        }
    }

    /// Prefix every bound name with `prefix/`.
    pub fn namespace(mut self, prefix: impl Into<String>) -> Self {
        self.namespace = Some(prefix.into());
        self
    }

    /// Full method name for `name` under this binder's namespace.
    pub fn qualify(&self, name: &str) -> String {
        match &self.namespace {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        }
    }

    /// Bind a typed async function.
    pub fn method<P, R, F, Fut>(&self, name: &str, f: F) -> Result<&Self, RegistryError>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
    {
        self.handler(name, adapt(f))
    }

    /// Bind a hand-written raw handler.
    pub fn handler(&self, name: &str, handler: Handler) -> Result<&Self, RegistryError> {
        self.registry.add(self.qualify(name), handler)?;
        Ok(self)
    }
}

/// Wrap a typed async function as a raw [`Handler`].
///
/// This is what [`ApiBinder::method`] registers; it is also how typed
/// functions are handed to a
/// [`CallbackRegistry`](crate::callbacks::CallbackRegistry).
pub fn adapt<P, R, F, Fut>(f: F) -> Handler
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, RpcError>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |json: String| {
        let f = f.clone();
        async move { invoke::<P, R, F, Fut>(f.as_ref(), &json).await }.boxed()
    })
}

/// What an adapter reads back out of the request text.
struct Incoming {
    params: Value,
    id: Option<RequestId>,
    notification: bool,
}

fn read_incoming(json: &str) -> Result<Incoming, RpcError> {
    let parsed: Value = serde_json::from_str(json).map_err(|_| RpcError::parse_error())?;
    let Value::Object(mut envelope) = parsed else {
        return Err(RpcError::invalid_request());
    };

    Ok(Incoming {
        params: envelope.remove("params").unwrap_or(Value::Null),
        id: envelope.get("id").and_then(RequestId::recover),
        notification: !envelope.contains_key("id"),
    })
}

async fn invoke<P, R, F, Fut>(f: &F, json: &str) -> Option<String>
where
    P: DeserializeOwned,
    R: Serialize,
    F: Fn(P) -> Fut,
    Fut: Future<Output = Result<R, RpcError>>,
{
    let incoming = match read_incoming(json) {
        Ok(incoming) => incoming,
        Err(e) => return Some(build_error_response(None, e)),
    };

    let outcome = match serde_json::from_value::<P>(incoming.params) {
        Ok(params) => f(params).await.and_then(|result| {
            serde_json::to_value(result).map_err(|e| RpcError::internal(e.to_string()))
        }),
        Err(e) => Err(RpcError::invalid_params(e.to_string())),
    };

    if incoming.notification {
        if let Err(e) = outcome {
            debug!("Notification handler failed: {e}");
        }
        return None;
    }

    Some(match outcome {
        Ok(result) => build_success_response(incoming.id, result),
        Err(e) => build_error_response(incoming.id, e),
    })
}
