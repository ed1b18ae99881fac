//! RpcServer — validates JSON-RPC envelopes and dispatches them to handlers.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future;
use rpc_protocol::{
    ErrorCode, JSONRPC_VERSION, RequestId, RpcError, build_error_response, build_success_response,
};
use rpc_transport::MessageHandler;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::callbacks::{
    CALLBACK_METHOD, CallbackInvocation, CallbackRef, CallbackRegistry, DISPOSE_METHOD,
};
use crate::error::ServerError;
use crate::registry::{MethodRegistry, ResponseFuture};

/// The dispatch engine. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<MethodRegistry>,
    callbacks: Arc<CallbackRegistry>,
    /// Worker pool that runs handler futures.
    runtime: Handle,
}

/// The parts of an envelope the dispatcher needs.
#[derive(Debug)]
struct Call {
    method: String,
    params: Option<Value>,
    id: Option<RequestId>,
    notification: bool,
}

/// An envelope rejected before any handler lookup.
#[derive(Debug)]
struct Rejection {
    id: Option<RequestId>,
    error: RpcError,
}

impl RpcServer {
    pub fn new(registry: Arc<MethodRegistry>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                callbacks: Arc::new(CallbackRegistry::new()),
                runtime,
            }),
        }
    }

    /// Build a server on the runtime of the calling thread.
    pub fn from_current(registry: Arc<MethodRegistry>) -> Result<Self, ServerError> {
        Ok(Self::new(registry, Handle::try_current()?))
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.inner.registry
    }

    /// Callbacks reachable through the reserved `$/callback` and `$/dispose`
    /// methods.
    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.inner.callbacks
    }

    /// Process one incoming message.
    ///
    /// Returns immediately. Rejected envelopes resolve at once; accepted ones
    /// resolve when the handler finishes. `None` means nothing is sent back.
    pub fn receive(&self, json: &str) -> ResponseFuture {
        let call = match parse_envelope(json) {
            Ok(call) => call,
            Err(rejection) => {
                warn!(code = rejection.error.code, id = ?rejection.id, "Rejected message");
                let response = build_error_response(rejection.id, rejection.error);
                return future::ready(Some(response)).boxed();
            }
        };

        match call.method.as_str() {
            CALLBACK_METHOD => return self.invoke_callback(call),
            DISPOSE_METHOD => return self.dispose_callback(call),
            _ => {}
        }

        let Some(handler) = self.inner.registry.get(&call.method) else {
            warn!(method = %call.method, "Method not found");
            let error = RpcError::method_not_found(&call.method);
            return answer_error(call, error);
        };

        debug!(method = %call.method, id = ?call.id, "Dispatching");

        // The handler is called inside the task so a panic while building its
        // future is caught by the join handle as well.
        let json = json.to_string();
        self.run(call, async move { handler(json).await })
    }

    fn invoke_callback(&self, mut call: Call) -> ResponseFuture {
        let target: CallbackInvocation = match take_params(&mut call) {
            Ok(target) => target,
            Err(error) => return answer_error(call, error),
        };

        let mut request = Map::new();
        request.insert("jsonrpc".into(), JSONRPC_VERSION.into());
        request.insert("method".into(), CALLBACK_METHOD.into());
        request.insert("params".into(), target.args);
        if !call.notification {
            request.insert("id".into(), call.id.clone().map_or(Value::Null, Value::from));
        }
        let request = Value::Object(request).to_string();
        let callback = target.id;

        debug!(%callback, id = ?call.id, "Invoking callback");

        let callbacks = self.inner.callbacks.clone();
        let (reply_id, notification) = (call.id.clone(), call.notification);
        self.run(call, async move {
            match callbacks.invoke(callback, request) {
                Ok(response) => response.await,
                Err(e) => {
                    warn!("{e}");
                    let error = RpcError::from_code(ErrorCode::MethodNotFound)
                        .with_data(Value::String(callback.to_string()));
                    (!notification).then(|| build_error_response(reply_id, error))
                }
            }
        })
    }

    fn dispose_callback(&self, mut call: Call) -> ResponseFuture {
        let target: CallbackRef = match take_params(&mut call) {
            Ok(target) => target,
            Err(error) => return answer_error(call, error),
        };

        let disposed = self.inner.callbacks.dispose(target.id);
        if call.notification {
            return future::ready(None).boxed();
        }
        future::ready(Some(build_success_response(call.id, Value::Bool(disposed)))).boxed()
    }

    /// Run `work` on the worker pool. A panic inside it becomes an internal
    /// error, or nothing for notifications.
    fn run(
        &self,
        call: Call,
        work: impl Future<Output = Option<String>> + Send + 'static,
    ) -> ResponseFuture {
        let task = self.inner.runtime.spawn(work);

        async move {
            match task.await {
                Ok(response) => response,
                Err(e) => {
                    warn!(method = %call.method, id = ?call.id, "Handler failed: {e}");
                    let error = RpcError::internal(format!("handler for {} failed", call.method));
                    (!call.notification).then(|| build_error_response(call.id, error))
                }
            }
        }
        .boxed()
    }
}

impl MessageHandler for RpcServer {
    fn handle_message(&self, text: String) -> impl Future<Output = Option<String>> + Send {
        self.receive(&text)
    }

    fn method_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("registry", &self.inner.registry)
            .field("callbacks", &self.inner.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// Error reply for an accepted envelope. Notifications get nothing.
fn answer_error(call: Call, error: RpcError) -> ResponseFuture {
    if call.notification {
        return future::ready(None).boxed();
    }
    future::ready(Some(build_error_response(call.id, error))).boxed()
}

/// Decode the call's params. Missing params decode from `null`.
fn take_params<T: DeserializeOwned>(call: &mut Call) -> Result<T, RpcError> {
    let params = call.params.take().unwrap_or(Value::Null);
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Parse, then check the protocol tag, then the method field. Each check
/// assumes the previous one passed.
fn parse_envelope(json: &str) -> Result<Call, Rejection> {
    let parsed: Value = serde_json::from_str(json).map_err(|_| Rejection {
        id: None,
        error: RpcError::parse_error(),
    })?;

    let Value::Object(mut envelope) = parsed else {
        return Err(Rejection {
            id: None,
            error: RpcError::invalid_request(),
        });
    };

    let id = envelope.get("id").and_then(RequestId::recover);
    let notification = !envelope.contains_key("id");

    if envelope.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(Rejection {
            id,
            error: RpcError::invalid_request(),
        });
    }

    let Some(Value::String(method)) = envelope.remove("method") else {
        return Err(Rejection {
            id,
            error: RpcError::invalid_request(),
        });
    };

    Ok(Call {
        method,
        params: envelope.remove("params"),
        id,
        notification,
    })
}
