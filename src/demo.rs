//! Demo API served by the binary: a small calculator with callback-backed
//! accumulators, a log sink, and method listing.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use rpc_protocol::RpcError;
use rpc_server::{ApiBinder, CallbackRegistry, MethodRegistry, RegistryError, adapt};
use serde::Deserialize;
use tracing::info;

/// Application error code for arithmetic failures.
const ARITHMETIC_ERROR: i64 = 1001;

#[derive(Debug, Deserialize)]
struct LogParams {
    message: String,
    #[serde(default)]
    level: Option<String>,
}

/// Bind every demo method into `registry`. Callbacks handed to clients are
/// stored in `callbacks`.
pub fn bind(
    registry: &Arc<MethodRegistry>,
    callbacks: &Arc<CallbackRegistry>,
) -> Result<(), RegistryError> {
    ApiBinder::new(registry)
        .namespace("calc")
        .method("add", |(a, b): (i64, i64)| async move { checked(a.checked_add(b)) })?
        .method("sub", |(a, b): (i64, i64)| async move { checked(a.checked_sub(b)) })?
        .method("mul", |(a, b): (i64, i64)| async move { checked(a.checked_mul(b)) })?
        .method("div", |(a, b): (i64, i64)| async move {
            if b == 0 {
                return Err(RpcError::application(ARITHMETIC_ERROR, "Division by zero"));
            }
            checked(a.checked_div(b))
        })?;

    // Returns a {"$callback": id} the client calls via $/callback with [n]
    // to add n to a running total, and releases via $/dispose.
    let store = callbacks.clone();
    ApiBinder::new(registry)
        .namespace("calc")
        .method("accumulator", move |(start,): (i64,)| {
            let store = store.clone();
            async move {
                let total = Arc::new(AtomicI64::new(start));
                let add = adapt(move |(n,): (i64,)| {
                    let total = total.clone();
                    async move {
                        let previous = total
                            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                                current.checked_add(n)
                            })
                            .map_err(|_| RpcError::application(ARITHMETIC_ERROR, "Integer overflow"))?;
                        Ok::<_, RpcError>(previous + n)
                    }
                });
                Ok::<_, RpcError>(store.register(add).to_ref())
            }
        })?;

    // Positional ["text"] or named {"message": ..., "level": ...}
    ApiBinder::new(registry).method("log", |params: serde_json::Value| async move {
        let entry = match params {
            serde_json::Value::Array(items) => LogParams {
                message: items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(" "),
                level: None,
            },
            other => serde_json::from_value(other)
                .map_err(|e| RpcError::invalid_params(e.to_string()))?,
        };
        info!(level = entry.level.as_deref().unwrap_or("info"), "remote log: {}", entry.message);
        Ok::<_, RpcError>(())
    })?;

    // Weak, so the registry does not own a handler that owns the registry
    let methods: Weak<MethodRegistry> = Arc::downgrade(registry);
    ApiBinder::new(registry)
        .namespace("system")
        .method("methods", move |(): ()| {
            let methods = methods.clone();
            async move {
                let registry = methods
                    .upgrade()
                    .ok_or_else(|| RpcError::internal("registry dropped"))?;
                Ok::<_, RpcError>(registry.method_names())
            }
        })?;

    Ok(())
}

fn checked(value: Option<i64>) -> Result<i64, RpcError> {
    value.ok_or_else(|| RpcError::application(ARITHMETIC_ERROR, "Integer overflow"))
}
