//! MethodRegistry — concurrent mapping from method name to handler.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Pending result of handling one message: response text, or `None` when no
/// response should be sent.
pub type ResponseFuture = BoxFuture<'static, Option<String>>;

/// A method adapter. Receives the entire original request text and resolves
/// to the response text, or `None` for notifications.
pub type Handler = Arc<dyn Fn(String) -> ResponseFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    Arc::new(move |json| f(json).boxed())
}

/// Method names under this prefix are handled by the dispatcher itself.
pub const RESERVED_PREFIX: &str = "$/";

/// What `add` does when a name is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    /// Replace the existing handler (last registration wins).
    #[default]
    Overwrite,
    /// Keep the existing handler and return [`RegistryError::Duplicate`].
    Reject,
}

/// Thread-safe method registry.
///
/// Entries are added during setup, possibly from several binders at once,
/// and read on every request. There is no removal. Backed by a sharded
/// `DashMap`, so lookups only contend with writers on the same shard.
pub struct MethodRegistry {
    methods: DashMap<String, Handler>,
    policy: RegistrationPolicy,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::with_policy(RegistrationPolicy::default())
    }

    pub fn with_policy(policy: RegistrationPolicy) -> Self {
        Self {
            methods: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Register `handler` under `name`.
    pub fn add(&self, name: impl Into<String>, handler: Handler) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(RegistryError::Reserved(name));
        }

        match self.methods.entry(name) {
            Entry::Vacant(slot) => {
                debug!("Registered method: {}", slot.key());
                slot.insert(handler);
                Ok(())
            }
            Entry::Occupied(mut slot) => match self.policy {
                RegistrationPolicy::Overwrite => {
                    warn!("Method re-registered, replacing handler: {}", slot.key());
                    slot.insert(handler);
                    Ok(())
                }
                RegistrationPolicy::Reject => Err(RegistryError::Duplicate(slot.key().clone())),
            },
        }
    }

    /// Look up the handler for `name`. Never awaits.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.methods.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("policy", &self.policy)
            .field("methods", &self.method_names())
            .finish()
    }
}
