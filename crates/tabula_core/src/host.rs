//! Host bridge abstraction.
//!
//! The host application owns the real data. It pushes change batches into a
//! [`Base`](crate::Base) and serves fetches for data that is not resident by
//! default (table records, cursor selection). This module defines the
//! outbound half of that contract.

use crate::error::{CoreError, CoreResult};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::watch;

/// Identifies a loadable subtree of the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResourceDescriptor {
    /// The records of one table.
    #[serde(rename_all = "camelCase")]
    TableData {
        /// The table whose records are fetched.
        table_id: String,
    },
    /// The cursor's selection state.
    CursorData,
}

/// The result of a host fetch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    /// The fetched subtree.
    pub data: Value,
    /// Watch keys that changed as a result of the load.
    #[serde(default)]
    pub changed_keys_hint: Vec<String>,
}

impl FetchResult {
    /// Creates a fetch result.
    pub fn new<I, S>(data: Value, changed_keys_hint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data,
            changed_keys_hint: changed_keys_hint.into_iter().map(Into::into).collect(),
        }
    }
}

/// Operations the core needs from the host.
///
/// Retry policy, if any, belongs to the implementation of `fetch`.
pub trait HostBridge: Send + Sync {
    /// Fetches a resource and subscribes to its future changes.
    fn fetch(&self, resource: &ResourceDescriptor) -> BoxFuture<'static, CoreResult<FetchResult>>;

    /// Ends the subscription started by `fetch`.
    fn unsubscribe(&self, resource: &ResourceDescriptor);
}

/// A host without async data. Every fetch fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

impl HostBridge for DetachedHost {
    fn fetch(&self, resource: &ResourceDescriptor) -> BoxFuture<'static, CoreResult<FetchResult>> {
        let message = format!("no host attached to fetch {:?}", resource);
        Box::pin(async move { Err(CoreError::fetch(message)) })
    }

    fn unsubscribe(&self, _resource: &ResourceDescriptor) {}
}

/// A scriptable host for testing.
///
/// Fetches resolve with the configured response. While the host is
/// [held](MockHost::hold), fetches stay pending until
/// [`release`](MockHost::release) is called.
#[derive(Debug)]
pub struct MockHost {
    responses: Mutex<HashMap<ResourceDescriptor, CoreResult<FetchResult>>>,
    fetches: Mutex<Vec<ResourceDescriptor>>,
    unsubscribes: Mutex<Vec<ResourceDescriptor>>,
    gate: watch::Sender<bool>,
}

impl MockHost {
    /// Creates a mock host with no responses configured.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            responses: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
            unsubscribes: Mutex::new(Vec::new()),
            gate,
        }
    }

    /// Sets the response for a resource.
    pub fn set_response(&self, resource: ResourceDescriptor, response: FetchResult) {
        self.responses.lock().insert(resource, Ok(response));
    }

    /// Makes fetches of a resource fail.
    pub fn set_error(&self, resource: ResourceDescriptor, message: impl Into<String>) {
        self.responses
            .lock()
            .insert(resource, Err(CoreError::fetch(message)));
    }

    /// Keeps subsequent fetches pending until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Lets pending fetches resolve.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of fetches issued for `resource`.
    pub fn fetch_count(&self, resource: &ResourceDescriptor) -> usize {
        self.fetches.lock().iter().filter(|r| *r == resource).count()
    }

    /// Number of unsubscribes issued for `resource`.
    pub fn unsubscribe_count(&self, resource: &ResourceDescriptor) -> usize {
        self.unsubscribes
            .lock()
            .iter()
            .filter(|r| *r == resource)
            .count()
    }

    /// All fetches issued, in order.
    pub fn fetches(&self) -> Vec<ResourceDescriptor> {
        self.fetches.lock().clone()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge for MockHost {
    fn fetch(&self, resource: &ResourceDescriptor) -> BoxFuture<'static, CoreResult<FetchResult>> {
        self.fetches.lock().push(resource.clone());
        let response = self
            .responses
            .lock()
            .get(resource)
            .cloned()
            .unwrap_or_else(|| {
                Err(CoreError::fetch(format!(
                    "no mock response set for {:?}",
                    resource
                )))
            });
        let mut gate = self.gate.subscribe();
        Box::pin(async move {
            // A dropped sender means the host is gone; resolve anyway.
            let _ = gate.wait_for(|open| *open).await;
            response
        })
    }

    fn unsubscribe(&self, resource: &ResourceDescriptor) {
        self.unsubscribes.lock().push(resource.clone());
    }
}
