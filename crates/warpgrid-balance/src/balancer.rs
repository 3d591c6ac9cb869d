//! Balancer and picker traits.
//!
//! A [`Balancer`] turns a discovery [`Snapshot`] into a [`Picker`]; the
//! picker then selects one instance per outgoing request. `R` is the
//! request type of the client the balancer is attached to.

use std::collections::HashMap;
use std::sync::Arc;

use warpgrid_discovery::{Change, InstanceRef, Snapshot};

use crate::error::BalanceResult;

/// Per-call information available to pickers and tag functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Target service name.
    pub service: String,
    /// Method being invoked.
    pub method: String,
    /// Propagated call metadata (transit headers, baggage).
    pub metadata: HashMap<String, String>,
}

impl CallContext {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Selects an instance for one request from a fixed instance set.
///
/// `None` means no instance could be chosen. Implementations are shared
/// across threads and must be safe to call concurrently.
pub trait Picker<R>: Send + Sync {
    fn next(&self, ctx: &CallContext, request: &R) -> Option<InstanceRef>;
}

/// Builds pickers from discovery snapshots.
pub trait Balancer<R>: Send + Sync {
    /// Build (or fetch) a picker for the snapshot's instances.
    fn get_picker(&self, snapshot: &Snapshot) -> BalanceResult<Arc<dyn Picker<R>>>;

    /// Membership of the service behind `change.snapshot` changed.
    fn on_change(&self, _change: &Change) {}

    /// The service behind `change.snapshot` went away.
    fn on_remove(&self, _change: &Change) {}

    /// Strategy name used in diagnostics.
    fn name(&self) -> String;
}

/// Picker over an empty instance set.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyPicker;

impl<R> Picker<R> for EmptyPicker {
    fn next(&self, _ctx: &CallContext, _request: &R) -> Option<InstanceRef> {
        None
    }
}
