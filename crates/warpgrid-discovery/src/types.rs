//! Discovery model types.
//!
//! These types describe what a service registry hands to the RPC client:
//! individual instances, point-in-time snapshots of a service's instances,
//! and the membership changes between two snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Weight assigned to instances that do not declare one.
pub const DEFAULT_WEIGHT: u32 = 10;

/// Shared handle to an observed instance.
pub type InstanceRef = Arc<Instance>;

// ── Instance ──────────────────────────────────────────────────────

/// One addressable backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    /// Network address (ip:port, unix socket path, ...).
    pub address: String,
    /// Relative weight used by weighted strategies.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Arbitrary attributes published by the registry.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl Instance {
    pub fn new(address: impl Into<String>, weight: u32, tags: HashMap<String, String>) -> Self {
        Self {
            address: address.into(),
            weight,
            tags,
        }
    }

    /// An instance with the default weight and no tags.
    pub fn untagged(address: impl Into<String>) -> Self {
        Self::new(address, DEFAULT_WEIGHT, HashMap::new())
    }

    /// Add a single tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Look up a tag by name. `None` when the instance does not carry it.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Wrap into a shared handle.
    pub fn into_ref(self) -> InstanceRef {
        Arc::new(self)
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Point-in-time set of instances for one service.
///
/// When `cacheable` is true, `cache_key` identifies the snapshot: two
/// snapshots sharing a key are interchangeable for anything built from
/// them. The key is meaningless otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub instances: Vec<InstanceRef>,
    pub cacheable: bool,
    pub cache_key: String,
}

impl Snapshot {
    /// A snapshot that must never be cached.
    pub fn uncached(instances: Vec<InstanceRef>) -> Self {
        Self {
            instances,
            cacheable: false,
            cache_key: String::new(),
        }
    }

    /// A cacheable snapshot identified by `cache_key`.
    pub fn cached(cache_key: impl Into<String>, instances: Vec<InstanceRef>) -> Self {
        Self {
            instances,
            cacheable: true,
            cache_key: cache_key.into(),
        }
    }

    /// Same cache identity, different instance set.
    pub fn project(&self, instances: Vec<InstanceRef>) -> Self {
        Self {
            instances,
            cacheable: self.cacheable,
            cache_key: self.cache_key.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

// ── Change ────────────────────────────────────────────────────────

/// Membership change reported by the registry.
///
/// `snapshot` is the full state after the change; the three lists are
/// the delta against the previous snapshot with the same key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Change {
    pub snapshot: Snapshot,
    pub added: Vec<InstanceRef>,
    pub updated: Vec<InstanceRef>,
    pub removed: Vec<InstanceRef>,
}

impl Change {
    /// A change carrying only the resulting snapshot.
    pub fn of(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    /// Cache key of the affected snapshot.
    pub fn cache_key(&self) -> &str {
        &self.snapshot.cache_key
    }
}

/// Event delivered by a discovery watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// Membership of a service changed.
    Changed(Change),
    /// The service behind the snapshot no longer exists.
    Removed(Change),
}
