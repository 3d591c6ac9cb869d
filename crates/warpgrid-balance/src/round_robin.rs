//! Round-robin load balancer.
//!
//! Each picker distributes requests across its instance set using an
//! atomic counter. Lock-free and safe for concurrent access.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use warpgrid_discovery::{InstanceRef, Snapshot};

use crate::balancer::{Balancer, CallContext, EmptyPicker, Picker};
use crate::error::BalanceResult;

/// Builds [`RoundRobinPicker`]s.
///
/// Pickers are built per call and never cached by key: one snapshot key
/// may be projected onto several instance subsets by a decorating
/// balancer.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinBalancer;

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl<R> Balancer<R> for RoundRobinBalancer {
    fn get_picker(&self, snapshot: &Snapshot) -> BalanceResult<Arc<dyn Picker<R>>> {
        if snapshot.is_empty() {
            return Ok(Arc::new(EmptyPicker));
        }
        Ok(Arc::new(RoundRobinPicker::new(snapshot.instances.clone())))
    }

    fn name(&self) -> String {
        "round_robin".to_string()
    }
}

/// Cycles through a fixed instance list.
pub struct RoundRobinPicker {
    instances: Vec<InstanceRef>,
    counter: AtomicUsize,
}

impl RoundRobinPicker {
    pub fn new(instances: Vec<InstanceRef>) -> Self {
        Self {
            instances,
            counter: AtomicUsize::new(0),
        }
    }

    /// Select the next index, wrapping around the instance count.
    ///
    /// Returns `None` if there are no instances.
    fn next_index(&self) -> Option<usize> {
        let count = self.instances.len();
        if count == 0 {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(idx % count)
    }

    /// Current counter value (for diagnostics).
    pub fn current(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl<R> Picker<R> for RoundRobinPicker {
    fn next(&self, _ctx: &CallContext, _request: &R) -> Option<InstanceRef> {
        self.next_index().map(|idx| self.instances[idx].clone())
    }
}
