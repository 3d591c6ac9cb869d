//! Weighted random load balancer.
//!
//! Picks an instance with probability proportional to its weight.
//! Instances with weight zero are never selected.

use std::sync::Arc;

use rand::Rng;
use warpgrid_discovery::{InstanceRef, Snapshot};

use crate::balancer::{Balancer, CallContext, EmptyPicker, Picker};
use crate::error::BalanceResult;

/// Builds [`WeightedRandomPicker`]s. Like the round-robin balancer it
/// never caches pickers by snapshot key.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandomBalancer;

impl WeightedRandomBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl<R> Balancer<R> for WeightedRandomBalancer {
    fn get_picker(&self, snapshot: &Snapshot) -> BalanceResult<Arc<dyn Picker<R>>> {
        match WeightedRandomPicker::new(&snapshot.instances) {
            Some(picker) => Ok(Arc::new(picker)),
            None => Ok(Arc::new(EmptyPicker)),
        }
    }

    fn name(&self) -> String {
        "weight_random".to_string()
    }
}

/// Weighted selection over a fixed instance list.
pub struct WeightedRandomPicker {
    instances: Vec<InstanceRef>,
    /// Running weight totals, parallel to `instances`. Empty when every
    /// weight is equal and a uniform draw suffices.
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightedRandomPicker {
    /// Returns `None` when no instance has a positive weight.
    pub fn new(instances: &[InstanceRef]) -> Option<Self> {
        let instances: Vec<InstanceRef> =
            instances.iter().filter(|i| i.weight > 0).cloned().collect();
        let first = instances.first()?.weight;

        let mut cumulative = Vec::with_capacity(instances.len());
        let mut total = 0u64;
        for inst in &instances {
            total += u64::from(inst.weight);
            cumulative.push(total);
        }
        if instances.iter().all(|i| i.weight == first) {
            cumulative.clear();
        }

        Some(Self {
            instances,
            cumulative,
            total,
        })
    }

    fn pick_index(&self, rng: &mut impl Rng) -> usize {
        if self.cumulative.is_empty() {
            return rng.random_range(0..self.instances.len());
        }
        let point = rng.random_range(0..self.total);
        self.cumulative.partition_point(|&acc| acc <= point)
    }
}

impl<R> Picker<R> for WeightedRandomPicker {
    fn next(&self, _ctx: &CallContext, _request: &R) -> Option<InstanceRef> {
        let idx = self.pick_index(&mut rand::rng());
        self.instances.get(idx).cloned()
    }
}
