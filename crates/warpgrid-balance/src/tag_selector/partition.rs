//! Grouping snapshot instances by tag value.

use std::collections::HashMap;
use std::sync::Arc;

use warpgrid_discovery::{InstanceRef, Snapshot};

use crate::balancer::{Balancer, Picker};
use crate::error::BalanceResult;

/// Partition holding instances that do not carry the tag.
///
/// An instance whose tag is explicitly set to the empty string lands
/// here too; the two cases are not distinguished.
pub const DEFAULT_PARTITION: &str = "";

/// Group `snapshot`'s instances by the value of `tag`.
///
/// Every instance lands in exactly one partition, and each partition keeps
/// the snapshot's relative instance order. Partitions are never empty.
pub fn partition(snapshot: &Snapshot, tag: &str) -> HashMap<String, Vec<InstanceRef>> {
    let mut partitions: HashMap<String, Vec<InstanceRef>> = HashMap::new();
    for instance in &snapshot.instances {
        let value = instance.tag(tag).unwrap_or(DEFAULT_PARTITION);
        partitions
            .entry(value.to_string())
            .or_default()
            .push(instance.clone());
    }
    partitions
}

/// Ask `next` for one picker per partition.
///
/// Each call receives a projection of `snapshot`: the partition's
/// instances under the original cache identity. The first failure aborts
/// the whole build.
pub fn build_group_pickers<R>(
    snapshot: &Snapshot,
    partitions: HashMap<String, Vec<InstanceRef>>,
    next: &dyn Balancer<R>,
) -> BalanceResult<HashMap<String, Arc<dyn Picker<R>>>> {
    let mut pickers = HashMap::with_capacity(partitions.len());
    for (value, instances) in partitions {
        let picker = next.get_picker(&snapshot.project(instances))?;
        pickers.insert(value, picker);
    }
    Ok(pickers)
}
