//! Tag-based routing on top of another balancer.
//!
//! [`TagSelectorBalancer`] splits each snapshot into groups by the value
//! of one instance tag, lets the wrapped balancer build a picker per
//! group, and at selection time sends the request to the group its
//! [`TagFn`] names.
//!
//! ```text
//! get_picker(snapshot)
//!   ├── cache hit ─────────────────────────────► TagPicker
//!   └── miss → partition → next.get_picker × N ─► TagPicker (stored)
//!
//! TagPicker::next(ctx, req)
//!   └── tag_fn(ctx, req) → group picker → instance | None
//! ```
//!
//! Built pickers are cached by snapshot key and kept current through
//! [`Balancer::on_change`] and [`Balancer::on_remove`].

pub mod partition;
pub mod picker;

use std::sync::Arc;

use tracing::{debug, warn};
use warpgrid_discovery::{Change, Snapshot};

use crate::balancer::{Balancer, Picker};
use crate::cache::{CacheStats, PickerCache};
use crate::error::BalanceResult;

pub use partition::{DEFAULT_PARTITION, build_group_pickers, partition};
pub use picker::{TagFn, TagPicker};

/// Prefix added to the wrapped balancer's name.
pub const NAME_PREFIX: &str = "tagselector_";

/// Decorates a balancer with tag-based request routing.
pub struct TagSelectorBalancer<R> {
    tag: String,
    tag_fn: TagFn<R>,
    next: Arc<dyn Balancer<R>>,
    cache: PickerCache<TagPicker<R>>,
}

impl<R: 'static> TagSelectorBalancer<R> {
    /// Route on instance tag `tag`, classifying requests with `tag_fn`
    /// and selecting within a group with `next`.
    pub fn new(tag: impl Into<String>, tag_fn: TagFn<R>, next: Arc<dyn Balancer<R>>) -> Self {
        Self {
            tag: tag.into(),
            tag_fn,
            next,
            cache: PickerCache::new(),
        }
    }

    /// Tag name instances are grouped by.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cached picker for `cache_key`, if one has been built.
    pub fn cached(&self, cache_key: &str) -> Option<Arc<TagPicker<R>>> {
        self.cache.get(cache_key)
    }

    fn build(&self, snapshot: &Snapshot) -> BalanceResult<TagPicker<R>> {
        let partitions = partition(snapshot, &self.tag);
        debug!(
            tag = %self.tag,
            cache_key = %snapshot.cache_key,
            instances = snapshot.len(),
            groups = partitions.len(),
            "partitioned snapshot by tag"
        );
        let groups = build_group_pickers(snapshot, partitions, self.next.as_ref())?;
        Ok(TagPicker::new(self.tag_fn.clone(), groups))
    }
}

impl<R: 'static> Balancer<R> for TagSelectorBalancer<R> {
    fn get_picker(&self, snapshot: &Snapshot) -> BalanceResult<Arc<dyn Picker<R>>> {
        let picker = self.cache.resolve(snapshot, |s| self.build(s))?;
        Ok(picker)
    }

    fn on_change(&self, change: &Change) {
        let snapshot = &change.snapshot;
        if !snapshot.cacheable {
            return;
        }
        // A failed rebuild drops the stale entry so the next selection
        // builds again.
        if let Err(e) = self.cache.refresh(snapshot, |s| self.build(s)) {
            warn!(
                cache_key = %snapshot.cache_key,
                error = %e,
                "rebuild after membership change failed"
            );
        }
    }

    fn on_remove(&self, change: &Change) {
        if !change.snapshot.cacheable {
            return;
        }
        self.cache.evict(change.cache_key());
    }

    fn name(&self) -> String {
        format!("{NAME_PREFIX}{}", self.next.name())
    }
}
