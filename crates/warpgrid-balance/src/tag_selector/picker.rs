//! Composite picker that routes each request to one tag group.

use std::collections::HashMap;
use std::sync::Arc;

use warpgrid_discovery::InstanceRef;

use crate::balancer::{CallContext, Picker};

/// Classifies a request into a tag value.
///
/// Invoked on the calling thread for every selection, possibly from many
/// threads at once.
pub type TagFn<R> = Arc<dyn Fn(&CallContext, &R) -> String + Send + Sync>;

/// Picks from the group whose tag value matches the request's class.
///
/// A class with no group yields `None`; there is no fallback to the
/// default group.
pub struct TagPicker<R> {
    tag_fn: TagFn<R>,
    groups: HashMap<String, Arc<dyn Picker<R>>>,
}

impl<R> TagPicker<R> {
    pub fn new(tag_fn: TagFn<R>, groups: HashMap<String, Arc<dyn Picker<R>>>) -> Self {
        Self { tag_fn, groups }
    }

    /// Picker serving `value`, if that group exists.
    pub fn group(&self, value: &str) -> Option<&Arc<dyn Picker<R>>> {
        self.groups.get(value)
    }

    /// Tag values with a group, in no particular order.
    pub fn tag_values(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl<R> Picker<R> for TagPicker<R> {
    fn next(&self, ctx: &CallContext, request: &R) -> Option<InstanceRef> {
        let value = (self.tag_fn)(ctx, request);
        self.groups.get(&value)?.next(ctx, request)
    }
}
