//! Discovery synchronization — bridges registry events to a balancer.
//!
//! `DiscoverySync` forwards membership changes and removals to the
//! balancer's `on_change`/`on_remove` hooks, either one event at a time
//! via [`DiscoverySync::apply`] or from a background task draining a
//! channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use warpgrid_discovery::DiscoveryEvent;

use crate::balancer::Balancer;

/// Forwards discovery events to a balancer.
pub struct DiscoverySync<R> {
    balancer: Arc<dyn Balancer<R>>,
}

/// Sync statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub changes: u32,
    pub removals: u32,
}

impl<R: 'static> DiscoverySync<R> {
    pub fn new(balancer: Arc<dyn Balancer<R>>) -> Self {
        Self { balancer }
    }

    /// Access the underlying balancer.
    pub fn balancer(&self) -> &Arc<dyn Balancer<R>> {
        &self.balancer
    }

    /// Apply one event.
    pub fn apply(&self, event: &DiscoveryEvent, stats: &mut SyncStats) {
        match event {
            DiscoveryEvent::Changed(change) => {
                debug!(
                    cache_key = %change.cache_key(),
                    instances = change.snapshot.len(),
                    added = change.added.len(),
                    updated = change.updated.len(),
                    removed = change.removed.len(),
                    "membership changed"
                );
                self.balancer.on_change(change);
                stats.changes += 1;
            }
            DiscoveryEvent::Removed(change) => {
                debug!(cache_key = %change.cache_key(), "service removed");
                self.balancer.on_remove(change);
                stats.removals += 1;
            }
        }
    }

    /// Drain `events` on a background task until the channel closes or
    /// `shutdown` fires. The task resolves to the accumulated stats.
    pub fn spawn(
        self,
        mut events: mpsc::Receiver<DiscoveryEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<SyncStats> {
        tokio::spawn(async move {
            let mut stats = SyncStats::default();
            let name = self.balancer.name();
            debug!(balancer = %name, "discovery sync starting");

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => self.apply(&event, &mut stats),
                        None => break,
                    },
                    _ = shutdown.changed() => {
                        debug!(balancer = %name, "discovery sync shutting down");
                        break;
                    }
                }
            }

            info!(
                balancer = %name,
                changes = stats.changes,
                removals = stats.removals,
                "discovery sync stopped"
            );
            stats
        })
    }
}
