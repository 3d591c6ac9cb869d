//! Picker cache keyed by discovery snapshot identity.
//!
//! Completed pickers live in a read-mostly map. Misses go through a
//! per-key single-flight gate: the first caller for a key builds, every
//! concurrent caller for the same key blocks on that build and receives
//! the same `Arc`. Builds for different keys run independently and no
//! lock is held while a build runs.
//!
//! # Lifecycle
//!
//! Entries are created on first miss, replaced wholesale by
//! [`PickerCache::replace`] and dropped by [`PickerCache::evict`]. There
//! is no expiry and no size bound; the discovery change stream decides
//! how long an entry lives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use tracing::{debug, warn};
use warpgrid_discovery::Snapshot;

use crate::error::{BalanceError, BalanceResult};

/// Outcome of one build round, shared by everyone waiting on it.
type Outcome<V> = BalanceResult<Arc<V>>;

/// One in-progress build.
struct Flight<V> {
    outcome: Mutex<Option<Outcome<V>>>,
    done: Condvar,
    /// Set by `replace`/`evict`: the result must not be stored.
    superseded: AtomicBool,
}

impl<V> Flight<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            superseded: AtomicBool::new(false),
        }
    }

    fn complete(&self, outcome: Outcome<V>) {
        let mut slot = self.outcome.lock().expect("flight lock");
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome<V> {
        let mut slot = self.outcome.lock().expect("flight lock");
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).expect("flight lock");
        }
    }
}

/// Releases waiters and the key if the builder unwinds.
struct FlightGuard<'a, V> {
    cache: &'a PickerCache<V>,
    key: &'a str,
    flight: Arc<Flight<V>>,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        self.flight
            .complete(Err(BalanceError::BuildAborted(self.key.to_string())));
        self.cache.land(self.key, &self.flight);
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from a completed entry.
    pub hits: u64,
    /// Lookups that found no completed entry and built or joined a build.
    pub misses: u64,
    /// Builds run by the cache, for cacheable and uncacheable snapshots.
    pub builds: u64,
    /// Builds that returned an error.
    pub failures: u64,
    /// Completed entries currently stored.
    pub entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot-keyed cache with single-flight population.
pub struct PickerCache<V> {
    /// cache_key → completed value.
    entries: RwLock<HashMap<String, Arc<V>>>,
    /// cache_key → build in progress.
    inflight: Mutex<HashMap<String, Arc<Flight<V>>>>,
    counters: Counters,
}

impl<V> PickerCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Return the value for `snapshot`, building it with `build` if needed.
    ///
    /// Uncacheable snapshots are built on every call and never stored.
    /// For cacheable snapshots at most one `build` per key runs at a time;
    /// concurrent callers share its outcome, errors included. A failed
    /// build leaves nothing behind, so the next call retries.
    pub fn resolve<F>(&self, snapshot: &Snapshot, build: F) -> BalanceResult<Arc<V>>
    where
        F: FnOnce(&Snapshot) -> BalanceResult<V>,
    {
        if !snapshot.cacheable {
            return self.run_build(snapshot, build).map(Arc::new);
        }

        let key = snapshot.cache_key.as_str();
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }

        let flight = {
            let mut inflight = self.inflight.lock().expect("inflight lock");
            // A build may have landed between the lookup above and taking
            // the lock; builders publish before leaving `inflight`.
            if let Some(value) = self.lookup(key) {
                return Ok(value);
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            if let Some(flight) = inflight.get(key) {
                let flight = flight.clone();
                drop(inflight);
                debug!(cache_key = key, "joining in-flight picker build");
                return flight.wait();
            }
            let flight = Arc::new(Flight::new());
            inflight.insert(key.to_string(), flight.clone());
            flight
        };

        let guard = FlightGuard {
            cache: self,
            key,
            flight,
        };
        debug!(cache_key = key, instances = snapshot.len(), "building picker");
        let outcome = self.run_build(snapshot, build).map(Arc::new);

        if let Ok(value) = &outcome {
            let mut entries = self.entries.write().expect("entries lock");
            if !guard.flight.superseded.load(Ordering::Acquire) {
                entries.insert(key.to_string(), value.clone());
            }
        }
        guard.flight.complete(outcome.clone());
        // Dropping the guard detaches the flight; its `complete` is a no-op
        // now that an outcome is recorded.
        drop(guard);
        outcome
    }

    /// Rebuild the entry for `snapshot` unconditionally.
    ///
    /// The rebuild takes over the key's single-flight slot: a build already
    /// running is superseded and lookups arriving meanwhile join this one.
    /// On success the entry is overwritten, on failure it is dropped. If
    /// the key is evicted or replaced while the rebuild runs, the rebuild
    /// stores nothing.
    pub fn refresh<F>(&self, snapshot: &Snapshot, build: F) -> BalanceResult<Arc<V>>
    where
        F: FnOnce(&Snapshot) -> BalanceResult<V>,
    {
        let key = snapshot.cache_key.as_str();
        let flight = Arc::new(Flight::new());
        {
            let mut inflight = self.inflight.lock().expect("inflight lock");
            if let Some(prev) = inflight.insert(key.to_string(), flight.clone()) {
                prev.superseded.store(true, Ordering::Release);
            }
        }

        let guard = FlightGuard {
            cache: self,
            key,
            flight,
        };
        debug!(cache_key = key, instances = snapshot.len(), "refreshing picker");
        let outcome = self.run_build(snapshot, build).map(Arc::new);

        {
            let mut entries = self.entries.write().expect("entries lock");
            if !guard.flight.superseded.load(Ordering::Acquire) {
                match &outcome {
                    Ok(value) => {
                        entries.insert(key.to_string(), value.clone());
                    }
                    Err(_) => {
                        entries.remove(key);
                    }
                }
            }
        }
        guard.flight.complete(outcome.clone());
        drop(guard);
        outcome
    }

    /// Store `value` under `key`, overwriting any entry.
    ///
    /// A build already running for `key` is superseded: its callers still
    /// get its result but it is not stored, so later lookups observe
    /// `value`.
    pub fn replace(&self, key: &str, value: Arc<V>) {
        self.supersede(key, false);
        let mut entries = self.entries.write().expect("entries lock");
        entries.insert(key.to_string(), value);
        debug!(cache_key = key, "replaced cached picker");
    }

    /// Drop the entry for `key`. Returns whether one was present.
    ///
    /// A running build for `key` is detached as well, so the next
    /// `resolve` starts a fresh build.
    pub fn evict(&self, key: &str) -> bool {
        self.supersede(key, true);
        let mut entries = self.entries.write().expect("entries lock");
        let removed = entries.remove(key).is_some();
        debug!(cache_key = key, removed, "evicted cached picker");
        removed
    }

    /// Completed entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.read().expect("entries lock");
        entries.get(key).cloned()
    }

    /// Like [`get`](Self::get), counting a hit when found.
    fn lookup(&self, key: &str) -> Option<Arc<V>> {
        let value = self.get(key)?;
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().expect("entries lock");
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            builds: self.counters.builds.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn run_build<F>(&self, snapshot: &Snapshot, build: F) -> BalanceResult<V>
    where
        F: FnOnce(&Snapshot) -> BalanceResult<V>,
    {
        self.counters.builds.fetch_add(1, Ordering::Relaxed);
        let result = build(snapshot);
        if let Err(e) = &result {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                cache_key = %snapshot.cache_key,
                cacheable = snapshot.cacheable,
                error = %e,
                "picker build failed"
            );
        }
        result
    }

    fn supersede(&self, key: &str, detach: bool) {
        let mut inflight = self.inflight.lock().expect("inflight lock");
        let flight = if detach {
            inflight.remove(key)
        } else {
            inflight.get(key).cloned()
        };
        if let Some(flight) = flight {
            flight.superseded.store(true, Ordering::Release);
        }
    }

    /// Remove `flight` from the in-flight map unless a newer flight has
    /// taken its key.
    fn land(&self, key: &str, flight: &Arc<Flight<V>>) {
        let mut inflight = self.inflight.lock().expect("inflight lock");
        if inflight.get(key).is_some_and(|f| Arc::ptr_eq(f, flight)) {
            inflight.remove(key);
        }
    }
}

impl<V> Default for PickerCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
