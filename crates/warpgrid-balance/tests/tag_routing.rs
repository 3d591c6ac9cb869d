//! Integration tests for tag-based routing.
//!
//! These tests drive `TagSelectorBalancer` through its public surface:
//! - Region routing end to end over a round-robin strategy
//! - Group shapes produced for a cacheable snapshot
//! - Single-flight cache population under concurrent callers
//! - Membership changes and removals racing with in-flight builds

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, Once};
use std::thread;
use std::time::Duration;

use warpgrid_balance::{
    BalanceResult, Balancer, CallContext, Picker, RoundRobinBalancer, TagFn, TagSelectorBalancer,
};
use warpgrid_discovery::{Change, Instance, InstanceRef, Snapshot};

// ── Tracing setup ────────────────────────────────────────────────

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output, controlled by `RUST_LOG`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// ── Helpers ──────────────────────────────────────────────────────

fn literal() -> TagFn<String> {
    Arc::new(|_: &CallContext, req: &String| req.clone())
}

fn instance(addr: &str, region: Option<&str>) -> InstanceRef {
    let inst = Instance::untagged(addr);
    match region {
        Some(r) => inst.with_tag("region", r).into_ref(),
        None => inst.into_ref(),
    }
}

fn choose(picker: &dyn Picker<String>, req: &str) -> Option<String> {
    picker
        .next(&CallContext::new("echo", "Echo"), &req.to_string())
        .map(|i| i.address.clone())
}

/// Counts builds and optionally holds the first one until released.
#[derive(Default)]
struct GatedBalancer {
    builds: AtomicUsize,
    gate: Mutex<Option<(Arc<Barrier>, Arc<Barrier>)>>,
}

impl GatedBalancer {
    fn gated(entered: Arc<Barrier>, release: Arc<Barrier>) -> Self {
        Self {
            builds: AtomicUsize::new(0),
            gate: Mutex::new(Some((entered, release))),
        }
    }
}

impl Balancer<String> for GatedBalancer {
    fn get_picker(&self, snapshot: &Snapshot) -> BalanceResult<Arc<dyn Picker<String>>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.wait();
            release.wait();
        }
        thread::sleep(Duration::from_millis(5));
        Balancer::<String>::get_picker(&RoundRobinBalancer::new(), snapshot)
    }

    fn name(&self) -> String {
        "gated".to_string()
    }
}

// ── Region routing ──────────────────────────────────────────────────

#[test]
fn region_routing_end_to_end() {
    init_tracing();
    let lb = TagSelectorBalancer::new("region", literal(), Arc::new(RoundRobinBalancer::new()));
    let snap = Snapshot::uncached(vec![
        instance("addr1", Some("us")),
        instance("addr2", Some("us")),
        instance("addr3", Some("eu")),
        instance("addr4", None),
    ]);
    let picker = lb.get_picker(&snap).unwrap();

    let us: HashSet<String> = (0..4)
        .map(|_| choose(picker.as_ref(), "us").unwrap())
        .collect();
    assert_eq!(us, HashSet::from(["addr1".to_string(), "addr2".to_string()]));

    assert_eq!(choose(picker.as_ref(), "eu").as_deref(), Some("addr3"));
    assert_eq!(choose(picker.as_ref(), "").as_deref(), Some("addr4"));
    assert_eq!(choose(picker.as_ref(), "ap"), None);
}

#[test]
fn group_shapes_for_cacheable_snapshot() {
    init_tracing();
    let lb = TagSelectorBalancer::new("region", literal(), Arc::new(RoundRobinBalancer::new()));
    let snap = Snapshot::cached(
        "K",
        vec![
            instance("addr1", Some("bar1")),
            instance("addr2", Some("bar2")),
            instance("addr3", Some("bar3")),
            instance("addr4", Some("")),
            instance("addr5", None),
        ],
    );
    lb.get_picker(&snap).unwrap();

    let tag_picker = lb.cached("K").unwrap();
    let mut values: Vec<&str> = tag_picker.tag_values().collect();
    values.sort();
    assert_eq!(values, vec!["", "bar1", "bar2", "bar3"]);

    for (value, expected) in [("bar1", "addr1"), ("bar2", "addr2"), ("bar3", "addr3")] {
        let group = tag_picker.group(value).unwrap();
        for _ in 0..3 {
            assert_eq!(choose(group.as_ref(), value).as_deref(), Some(expected));
        }
    }

    let default_group = tag_picker.group("").unwrap();
    let defaults: HashSet<String> = (0..4)
        .map(|_| choose(default_group.as_ref(), "").unwrap())
        .collect();
    assert_eq!(defaults, HashSet::from(["addr4".to_string(), "addr5".to_string()]));
}

// ── Cache population ────────────────────────────────────────────────

#[test]
fn concurrent_callers_share_one_build() {
    init_tracing();
    let next = Arc::new(GatedBalancer::default());
    let lb = Arc::new(TagSelectorBalancer::new("region", literal(), next.clone()));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let lb = lb.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                // Distinct snapshot values, same identity.
                let addr = format!("addr{i}");
                let snap = Snapshot::cached("shared", vec![instance(&addr, Some("us"))]);
                barrier.wait();
                lb.get_picker(&snap).unwrap()
            })
        })
        .collect();

    let pickers: Vec<Arc<dyn Picker<String>>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(pickers.iter().all(|p| Arc::ptr_eq(p, &pickers[0])));
    assert_eq!(lb.cache_stats().builds, 1);
    // One partition, so one call into the wrapped balancer.
    assert_eq!(next.builds.load(Ordering::SeqCst), 1);
}

#[test]
fn uncacheable_snapshots_leave_cache_empty() {
    init_tracing();
    let lb = TagSelectorBalancer::new("region", literal(), Arc::new(RoundRobinBalancer::new()));
    let snap = Snapshot::uncached(vec![instance("addr1", Some("us"))]);

    let a = lb.get_picker(&snap).unwrap();
    let b = lb.get_picker(&snap).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(choose(a.as_ref(), "us"), choose(b.as_ref(), "us"));
    let stats = lb.cache_stats();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.builds, 2);
}

#[test]
fn removal_then_lookup_rebuilds_once() {
    init_tracing();
    let next = Arc::new(GatedBalancer::default());
    let lb = TagSelectorBalancer::new("region", literal(), next.clone());
    let snap = Snapshot::cached("K", vec![instance("addr1", Some("us"))]);

    lb.get_picker(&snap).unwrap();
    lb.get_picker(&snap).unwrap();
    assert_eq!(next.builds.load(Ordering::SeqCst), 1);

    lb.on_remove(&Change::of(snap.clone()));
    assert!(lb.cached("K").is_none());

    lb.get_picker(&snap).unwrap();
    lb.get_picker(&snap).unwrap();
    assert_eq!(next.builds.load(Ordering::SeqCst), 2);
    assert!(lb.cached("K").is_some());
}

// ── Membership changes ──────────────────────────────────────────────

#[test]
fn change_during_in_flight_build_wins() {
    init_tracing();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let next = Arc::new(GatedBalancer::gated(entered.clone(), release.clone()));
    let lb = Arc::new(TagSelectorBalancer::new("region", literal(), next));

    let old = Snapshot::cached("K", vec![instance("old", Some("us"))]);
    let new = Snapshot::cached("K", vec![instance("new", Some("us"))]);

    let builder = {
        let lb = lb.clone();
        let old = old.clone();
        thread::spawn(move || lb.get_picker(&old).unwrap())
    };
    entered.wait();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let lb = lb.clone();
            let old = old.clone();
            thread::spawn(move || lb.get_picker(&old).unwrap())
        })
        .collect();
    thread::sleep(Duration::from_millis(20));

    lb.on_change(&Change::of(new));
    let current = lb.get_picker(&old).unwrap();
    assert_eq!(choose(current.as_ref(), "us").as_deref(), Some("new"));

    release.wait();
    let stale = builder.join().unwrap();
    assert_eq!(choose(stale.as_ref(), "us").as_deref(), Some("old"));
    for w in waiters {
        let picker = w.join().unwrap();
        assert!(choose(picker.as_ref(), "us").is_some());
    }

    // The superseded build did not overwrite the newer entry.
    let after = lb.get_picker(&old).unwrap();
    assert!(Arc::ptr_eq(&after, &current));
}

#[test]
fn removal_during_rebuild_is_not_undone() {
    init_tracing();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let next = Arc::new(GatedBalancer::gated(entered.clone(), release.clone()));
    let lb = Arc::new(TagSelectorBalancer::new("region", literal(), next.clone()));
    let snap = Snapshot::cached("K", vec![instance("addr1", Some("us"))]);

    let rebuild = {
        let lb = lb.clone();
        let change = Change::of(snap.clone());
        thread::spawn(move || lb.on_change(&change))
    };
    entered.wait();
    lb.on_remove(&Change::of(snap.clone()));
    release.wait();
    rebuild.join().unwrap();

    assert!(lb.cached("K").is_none());
    lb.get_picker(&snap).unwrap();
    assert_eq!(next.builds.load(Ordering::SeqCst), 2);
}

#[test]
fn name_wraps_inner_strategy() {
    init_tracing();
    let lb = TagSelectorBalancer::new("region", literal(), Arc::new(RoundRobinBalancer::new()));
    assert_eq!(lb.name(), "tagselector_round_robin");
}
