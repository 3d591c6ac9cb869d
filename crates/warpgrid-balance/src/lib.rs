//! warpgrid-balance — client-side load balancing for WarpGrid RPC.
//!
//! Turns discovery snapshots (from `warpgrid-discovery`) into pickers
//! that choose one instance per outgoing request.
//!
//! - Round-robin and weighted random strategies
//! - Tag-based routing that partitions instances by a tag and delegates
//!   to another strategy within each partition
//! - A snapshot-keyed picker cache with single-flight population
//! - TOML configuration and a discovery event bridge
//!
//! # Architecture
//!
//! ```text
//! TagSelectorBalancer
//!   ├── PickerCache (cache_key → TagPicker, one build per key at a time)
//!   └── next: dyn Balancer (round robin, weighted random, ...)
//!         └── one Picker per tag value
//! ```

pub mod balancer;
pub mod cache;
pub mod config;
pub mod error;
pub mod round_robin;
pub mod sync;
pub mod tag_selector;
pub mod weighted_random;

pub use balancer::{Balancer, CallContext, EmptyPicker, Picker};
pub use cache::{CacheStats, PickerCache};
pub use config::{BalancerConfig, Strategy, TagSelectorConfig};
pub use error::{BalanceError, BalanceResult, ConfigError};
pub use round_robin::{RoundRobinBalancer, RoundRobinPicker};
pub use sync::{DiscoverySync, SyncStats};
pub use tag_selector::{DEFAULT_PARTITION, TagFn, TagPicker, TagSelectorBalancer};
pub use weighted_random::{WeightedRandomBalancer, WeightedRandomPicker};
