//! WarpGrid discovery model.
//!
//! The registry side of the RPC client produces [`Snapshot`]s of service
//! instances and reports membership [`Change`]s. This crate only defines
//! those values; watching a registry is done elsewhere.

pub mod types;

pub use types::{Change, DEFAULT_WEIGHT, DiscoveryEvent, Instance, InstanceRef, Snapshot};
