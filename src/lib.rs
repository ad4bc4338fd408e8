//! Lease-based leader election for a fleet of equivalent instances.
//!
//! Every instance runs a [`LeaderElector`]: an observation loop that claims
//! the shared lease when it is free or expired, and a renewal loop that keeps
//! it alive while this instance leads. Mutual exclusion comes entirely from
//! the [`LeaseStore`]'s conditional writes.

pub mod config;
pub mod election;
pub mod interface;
pub mod lease;
pub mod util;

pub use config::{ConfigError, ElectionConfig};
pub use election::{controller::ElectionController, manager::LeaderElector, Role};
pub use interface::notifier::{LogNotifier, RoleNotifier};
pub use lease::{
    classify,
    memory::InMemoryLeaseStore,
    resolver::{ConflictResolver, Resolution},
    store::{LeaseStore, StoreError},
    LeaseRecord, LeaseStatus, LeaseVersion, VersionedLease,
};
pub use util::clock::{Clock, ManualClock, MonotonicClock, SystemClock};
