//! # skyclaw-core
//!
//! The coordinator's state machine: the authoritative host/job/service
//! registry, lease-based scheduling, last-writer-wins snapshot merge, and
//! the idempotency-hash and peer-set primitives the replication layer
//! builds on. No network or disk I/O lives here — durable writes go
//! through the [`StateStore`] seam, implemented elsewhere.

mod error;
pub mod idempotency;
mod model;
mod peer_set;
mod replication_policy;
mod state;
mod store;

pub use error::CoordinatorError;
pub use model::{
    capabilities_satisfied, normalize_capabilities, normalize_endpoint, should_adopt,
    AssignmentStatus, Host, IdempotencyRecord, Job, JobPayload, JobResult, JobStatus,
    Requirement, Service, ServiceAssignment, ServiceStatus, Snapshot,
};
pub use peer_set::{normalize_url, PeerSet};
pub use replication_policy::required_peer_acks;
pub use state::{CompleteOutcome, CoordinatorState, MergeOutcome, ReportOutcome};
pub use store::{StateStore, StoreError};
