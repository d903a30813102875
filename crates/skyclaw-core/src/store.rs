//! The durable-store seam: `CoordinatorState` writes every mutation through
//! this trait inside the same synchronous operation (spec.md §4.1 "Durable
//! mirror"). Concrete backends (e.g. `skyclaw-store-sqlite`) and the
//! in-memory test double in `skyclaw-testing` both implement it.

use thiserror::Error;

use crate::model::{Host, IdempotencyRecord, Job, Service, Snapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable store I/O error: {0}")]
    Io(String),
    #[error("durable store serialization error: {0}")]
    Serialization(String),
}

/// Synchronous durable-store seam. Every method must complete without
/// suspending so a `CoordinatorState` mutation stays a single atomic unit
/// (spec.md §5 "Suspension points").
pub trait StateStore: Send + Sync {
    fn put_host(&self, host: &Host) -> Result<(), StoreError>;
    fn put_job(&self, job: &Job) -> Result<(), StoreError>;
    fn put_service(&self, service: &Service) -> Result<(), StoreError>;

    /// Transactionally replace all persisted hosts/jobs/services with the
    /// contents of `snapshot`. Used by `restore()`.
    fn replace_all(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Load the full persisted state, used on startup to recover after a
    /// crash or restart (spec.md §1 "durable queue state").
    fn load_snapshot(&self, node_id: &str) -> Result<Snapshot, StoreError>;

    fn put_idempotency(&self, record: &IdempotencyRecord) -> Result<(), StoreError>;
    fn get_idempotency(&self, route: &str, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;
    /// Delete ledger rows whose `expires_at <= now_rfc3339`. Returns count deleted.
    fn gc_idempotency(&self, now_rfc3339: &str) -> Result<u64, StoreError>;
}
