//! Background sweep routines invoked on a timer from `lib::spawn_sweepers`
//! (spec.md §4.5).

use std::sync::Arc;

use chrono::Utc;
use skyclaw_core::{CoordinatorState, StateStore};
use tracing::{debug, warn};

/// Requeue any jobs whose lease has expired (spec.md §4.5 "every 1 s").
pub fn sweep_leases(state: &Arc<CoordinatorState>) {
    match state.requeue_expired_leases() {
        Ok(0) => {}
        Ok(n) => debug!(requeued = n, "lease sweep requeued expired jobs"),
        Err(err) => warn!(error = %err, "lease sweep failed"),
    }
}

/// Delete expired idempotency ledger rows (spec.md §4.5 "every 60 s").
pub fn sweep_idempotency(store: &Arc<dyn StateStore>) {
    let now = Utc::now().to_rfc3339();
    match store.gc_idempotency(&now) {
        Ok(0) => {}
        Ok(n) => debug!(deleted = n, "idempotency GC swept expired rows"),
        Err(err) => warn!(error = %err, "idempotency GC failed"),
    }
}
