use std::sync::Arc;

use skyclaw_core::{CoordinatorState, PeerSet, StateStore};
use skyclaw_replication::QuorumWriter;

use crate::config::Config;

/// Shared application state threaded through every handler.
pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<CoordinatorState>,
    pub writer: QuorumWriter,
    pub peers: Arc<PeerSet>,
    pub store: Arc<dyn StateStore>,
}
