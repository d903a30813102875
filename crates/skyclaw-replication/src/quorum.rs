//! Quorum write wrapper: checkpoint → apply → fan-out snapshot → rollback
//! if acks fall short (spec.md §4.2).

use std::sync::Arc;

use futures::future::join_all;
use skyclaw_core::{required_peer_acks, CoordinatorError, CoordinatorState, PeerSet};
use tracing::{info, warn};

use crate::client::PeerClient;

pub struct QuorumWriter {
    state: Arc<CoordinatorState>,
    peers: Arc<PeerSet>,
    client: PeerClient,
    min_replicas: u32,
}

impl QuorumWriter {
    pub fn new(
        state: Arc<CoordinatorState>,
        peers: Arc<PeerSet>,
        min_replicas: u32,
        auth_token: Option<String>,
    ) -> Self {
        QuorumWriter {
            state,
            peers,
            client: PeerClient::new(auth_token),
            min_replicas,
        }
    }

    /// Run `mutation` against the coordinator state under the quorum
    /// discipline described in spec.md §4.2 steps 1–8. `mutation` must not
    /// hold any `.await` point — it runs inside the coarse state lock.
    pub async fn apply<F, T>(&self, mutation: F) -> Result<T, CoordinatorError>
    where
        F: FnOnce(&CoordinatorState) -> Result<T, CoordinatorError>,
    {
        let required = required_peer_acks(self.min_replicas);
        if (self.peers.len() as u32) < required {
            return Err(CoordinatorError::Unavailable(
                "insufficient peers".to_string(),
            ));
        }

        let checkpoint = self.state.checkpoint();

        let value = match mutation(&self.state) {
            Ok(v) => v,
            Err(err) => {
                self.state.restore(checkpoint)?;
                return Err(err);
            }
        };

        let snapshot = self.state.snapshot()?;
        let acks = self.fan_out(&snapshot).await;
        if acks < required {
            warn!(acks, required, "replication target not met, rolling back");
            self.state.restore(checkpoint)?;
            return Err(CoordinatorError::Unavailable(
                "replication target not met".to_string(),
            ));
        }
        info!(acks, required, "quorum write committed");
        Ok(value)
    }

    async fn fan_out(&self, snapshot: &skyclaw_core::Snapshot) -> u32 {
        let peers = self.peers.list();
        let pushes = peers
            .iter()
            .map(|peer| self.client.push_snapshot(peer, snapshot));
        let results = join_all(pushes).await;
        results.into_iter().filter(|ok| *ok).count() as u32
    }
}
