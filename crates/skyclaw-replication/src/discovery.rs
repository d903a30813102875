//! Peer sync + discovery loop (spec.md §4.4).

use std::sync::Arc;

use skyclaw_core::{CoordinatorState, PeerSet};
use tracing::debug;

use crate::client::PeerClient;

/// GET each peer's full-state endpoint and merge the returned snapshot.
/// Failures are silently ignored (spec.md §4.4 "Sync").
pub async fn sync_once(state: &CoordinatorState, peers: &PeerSet, client: &PeerClient) {
    for peer in peers.list() {
        if let Some(snapshot) = client.fetch_state(&peer).await {
            match state.merge_snapshot(snapshot) {
                Ok(outcome) if outcome.changed => debug!(peer = %peer, "merged peer snapshot"),
                Ok(_) => {}
                Err(err) => debug!(peer = %peer, error = %err, "merge failed"),
            }
        }
    }
}

/// GET each peer's peers-list endpoint and adopt new URLs, then POST this
/// node's own public URL to each peer's join endpoint (spec.md §4.4
/// "Discover").
pub async fn discover_once(peers: &PeerSet, client: &PeerClient) {
    let self_url = peers.self_url().map(|s| s.to_string());
    for peer in peers.list() {
        for discovered in client.fetch_peers(&peer).await {
            peers.add(&discovered);
        }
        if let Some(self_url) = &self_url {
            client.join(&peer, self_url).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyclaw_testing::{InMemoryStore, MockPeer};
    use std::sync::Arc;

    #[tokio::test]
    async fn sync_once_merges_peer_snapshot() {
        let peer = MockPeer::start(200).await;
        let a = CoordinatorState::new("node-a", Arc::new(InMemoryStore::new()), 60_000).unwrap();
        a.register_host(None, "h".to_string(), vec![], 1).unwrap();
        let snapshot = a.snapshot().unwrap();
        peer.received().await;
        // Seed the mock peer's "last received" snapshot via a push so the
        // sync GET has something to return.
        let client = PeerClient::new(None);
        client.push_snapshot(&peer.base_url, &snapshot).await;

        let b = CoordinatorState::new("node-b", Arc::new(InMemoryStore::new()), 60_000).unwrap();
        let peers = PeerSet::new(None);
        peers.add(&peer.base_url);

        sync_once(&b, &peers, &client).await;
        let merged = b.snapshot().unwrap();
        assert_eq!(merged.hosts.len(), 1);
    }

    #[tokio::test]
    async fn sync_once_ignores_unreachable_peer() {
        let b = CoordinatorState::new("node-b", Arc::new(InMemoryStore::new()), 60_000).unwrap();
        let peers = PeerSet::new(None);
        peers.add("http://127.0.0.1:1");
        let client = PeerClient::new(None);
        sync_once(&b, &peers, &client).await;
        assert!(b.snapshot().unwrap().hosts.is_empty());
    }
}
