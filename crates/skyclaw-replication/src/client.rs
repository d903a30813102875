//! Thin HTTP client wrappers around a peer coordinator's replication and
//! gossip endpoints.

use std::time::Duration;

use skyclaw_core::Snapshot;
use tracing::debug;

#[derive(Clone)]
pub struct PeerClient {
    replicate: reqwest::Client,
    gossip: reqwest::Client,
    auth_token: Option<String>,
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PeerClient {
    /// `auth_token` is attached as `x-skyclaw-token` on every outgoing call,
    /// since replication and gossip endpoints sit behind the same
    /// shared-token auth as the rest of the non-public surface (spec.md
    /// §4.6).
    pub fn new(auth_token: Option<String>) -> Self {
        PeerClient {
            replicate: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client"),
            gossip: reqwest::Client::builder()
                .timeout(Duration::from_secs(3))
                .build()
                .expect("reqwest client"),
            auth_token,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.header("x-skyclaw-token", token),
            None => builder,
        }
    }

    /// POST a snapshot to a peer's replication endpoint. `Ok(true)` means a
    /// 2xx ack; network errors and non-2xx both count as a failed ack.
    pub async fn push_snapshot(&self, peer_base_url: &str, snapshot: &Snapshot) -> bool {
        let url = format!("{peer_base_url}/v1/replicate/snapshot");
        let req = self.authed(self.replicate.post(&url)).json(snapshot);
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                debug!(peer = %peer_base_url, error = %err, "replication push failed");
                false
            }
        }
    }

    /// GET a peer's full-state snapshot for the sync loop.
    pub async fn fetch_state(&self, peer_base_url: &str) -> Option<Snapshot> {
        let url = format!("{peer_base_url}/v1/state");
        let req = self.authed(self.gossip.get(&url));
        match req.send().await {
            Ok(resp) if resp.status().is_success() => resp.json::<Snapshot>().await.ok(),
            _ => None,
        }
    }

    /// GET a peer's known peer list for the discovery loop.
    pub async fn fetch_peers(&self, peer_base_url: &str) -> Vec<String> {
        #[derive(serde::Deserialize)]
        struct PeersResponse {
            peers: Vec<String>,
        }
        let url = format!("{peer_base_url}/v1/network/peers");
        let req = self.authed(self.gossip.get(&url));
        match req.send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<PeersResponse>()
                .await
                .map(|p| p.peers)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// POST this node's own public URL to a peer's join endpoint.
    pub async fn join(&self, peer_base_url: &str, self_url: &str) {
        #[derive(serde::Serialize)]
        struct JoinRequest<'a> {
            url: &'a str,
        }
        let url = format!("{peer_base_url}/v1/network/join");
        let req = self
            .authed(self.gossip.post(&url))
            .json(&JoinRequest { url: self_url });
        let _ = req.send().await;
    }
}
