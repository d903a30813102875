use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub node_id: String,
    #[serde(rename = "self")]
    pub self_url: Option<String>,
    pub peers: Vec<String>,
}

pub async fn list_peers(State(state): State<Arc<AppState>>) -> Json<PeersResponse> {
    Json(PeersResponse {
        node_id: state.coordinator.node_id().to_string(),
        self_url: state.peers.self_url().map(|s| s.to_string()),
        peers: state.peers.list(),
    })
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub url: String,
}

pub async fn join(
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinRequest>,
) -> Json<PeersResponse> {
    state.peers.add(&body.url);
    Json(PeersResponse {
        node_id: state.coordinator.node_id().to_string(),
        self_url: state.peers.self_url().map(|s| s.to_string()),
        peers: state.peers.list(),
    })
}
