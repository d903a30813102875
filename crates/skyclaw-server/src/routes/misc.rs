use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use skyclaw_core::Snapshot;

use crate::app_state::AppState;
use crate::error::ApiResult;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub node_id: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        node_id: state.coordinator.node_id().to_string(),
    })
}

pub async fn state_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Json<Snapshot>> {
    Ok(Json(state.coordinator.snapshot()?))
}

#[derive(Debug, Serialize)]
pub struct ReplicateResponse {
    pub ok: bool,
    pub changed: bool,
    pub node_id: String,
}

pub async fn replicate_snapshot(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<Snapshot>,
) -> ApiResult<Json<ReplicateResponse>> {
    let outcome = state.coordinator.merge_snapshot(snapshot)?;
    Ok(Json(ReplicateResponse {
        ok: true,
        changed: outcome.changed,
        node_id: state.coordinator.node_id().to_string(),
    }))
}
