use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use skyclaw_core::Requirement;

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::routes::hosts::JobResponse;
use crate::routes::parse_payload;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobRequest {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub requirement: Option<Requirement>,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnqueueJobRequest>,
) -> ApiResult<Json<JobResponse>> {
    let payload = parse_payload(body.payload)?;
    let job = state
        .writer
        .apply(|s| s.enqueue_job(payload, body.requirement, body.submitted_by))
        .await?;
    Ok(Json(JobResponse { job }))
}
