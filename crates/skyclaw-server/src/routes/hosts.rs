use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use skyclaw_core::{CompleteOutcome, Host, Job};

use crate::app_state::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHostRequest {
    pub host_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub max_parallel: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HostResponse {
    pub host: Host,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterHostRequest>,
) -> ApiResult<Json<HostResponse>> {
    let host = state
        .writer
        .apply(|s| {
            s.register_host(
                body.host_id,
                body.name,
                body.capabilities,
                body.max_parallel.unwrap_or(1),
            )
        })
        .await?;
    Ok(Json(HostResponse { host }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub active_leases: Option<i64>,
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<HeartbeatRequest>,
) -> ApiResult<Json<HostResponse>> {
    let host = state
        .writer
        .apply(|s| s.heartbeat(&id, body.active_leases))
        .await?;
    Ok(Json(HostResponse { host }))
}

#[derive(Debug, Serialize)]
pub struct JobOrNullResponse {
    pub job: Option<Job>,
}

pub async fn claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobOrNullResponse>> {
    let job = state.writer.apply(|s| s.claim_job(&id)).await?;
    Ok(Json(JobOrNullResponse { job }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteJobRequest {
    pub host_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub exit_code: i64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job: Job,
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CompleteJobRequest>,
) -> ApiResult<Json<JobResponse>> {
    let job = state
        .writer
        .apply(|s| {
            s.complete_job(
                &id,
                CompleteOutcome {
                    host_id: body.host_id,
                    success: body.success,
                    duration_ms: body.duration_ms,
                    exit_code: body.exit_code,
                    stdout: body.stdout,
                    stderr: body.stderr,
                    error: body.error,
                },
            )
        })
        .await?;
    Ok(Json(JobResponse { job }))
}
