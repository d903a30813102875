use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use skyclaw_core::{AssignmentStatus, ReportOutcome, Service};

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployServiceRequest {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub required_capabilities: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    pub service: Service,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub services: Vec<Service>,
}

#[derive(Debug, Serialize)]
pub struct ServiceOrNullResponse {
    pub service: Option<Service>,
}

pub async fn deploy(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeployServiceRequest>,
) -> ApiResult<Json<ServiceResponse>> {
    let service = state
        .writer
        .apply(|s| {
            s.deploy_service(
                body.name,
                body.command,
                body.args,
                body.cwd,
                body.env,
                body.replicas,
                body.required_capabilities,
            )
        })
        .await?;
    Ok(Json(ServiceResponse { service }))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: state.coordinator.list_services(),
    })
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceResponse>, ApiError> {
    match state.coordinator.get_service(&id) {
        Some(service) => Ok(Json(ServiceResponse { service })),
        None => Err(ApiError(skyclaw_core::CoordinatorError::NotFound(format!(
            "unknown service: {id}"
        )))),
    }
}

pub async fn claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceOrNullResponse>> {
    let service = state.writer.apply(|s| s.claim_service(&id)).await?;
    Ok(Json(ServiceOrNullResponse { service }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportServiceRequest {
    pub host_id: String,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReportServiceRequest>,
) -> ApiResult<Json<ServiceResponse>> {
    let service = state
        .writer
        .apply(|s| {
            s.report_service(
                &id,
                ReportOutcome {
                    host_id: body.host_id,
                    status: body.status,
                    endpoint: body.endpoint,
                    error: body.error,
                },
            )
        })
        .await?;
    Ok(Json(ServiceResponse { service }))
}

