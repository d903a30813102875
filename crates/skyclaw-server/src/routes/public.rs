//! `/v1/public/jobs*` — bearer/API-key-scoped job submission (spec.md §4.6).

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;
use skyclaw_core::{capabilities_satisfied, normalize_capabilities, CoordinatorError, JobPayload, Requirement};

use crate::app_state::AppState;
use crate::auth::MatchedApiKey;
use crate::error::{ApiError, ApiResult};
use crate::routes::parse_payload;

fn submitted_by_for(key: &crate::config::ApiKeyConfig) -> String {
    let label = key.label.clone().unwrap_or_else(|| "anonymous".to_string());
    format!("public:{label}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEnqueueJobRequest {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub requirement: Option<Requirement>,
}

pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Extension(MatchedApiKey(key)): Extension<MatchedApiKey>,
    Json(body): Json<PublicEnqueueJobRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let payload = parse_payload(body.payload)?;
    if matches!(payload, JobPayload::Shell { .. }) && !key.allow_shell {
        return Err(ApiError(CoordinatorError::Forbidden(
            "this API key may not submit shell jobs".to_string(),
        )));
    }

    let allowed = normalize_capabilities(key.allowed_capabilities_or_default());
    let requirement = body.requirement.unwrap_or_default();
    let required = normalize_capabilities(requirement.required_capabilities);
    if !capabilities_satisfied(&required, &allowed) {
        return Err(ApiError(CoordinatorError::Forbidden(
            "requiredCapabilities exceeds this API key's allowedCapabilities".to_string(),
        )));
    }

    let submitted_by = submitted_by_for(&key);
    let job = state
        .writer
        .apply(|s| {
            s.enqueue_job(
                payload,
                Some(Requirement {
                    required_capabilities: required,
                }),
                Some(submitted_by),
            )
        })
        .await?;

    Ok(Json(strip_submitted_by(job)))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Extension(MatchedApiKey(key)): Extension<MatchedApiKey>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let expected_submitter = submitted_by_for(&key);
    let job = state.coordinator.get_job(&id);
    match job {
        Some(job) if job.submitted_by.as_deref() == Some(expected_submitter.as_str()) => {
            Ok(Json(strip_submitted_by(job)))
        }
        _ => Err(ApiError(CoordinatorError::NotFound(format!(
            "unknown job: {id}"
        )))),
    }
}

fn strip_submitted_by(job: skyclaw_core::Job) -> serde_json::Value {
    let mut value = serde_json::json!({ "job": job });
    if let Some(obj) = value.get_mut("job").and_then(|j| j.as_object_mut()) {
        obj.remove("submittedBy");
    }
    value
}
