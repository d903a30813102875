//! Token and public-API-key authentication (spec.md §4.6).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::app_state::AppState;
use crate::config::ApiKeyConfig;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Enforces `x-skyclaw-token` for every route except `/v1/public/*`, which
/// has its own middleware. A no-op when no token is configured.
pub async fn token_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.auth_token.as_deref() else {
        return next.run(req).await;
    };
    let supplied = req
        .headers()
        .get("x-skyclaw-token")
        .and_then(|v| v.to_str().ok());
    if supplied != Some(expected) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid x-skyclaw-token");
    }
    next.run(req).await
}

/// A matched public API key, inserted into request extensions for handlers
/// to read the submitter label and capability allowlist.
#[derive(Clone)]
pub struct MatchedApiKey(pub ApiKeyConfig);

/// Bearer/`x-api-key` auth for `/v1/public/*` (spec.md §4.6). Returns 503
/// when no public keys are configured at all.
pub async fn public_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.method() == axum::http::Method::OPTIONS {
        return next.run(req).await;
    }
    if state.config.api_keys.is_empty() {
        return error(StatusCode::SERVICE_UNAVAILABLE, "public API is not enabled");
    }
    let supplied = bearer_or_api_key(&req);
    let Some(supplied) = supplied else {
        return error(StatusCode::UNAUTHORIZED, "missing bearer token or x-api-key");
    };
    let Some(matched) = state
        .config
        .api_keys
        .iter()
        .find(|k| k.key == supplied)
        .cloned()
    else {
        return error(StatusCode::UNAUTHORIZED, "invalid API key");
    };
    req.extensions_mut().insert(MatchedApiKey(matched));
    next.run(req).await
}

fn bearer_or_api_key(req: &Request) -> Option<String> {
    if let Some(auth) = req.headers().get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = auth.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    req.headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
