//! Idempotency-ledger middleware (spec.md §4.3).
//!
//! Intercepts before the handler runs: a missing `x-idempotency-key`
//! header passes straight through. A present key is looked up by
//! `(route, key)`; a hash match replays the stored response verbatim, a
//! mismatch is a 409, and a miss runs the handler and persists the result
//! on success only — failed mutations don't poison the key.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use skyclaw_core::{idempotency::request_hash, IdempotencyRecord};
use tracing::warn;

use crate::app_state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub async fn idempotency_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = req
        .headers()
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
    else {
        return next.run(req).await;
    };

    let route = req.uri().path().to_string();
    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return bad_request("failed to read request body"),
    };
    let body_value: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };
    let hash = request_hash(&route, &body_value);

    match state.store.get_idempotency(&route, &key) {
        Ok(Some(record)) => {
            if record.request_hash != hash {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({ "error": "idempotency key reuse conflict" })),
                )
                    .into_response();
            }
            let status = StatusCode::from_u16(record.status_code).unwrap_or(StatusCode::OK);
            return (status, Json(record.response_json)).into_response();
        }
        Ok(None) => {}
        Err(err) => {
            warn!(error = %err, "idempotency ledger lookup failed");
        }
    }

    let req = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(req).await;

    if !response.status().is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let response_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };
    let response_json: Value =
        serde_json::from_slice(&response_bytes).unwrap_or_else(|_| Value::Null);

    let now = Utc::now();
    let record = IdempotencyRecord {
        route,
        key,
        request_hash: hash,
        status_code: parts.status.as_u16(),
        response_json,
        created_at: now,
        expires_at: now + Duration::milliseconds(state.config.idempotency_ttl_ms),
    };
    if let Err(err) = state.store.put_idempotency(&record) {
        warn!(error = %err, "failed to persist idempotency record");
    }

    Response::from_parts(parts, Body::from(response_bytes))
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
