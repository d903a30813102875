//! The `skyclawd` HTTP surface: router assembly, auth/idempotency
//! middleware, background sweepers, and environment configuration.
//!
//! Split from `main.rs` so integration tests can build a full router
//! in-process (`tests/` uses an in-memory store, no bound socket).

pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod idempotency_mw;
pub mod pretty_json;
pub mod routes;
pub mod sweepers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use app_state::AppState;

/// Assemble the full axum router over a built `AppState`.
///
/// Middleware order (outer to inner, spec.md §4.6 / `SPEC_FULL.md` §4.6):
/// trace → auth (token or public key) → idempotency → handler.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_cors = if state.config.public_cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origin: axum::http::HeaderValue = state
            .config
            .public_cors_origin
            .parse()
            .unwrap_or_else(|_| axum::http::HeaderValue::from_static("*"));
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };

    let public_routes = Router::new()
        .route(
            "/jobs",
            post(routes::public::submit_job),
        )
        .route("/jobs/:id", get(routes::public::get_job))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency_mw::idempotency_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::public_auth_middleware,
        ))
        .layer(public_cors);

    let health_routes = Router::new()
        .route("/health", get(routes::misc::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::token_auth_middleware,
        ));

    let internal_routes = Router::new()
        .route("/state", get(routes::misc::state_snapshot))
        .route("/replicate/snapshot", post(routes::misc::replicate_snapshot))
        .route("/network/peers", get(routes::network::list_peers))
        .route("/network/join", post(routes::network::join))
        .route("/hosts/register", post(routes::hosts::register))
        .route("/hosts/:id/heartbeat", post(routes::hosts::heartbeat))
        .route("/hosts/:id/claim", post(routes::hosts::claim))
        .route("/jobs", post(routes::jobs::enqueue))
        .route("/jobs/:id/complete", post(routes::hosts::complete))
        .route("/services", post(routes::services::deploy))
        .route("/services", get(routes::services::list))
        .route("/services/:id", get(routes::services::get))
        .route("/hosts/:id/services/claim", post(routes::services::claim))
        .route("/services/:id/report", post(routes::services::report))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency_mw::idempotency_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::token_auth_middleware,
        ));

    Router::new()
        .merge(health_routes)
        .nest("/v1/public", public_routes)
        .nest("/v1", internal_routes)
        .layer(middleware::from_fn(pretty_json::pretty_json_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Spawn the three background sweepers (spec.md §4.5). Returns their join
/// handles so `main` can hold onto them (they run for the process lifetime).
pub fn spawn_sweepers(state: Arc<AppState>) -> Vec<tokio::task::JoinHandle<()>> {
    let lease_state = state.coordinator.clone();
    let lease_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweepers::sweep_leases(&lease_state);
        }
    });

    let idem_store = state.store.clone();
    let idem_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweepers::sweep_idempotency(&idem_store);
        }
    });

    let mut handles = vec![lease_task, idem_task];

    if state.config.peer_discovery_enabled || !state.peers.is_empty() {
        let sync_coordinator = state.coordinator.clone();
        let sync_peers = state.peers.clone();
        let sync_interval_ms = state.config.peer_sync_interval_ms;
        let discovery_enabled = state.config.peer_discovery_enabled;
        let auth_token = state.config.auth_token.clone();
        let sync_task = tokio::spawn(async move {
            let client = skyclaw_replication::PeerClient::new(auth_token);
            let mut interval =
                tokio::time::interval(Duration::from_millis(sync_interval_ms.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                skyclaw_replication::sync_once(&sync_coordinator, &sync_peers, &client).await;
                if discovery_enabled {
                    skyclaw_replication::discover_once(&sync_peers, &client).await;
                }
            }
        });
        handles.push(sync_task);
    }

    handles
}
