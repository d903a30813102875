//! A mock peer HTTP server for replication/quorum tests: accepts the
//! replicate/snapshot push and full-state GET a real peer coordinator would
//! serve, with a configurable response status so tests can simulate acks
//! and failures.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use skyclaw_core::Snapshot;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

struct MockState {
    status: AtomicU16,
    received: Mutex<Vec<Snapshot>>,
    last_token: Mutex<Option<String>>,
}

/// A running mock peer. Dropping it does not stop the server; call
/// [`MockPeer::shutdown`] or let the test process exit.
pub struct MockPeer {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockPeer {
    /// Start a mock peer that acks every `/v1/replicate/snapshot` push with
    /// `initial_status` (use 200 to simulate a healthy peer, >=300 or a
    /// dropped socket to simulate a failure).
    pub async fn start(initial_status: u16) -> Self {
        let state = Arc::new(MockState {
            status: AtomicU16::new(initial_status),
            received: Mutex::new(Vec::new()),
            last_token: Mutex::new(None),
        });
        let router = Router::new()
            .route("/v1/replicate/snapshot", post(replicate_snapshot))
            .route("/v1/state", get(full_state))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        MockPeer {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub async fn received(&self) -> Vec<Snapshot> {
        self.state.received.lock().await.clone()
    }

    /// The `x-skyclaw-token` header value on the most recent push, if any.
    pub async fn last_token(&self) -> Option<String> {
        self.state.last_token.lock().await.clone()
    }
}

async fn replicate_snapshot(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(snapshot): Json<Snapshot>,
) -> StatusCode {
    let token = headers
        .get("x-skyclaw-token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    *state.last_token.lock().await = token;
    state.received.lock().await.push(snapshot);
    StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}

async fn full_state(State(state): State<Arc<MockState>>) -> Json<Snapshot> {
    let last = state
        .received
        .lock()
        .await
        .last()
        .cloned()
        .unwrap_or_default();
    Json(last)
}
