//! End-to-end HTTP scenarios (spec.md §8 S1-S6, §6 auth rules) driven
//! in-process against the real router, an `InMemoryStore`, and
//! `min_replicas=1` so no peer acks are required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use skyclaw_core::{CoordinatorState, PeerSet};
use skyclaw_replication::QuorumWriter;
use skyclaw_server::app_state::AppState;
use skyclaw_server::config::{ApiKeyConfig, Config};
use skyclaw_testing::InMemoryStore;
use tower::ServiceExt;

fn test_config(auth_token: Option<&str>, api_keys: Vec<ApiKeyConfig>) -> Config {
    Config {
        port: 0,
        host: "127.0.0.1".to_string(),
        auth_token: auth_token.map(|s| s.to_string()),
        lease_ms: 60_000,
        db_path: ":memory:".to_string(),
        node_id: "node-test".to_string(),
        public_url: None,
        peer_urls: Vec::new(),
        peer_sync_interval_ms: 3000,
        min_replicas: 1,
        idempotency_ttl_ms: 86_400_000,
        peer_discovery_enabled: false,
        public_cors_origin: "*".to_string(),
        api_keys,
    }
}

fn test_app(config: Config) -> axum::Router {
    let store: Arc<dyn skyclaw_core::StateStore> = Arc::new(InMemoryStore::new());
    let coordinator = Arc::new(
        CoordinatorState::new(config.node_id.clone(), store.clone(), config.lease_ms).unwrap(),
    );
    let peers = Arc::new(PeerSet::new(config.public_url.clone()));
    let writer = QuorumWriter::new(
        coordinator.clone(),
        peers.clone(),
        config.min_replicas,
        config.auth_token.clone(),
    );
    let state = Arc::new(AppState {
        config,
        coordinator,
        writer,
        peers,
        store,
    });
    skyclaw_server::build_router(state)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().method("GET").uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_has_no_auth_requirement_when_no_token_configured() {
    let app = test_app(test_config(None, Vec::new()));
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_public_routes_reject_missing_token() {
    let app = test_app(test_config(Some("secret"), Vec::new()));
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_public_routes_accept_correct_token() {
    let app = test_app(test_config(Some("secret"), Vec::new()));
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-skyclaw-token", "secret")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn s1_register_host_and_claim_job() {
    let app = test_app(test_config(None, Vec::new()));

    let resp = app
        .clone()
        .oneshot(post(
            "/v1/hosts/register",
            json!({"name": "openclaw-a", "capabilities": ["shell", "openclaw"], "maxParallel": 4}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let host_id = body["host"]["id"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(post(
            "/v1/jobs",
            json!({
                "payload": {"kind": "openclaw-run", "args": ["run"]},
                "requirement": {"requiredCapabilities": ["openclaw"]},
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let job_body = json_body(resp).await;
    let job_id = job_body["job"]["id"].as_str().unwrap().to_string();

    let resp = app
        .oneshot(post(&format!("/v1/hosts/{host_id}/claim"), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let claimed = json_body(resp).await;
    assert_eq!(claimed["job"]["id"], job_id);
    assert_eq!(claimed["job"]["status"], "leased");
    assert_eq!(claimed["job"]["assignedHostId"], host_id);
}

#[tokio::test]
async fn s3_complete_job_releases_lease() {
    let app = test_app(test_config(None, Vec::new()));

    let host = json_body(
        app.clone()
            .oneshot(post(
                "/v1/hosts/register",
                json!({"name": "h", "capabilities": ["shell"], "maxParallel": 1}),
            ))
            .await
            .unwrap(),
    )
    .await;
    let host_id = host["host"]["id"].as_str().unwrap().to_string();

    app.clone()
        .oneshot(post(
            "/v1/jobs",
            json!({"payload": {"kind": "shell", "command": "echo"}}),
        ))
        .await
        .unwrap();

    let claimed = json_body(
        app.clone()
            .oneshot(post(&format!("/v1/hosts/{host_id}/claim"), json!({})))
            .await
            .unwrap(),
    )
    .await;
    let job_id = claimed["job"]["id"].as_str().unwrap().to_string();

    let resp = app
        .oneshot(post(
            &format!("/v1/jobs/{job_id}/complete"),
            json!({
                "hostId": host_id,
                "success": true,
                "durationMs": 42,
                "exitCode": 0,
                "stdout": "ok\n",
                "stderr": "",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["job"]["status"], "completed");
    assert_eq!(body["job"]["result"]["stdout"], "ok\n");
}

#[tokio::test]
async fn idempotency_key_replays_response_without_second_mutation() {
    let app = test_app(test_config(None, Vec::new()));
    let req_body = json!({"name": "h", "capabilities": [], "maxParallel": 1});

    let mut req1 = post("/v1/hosts/register", req_body.clone());
    req1.headers_mut()
        .insert("x-idempotency-key", "req-1".parse().unwrap());
    let first = json_body(app.clone().oneshot(req1).await.unwrap()).await;

    let mut req2 = post("/v1/hosts/register", req_body);
    req2.headers_mut()
        .insert("x-idempotency-key", "req-1".parse().unwrap());
    let second = json_body(app.clone().oneshot(req2).await.unwrap()).await;

    assert_eq!(first, second);

    let snapshot = json_body(app.oneshot(get("/v1/state")).await.unwrap()).await;
    assert_eq!(snapshot["hosts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn idempotency_key_reuse_with_different_body_conflicts() {
    let app = test_app(test_config(None, Vec::new()));

    let mut req1 = post(
        "/v1/hosts/register",
        json!({"name": "a", "capabilities": [], "maxParallel": 1}),
    );
    req1.headers_mut()
        .insert("x-idempotency-key", "dup".parse().unwrap());
    app.clone().oneshot(req1).await.unwrap();

    let mut req2 = post(
        "/v1/hosts/register",
        json!({"name": "b", "capabilities": [], "maxParallel": 1}),
    );
    req2.headers_mut()
        .insert("x-idempotency-key", "dup".parse().unwrap());
    let resp = app.oneshot(req2).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn public_jobs_require_api_key_when_configured() {
    let app = test_app(test_config(None, Vec::new()));
    let resp = app
        .oneshot(post(
            "/v1/public/jobs",
            json!({"payload": {"kind": "openclaw-run", "args": []}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn public_jobs_rejects_shell_payload_without_allow_shell() {
    let key = ApiKeyConfig {
        key: "pub-key".to_string(),
        label: Some("partner".to_string()),
        allowed_capabilities: vec!["openclaw".to_string()],
        allow_shell: false,
    };
    let app = test_app(test_config(None, vec![key]));
    let req = Request::builder()
        .method("POST")
        .uri("/v1/public/jobs")
        .header("content-type", "application/json")
        .header("authorization", "Bearer pub-key")
        .body(Body::from(
            json!({"payload": {"kind": "shell", "command": "echo"}}).to_string(),
        ))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn public_jobs_strip_submitted_by_and_enforce_tenant_isolation() {
    let key_a = ApiKeyConfig {
        key: "key-a".to_string(),
        label: Some("a".to_string()),
        allowed_capabilities: vec!["openclaw".to_string()],
        allow_shell: false,
    };
    let key_b = ApiKeyConfig {
        key: "key-b".to_string(),
        label: Some("b".to_string()),
        allowed_capabilities: vec!["openclaw".to_string()],
        allow_shell: false,
    };
    let app = test_app(test_config(None, vec![key_a, key_b]));

    let submit = Request::builder()
        .method("POST")
        .uri("/v1/public/jobs")
        .header("content-type", "application/json")
        .header("authorization", "Bearer key-a")
        .body(Body::from(
            json!({"payload": {"kind": "openclaw-run", "args": []}}).to_string(),
        ))
        .unwrap();
    let submitted = json_body(app.clone().oneshot(submit).await.unwrap()).await;
    assert!(submitted["job"].get("submittedBy").is_none());
    let job_id = submitted["job"]["id"].as_str().unwrap().to_string();

    let get_as_owner = Request::builder()
        .method("GET")
        .uri(format!("/v1/public/jobs/{job_id}"))
        .header("authorization", "Bearer key-a")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(get_as_owner).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let get_as_other = Request::builder()
        .method("GET")
        .uri(format!("/v1/public/jobs/{job_id}"))
        .header("authorization", "Bearer key-b")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(get_as_other).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_are_pretty_printed_json() {
    let app = test_app(test_config(None, Vec::new()));
    let resp = app.oneshot(get("/health")).await.unwrap();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("\n  "), "expected 2-space indented JSON, got: {text}");
}
