use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use livesync_doc::config::Config;
use livesync_doc::models::{Document, DocumentWriteResponse, ErrorResponse, ReadyResponse};
use livesync_doc::store::{FileStore, MemoryStore};
use livesync_doc::{build_router, AppState};
use serde::de::DeserializeOwned;
use tower::ServiceExt;
use uuid::Uuid;

fn app(store: Arc<MemoryStore>) -> (Router, Arc<AppState>) {
    let state = AppState::new(Config::default(), store);
    (build_router(state.clone()), state)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn post_json(router: Router, uri: &str, json: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn health_and_ready() {
    let (router, _) = app(Arc::new(MemoryStore::new()));

    let (status, body) = get(router.clone(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = parse(&body);
    assert_eq!(health["status"], "ok");

    let (status, body) = get(router, "/api/ready").await;
    assert_eq!(status, StatusCode::OK);
    let ready: ReadyResponse = parse(&body);
    assert!(ready.store_ok);
    assert_eq!(ready.active_sessions, 0);
}

#[tokio::test]
async fn reading_a_missing_document_gives_empty_content() {
    let (router, _) = app(Arc::new(MemoryStore::new()));

    let (status, body) = get(router, "/api/v1/document?id=new.md").await;
    assert_eq!(status, StatusCode::OK);
    let document: Document = parse(&body);
    assert_eq!(document.id, "new.md");
    assert_eq!(document.content, "");
    assert_eq!(document.version, 0);
}

#[tokio::test]
async fn document_requests_without_id_are_rejected() {
    let (router, _) = app(Arc::new(MemoryStore::new()));

    let (status, body) = get(router.clone(), "/api/v1/document").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.code, 400);

    let (status, _) = post_json(router, "/api/v1/document", r#"{"content":"x"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn write_then_read_back() {
    let store = Arc::new(MemoryStore::new().with_document("a.md", "old"));
    let (router, state) = app(store.clone());

    let (status, body) = post_json(
        router.clone(),
        "/api/v1/document",
        r#"{"id":"a.md","content":"new"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let written: DocumentWriteResponse = parse(&body);
    assert!(written.success);
    assert_eq!(written.version, 1);
    assert_eq!(store.get("a.md").as_deref(), Some("new"));

    let (_, body) = get(router, "/api/v1/document?id=a.md").await;
    let document: Document = parse(&body);
    assert_eq!(document.content, "new");
    assert!(document.last_saved_at.is_some());
    assert_eq!(state.registry.stats().await.sessions, 1);
}

#[tokio::test]
async fn http_write_is_broadcast_without_sender() {
    let store = Arc::new(MemoryStore::new());
    let (router, state) = app(store);

    let mut subscription = state.registry.subscribe("a.md", Uuid::new_v4()).await.unwrap();
    let (status, _) = post_json(router, "/api/v1/document", r#"{"id":"a.md","content":"hi"}"#).await;
    assert_eq!(status, StatusCode::OK);

    let msg = subscription.receiver.recv().await.unwrap();
    assert_eq!(msg.sender_id, None);
    assert_eq!(msg.document.content, "hi");
}

#[tokio::test]
async fn failed_store_write_is_a_server_error() {
    let store = Arc::new(MemoryStore::new().with_document("a.md", "kept"));
    store.set_fail_writes(true);
    let (router, _) = app(store.clone());

    let (status, body) = post_json(
        router,
        "/api/v1/document",
        r#"{"id":"a.md","content":"lost"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.code, 500);
    assert_eq!(store.get("a.md").as_deref(), Some("kept"));
}

#[tokio::test]
async fn paths_outside_the_files_root_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("files")).await.unwrap();
    let state = AppState::new(Config::default(), Arc::new(store));

    let (status, _) = get(build_router(state), "/api/v1/document?id=../secret.txt").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn diagnostics_report_sessions() {
    let (router, state) = app(Arc::new(MemoryStore::new()));
    state.registry.get_or_create("a.md").await.unwrap();

    let (status, body) = get(router, "/api/v1/diagnostics").await;
    assert_eq!(status, StatusCode::OK);
    let diagnostics: serde_json::Value = parse(&body);
    assert_eq!(diagnostics["n_sessions"], 1);
    assert_eq!(diagnostics["n_conn"], 0);
}
