mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use parley::server::{self, AppState};
use parley::{NlpBackend, NlpService};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(dir: &std::path::Path) -> Router {
    let service = Arc::new(common::service(dir));
    server::router(AppState::new(service, Duration::from_secs(5)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_reports_components() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["embedder"], "hashing");
    assert_eq!(body["data_sources"], 1);
    assert_eq!(body["intent_enabled"], false);
    assert_eq!(body["current_domain"], "erp");
    assert_eq!(body["coreference_model"], false);
    assert!(body["uptime_secs"].is_u64());
}

#[tokio::test]
async fn test_health_reports_injected_coreference_model() {
    let dir = tempfile::tempdir().unwrap();
    let backend = NlpBackend::hashing(256).with_coreference(Arc::new(common::FixedRewrite::new("anything")));
    let service = NlpService::with_backend(&common::test_config(dir.path()), backend).unwrap();
    let app = server::router(AppState::new(Arc::new(service), Duration::from_secs(5)));

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["coreference_model"], true);
}

#[tokio::test]
async fn test_unknown_domain_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::POST, "/change_domain", Some(json!({"domain": "nonexistent"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["available_domains"], json!(["erp", "support"]));
    assert!(body["error"].as_str().unwrap().contains("nonexistent"));

    let (_, domains) = send(&app, Method::GET, "/get_domains", None).await;
    assert_eq!(domains["current_domain"], "erp");
    assert_eq!(domains["domain_configs"]["support"]["similarity_threshold"], json!(0.8));
}

#[tokio::test]
async fn test_change_domain_reports_loaded_tables() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::POST, "/change_domain", Some(json!({"domain": "support"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "domain_changed");
    assert_eq!(body["domain"], "support");
    assert_eq!(body["questions_loaded"], 0);
}

#[tokio::test]
async fn test_stored_messages_are_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(
        &app,
        Method::POST,
        "/store_message",
        Some(json!({"session_id": "s1", "message": "printer on floor two is jammed", "role": "user"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["message_id"].is_string());

    send(
        &app,
        Method::POST,
        "/store_message",
        Some(json!({"session_id": "s1", "message": "A technician is on the way", "role": "bot"})),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/get_relevant_history?query=printer%20jammed&session_id=s1&top_k=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let hits = body["relevant_history"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["message"], "printer on floor two is jammed");
    assert_eq!(hits[0]["role"], "user");

    let (_, body) = send(&app, Method::GET, "/get_session_history?session_id=s1", None).await;
    let turns = body["session_history"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1]["message"], "A technician is on the way");
}

#[tokio::test]
async fn test_degenerate_message_gets_no_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(
        &app,
        Method::POST,
        "/store_message",
        Some(json!({"session_id": "s1", "message": "?!", "role": "user"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["message_id"].is_null());
}

#[tokio::test]
async fn test_analyze_text_exact_match() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(
        &app,
        Method::POST,
        "/analyze_text",
        Some(json!({"text": "How do I reset my password?", "strategy": "exact_match"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["strategy_used"], "exact_match");
    assert_eq!(body["source"], "exact_match");
    assert_eq!(body["match"], "Use the self-service portal.");
    assert_eq!(body["confidence"], 1.0);
}

#[tokio::test]
async fn test_analyze_returns_domain_decision() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(&app, Method::POST, "/analyze", Some(json!({"text": "Apply for leave!"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "csv_lookup");
    assert_eq!(body["intent"], "leave_request");
    assert_eq!(body["domain"], "erp");
}

#[tokio::test]
async fn test_nlp_utilities() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (_, body) = send(
        &app,
        Method::POST,
        "/resolve_coref",
        Some(json!({
            "text": "What about managers?",
            "prev_bot_response": "Employees accrue 20 days under the leave policy."
        })),
    )
    .await;
    assert_eq!(body["resolved"], "what is the leave policy for managers?");

    let (_, body) = send(&app, Method::POST, "/classify_intent", Some(json!({"text": "apply for leave"}))).await;
    assert_eq!(body["intent"], "leave_request");
    assert_eq!(body["source"], "csv_lookup");
    assert_eq!(body["method"], "exact_lookup");

    let (_, body) = send(
        &app,
        Method::POST,
        "/extract_entities",
        Some(json!({"text": "Book leave from 2024-08-12"})),
    )
    .await;
    assert_eq!(body["entities"]["DATE"], "2024-08-12");
}

#[tokio::test]
async fn test_configure_rejects_out_of_range_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (status, body) = send(
        &app,
        Method::POST,
        "/configure",
        Some(json!({"semantic_config": {"similarity_threshold": 2.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("similarity_threshold"));

    let (status, body) = send(&app, Method::POST, "/configure", Some(json!({"default_strategy": "semantic_search"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "configured");
    assert_eq!(body["config"]["default_strategy"], "semantic_search");
}
