//! Integration tests for the RecordGate HTTP service

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use recordgate_service::{create_router, AppState, ServiceConfig};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

const CUSTOMERS: &str = r#"{"id":1,"name":"ada","email":"ada@example.com","region":"eu"}
{"id":2,"name":"brian","email":"brian@example.com","region":"us"}
{"id":3,"name":"cleo","email":"cleo@example.com","region":"eu"}
"#;

const POLICY: &str = r#"
name: customers
description: Customer data minimisation
resources:
  - "/customers"
rules:
  - name: hide-email
    trigger:
      type: purpose
      purpose: analytics
    actions:
      - type: remove
        field: email
  - name: eu-only
    trigger:
      type: context
      field: jurisdiction
      value: eu
    actions:
      - type: keep_where
        field: region
        equals: eu
"#;

struct Harness {
    dir: TempDir,
    state: AppState,
    router: Router,
}

fn harness(max_concurrent_reads: usize) -> Harness {
    harness_with(|config| config.reader.max_concurrent_reads = max_concurrent_reads)
}

fn harness_with(configure: impl FnOnce(&mut ServiceConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("customers")).unwrap();
    fs::write(dir.path().join("customers/all.jsonl"), CUSTOMERS).unwrap();
    fs::write(dir.path().join("customers-export.jsonl"), CUSTOMERS).unwrap();
    fs::write(dir.path().join("policy.yaml"), POLICY).unwrap();

    let mut config = ServiceConfig::default();
    config
        .backend
        .insert("fs.root".to_string(), dir.path().to_string_lossy().into_owned());
    config.policy_path = dir.path().join("policy.yaml").to_string_lossy().into_owned();
    config.reader.max_concurrent_reads = 4;
    configure(&mut config);

    let handle = PrometheusBuilder::new().build_recorder().handle();
    let state = AppState::new(config, handle).unwrap();
    let router = create_router(state.clone());
    Harness { dir, state, router }
}

fn read_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/read")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn customers(purpose: &str) -> Value {
    json!({
        "resource": "/customers/all.jsonl",
        "data_type": "record",
        "format": "jsonl",
        "user": "alice",
        "roles": ["analyst"],
        "purpose": purpose,
    })
}

fn header(response: &axum::response::Response, name: &str) -> String {
    response.headers()[name].to_str().unwrap().to_string()
}

async fn body_lines(response: axum::response::Response) -> Vec<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness(4);
    let response = h
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_read_applies_policy() {
    let h = harness(4);
    let response = h.router.oneshot(read_request(customers("analytics"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-records-processed"), "3");
    assert_eq!(header(&response, "x-records-returned"), "3");
    assert_eq!(header(&response, "x-policy-message"), "policies: customers");

    let records = body_lines(response).await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.get("email").is_none()));
}

#[tokio::test]
async fn test_identifier_aliases_get_the_same_policy() {
    let h = harness(4);
    let file_uri = format!("file://{}/customers/./all.jsonl", h.dir.path().display());
    let aliases = [
        "customers/all.jsonl",
        "./customers/all.jsonl",
        "/./customers/all.jsonl",
        "//customers//all.jsonl",
        "/customers/sub/../all.jsonl",
        file_uri.as_str(),
    ];

    for alias in aliases {
        let mut request = customers("analytics");
        request["resource"] = json!(alias);

        let response = h.router.clone().oneshot(read_request(request)).await.unwrap();
        let status = response.status();
        if alias.contains("..") {
            // Parent components are refused outright beneath the root
            assert_eq!(status, StatusCode::NOT_FOUND, "alias {alias}");
            continue;
        }

        assert_eq!(status, StatusCode::OK, "alias {alias}");
        assert_eq!(header(&response, "x-records-processed"), "3", "alias {alias}");
        let records = body_lines(response).await;
        assert_eq!(records.len(), 3, "alias {alias}");
        assert!(records.iter().all(|r| r.get("email").is_none()), "alias {alias}");
    }
}

#[tokio::test]
async fn test_sibling_sharing_a_prefix_is_not_covered() {
    let h = harness(4);
    let mut request = customers("analytics");
    request["resource"] = json!("/customers-export.jsonl");

    let response = h.router.oneshot(read_request(request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-records-processed"), "-1");
    assert!(response.headers().get("x-policy-message").is_none());
}

#[tokio::test]
async fn test_audit_keeps_recent_window() {
    let h = harness_with(|config| config.telemetry.audit_retention = 2);

    for _ in 0..3 {
        let response = h
            .router
            .clone()
            .oneshot(read_request(customers("analytics")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let summary = h.state.audit_summary(10);
    assert_eq!(summary.events, 3);
    assert_eq!(summary.recent.len(), 2);
    assert!(summary.verified);
}

#[tokio::test]
async fn test_context_fields_reach_triggers() {
    let h = harness(4);
    let mut request = customers("support");
    request["context"] = json!({"jurisdiction": "eu"});

    let response = h.router.oneshot(read_request(request)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-records-returned"), "2");
    let names: Vec<_> = body_lines(response)
        .await
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["ada", "cleo"]);
}

#[tokio::test]
async fn test_unmatched_policy_returns_raw_bytes() {
    let h = harness(4);
    let response = h.router.oneshot(read_request(customers("billing"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-records-processed"), "-1");
    assert_eq!(header(&response, "x-records-returned"), "-1");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, CUSTOMERS.as_bytes());
}

#[tokio::test]
async fn test_missing_resource_is_not_found() {
    let h = harness(4);
    let mut request = customers("analytics");
    request["resource"] = json!("/nope.jsonl");

    let response = h.router.oneshot(read_request(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_flavour_is_server_error() {
    let h = harness(4);
    let mut request = customers("analytics");
    request["format"] = json!("parquet");

    let response = h.router.oneshot(read_request(request)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_no_capacity_is_retryable() {
    let h = harness(1);
    let _held = h.state.reader.capacity().try_acquire().unwrap();

    let response = h.router.oneshot(read_request(customers("analytics"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(header(&response, "retry-after"), "1");
}

#[tokio::test]
async fn test_audit_records_every_outcome() {
    let h = harness(1);

    let ok = h
        .router
        .clone()
        .oneshot(read_request(customers("analytics")))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let held = h.state.reader.capacity().try_acquire().unwrap();
    let refused = h
        .router
        .clone()
        .oneshot(read_request(customers("analytics")))
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::SERVICE_UNAVAILABLE);
    drop(held);

    let response = h
        .router
        .oneshot(Request::get("/audit?limit=10").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let summary: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();

    assert_eq!(summary["events"], 2);
    assert_eq!(summary["verified"], true);
    assert_eq!(summary["recent"][0]["status"], "refused");
    assert_eq!(summary["recent"][1]["status"], "completed");
    assert_eq!(summary["recent"][1]["records_returned"], 3);

    let totals = h.state.metrics.snapshot();
    assert_eq!((totals.reads, totals.refused), (2, 1));
}
