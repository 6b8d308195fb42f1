use std::sync::Arc;

use crate::helpers::{row, spawn_app, MockInsightGenerator};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
};
use dashboard::InsightGenerator;
use serde_json::{from_slice, Value};
use time::macros::datetime;
use tower::ServiceExt;

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn insights_disabled_without_key() {
    let rows = vec![row("02t", "ก", "north", datetime!(2025-05-04 10:00), 60.0)];
    let test_app = spawn_app(&rows, None).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post("/insights"))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn insights_refused_for_empty_selection() {
    let mut generator = MockInsightGenerator::new();
    generator.expect_generate().times(0);
    let generator: Arc<dyn InsightGenerator> = Arc::new(generator);

    let rows = vec![row("02t", "ก", "north", datetime!(2025-05-04 10:00), 60.0)];
    let test_app = spawn_app(&rows, Some(generator)).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post("/insights?start=2025-06-01&end=2025-06-01"))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn insights_send_statistical_summary() {
    let mut generator = MockInsightGenerator::new();
    generator
        .expect_generate()
        .withf(|context: &str| {
            context.contains("PM25.aqi") && context.contains("count") && context.contains("ก")
        })
        .times(1)
        .returning(|_| Ok(String::from("📌 Executive Summary\nair is fine")));
    let generator: Arc<dyn InsightGenerator> = Arc::new(generator);

    let rows = vec![
        row("02t", "ก", "north", datetime!(2025-05-04 10:00), 60.0),
        row("02t", "ก", "north", datetime!(2025-05-04 11:00), 40.0),
    ];
    let test_app = spawn_app(&rows, Some(generator)).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post("/insights?station=%E0%B8%81"))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["station"], "ก");
    assert!(body["insight"].as_str().unwrap().contains("air is fine"));
}

#[tokio::test]
async fn insights_upstream_failure_is_bad_gateway() {
    let mut generator = MockInsightGenerator::new();
    generator
        .expect_generate()
        .times(1)
        .returning(|_| Err(dashboard::insights::Error::Http(String::from("timeout"))));
    let generator: Arc<dyn InsightGenerator> = Arc::new(generator);

    let rows = vec![row("02t", "ก", "north", datetime!(2025-05-04 10:00), 60.0)];
    let test_app = spawn_app(&rows, Some(generator)).await;

    let response = test_app
        .app
        .clone()
        .oneshot(post("/insights"))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
