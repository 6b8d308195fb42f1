use crate::helpers::{row, spawn_app};
use air4thai_core::NormalizedRow;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{from_slice, Value};
use time::macros::datetime;
use tower::ServiceExt;

fn fixture() -> Vec<NormalizedRow> {
    vec![
        row("02t", "ก", "north", datetime!(2025-05-03 10:00), 20.0),
        row("02t", "ก", "north", datetime!(2025-05-04 10:00), 60.0),
        row("02t", "ก", "north", datetime!(2025-05-04 11:00), -1.0),
        row("05t", "ข", "south", datetime!(2025-05-04 10:00), 120.0),
        row("05t", "ข", "south", datetime!(2025-05-05 10:00), 80.0),
    ]
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request.");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let (status, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_check_works() {
    let test_app = spawn_app(&[], None).await;
    let (status, body) = get(&test_app.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn empty_year_answers_no_data() {
    let test_app = spawn_app(&[], None).await;
    for uri in ["/stations", "/readings", "/summary", "/download"] {
        let body = get_json(&test_app.app, uri).await;
        assert_eq!(body["status"], "no_data", "{}", uri);
        assert_eq!(body["message"], "No data found for 2025");
    }
}

#[tokio::test]
async fn lists_sorted_stations_with_date_bounds() {
    let test_app = spawn_app(&fixture(), None).await;
    let body = get_json(&test_app.app, "/stations").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["stations"], serde_json::json!(["ก", "ข"]));
    assert_eq!(body["all_stations"], "All Stations");
    assert_eq!(body["min_date"], "2025-05-03");
    assert_eq!(body["max_date"], "2025-05-05");
}

#[tokio::test]
async fn readings_default_to_whole_range_with_repaired_values() {
    let test_app = spawn_app(&fixture(), None).await;
    let body = get_json(&test_app.app, "/readings").await;

    assert_eq!(body["count"], 5);
    assert_eq!(body["start"], "2025-05-03");
    assert_eq!(body["end"], "2025-05-05");
    assert_eq!(body["station"], "All Stations");

    let readings = body["readings"].as_array().unwrap();
    let ids: Vec<&str> = readings
        .iter()
        .map(|r| r["stationID"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["02t", "02t", "02t", "05t", "05t"]);
    assert_eq!(readings[2]["timestamp"], "2025-05-04 11:00:00");
    assert_eq!(readings[2]["PM25.aqi"].as_f64(), Some(60.0));
    assert_eq!(readings[2]["hour"], 11);
}

#[tokio::test]
async fn readings_filter_by_station_and_dates() {
    let test_app = spawn_app(&fixture(), None).await;

    let body = get_json(&test_app.app, "/readings?station=%E0%B8%82").await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["station"], "ข");

    let body = get_json(
        &test_app.app,
        "/readings?start=2025-05-04&end=2025-05-04&station=All%20Stations",
    )
    .await;
    assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn rejects_bad_date_ranges() {
    let test_app = spawn_app(&fixture(), None).await;

    let (status, _) = get(&test_app.app, "/readings?start=04/05/2025").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&test_app.app, "/summary?start=2025-05-05&end=2025-05-03").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_reports_kpis_and_categories() {
    let test_app = spawn_app(&fixture(), None).await;
    let body = get_json(&test_app.app, "/summary?start=2025-05-04&end=2025-05-04").await;

    assert_eq!(body["status"], "ok");
    let kpis = &body["kpis"];
    assert_eq!(kpis["avg_index"].as_f64(), Some(80.0));
    assert_eq!(kpis["delta_index"].as_f64(), Some(60.0));
    assert_eq!(kpis["avg_color_id"].as_f64(), Some(2.0));
    assert_eq!(kpis["top_area"], "south");
    assert_eq!(kpis["top_area_index"].as_f64(), Some(120.0));

    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["category"], "Moderate");
    assert_eq!(categories[0]["count"], 2);
    assert_eq!(categories[0]["example_stations"], "ก");
    assert_eq!(categories[1]["category"], "Unhealthy for Sensitive");

    assert_eq!(body["map"].as_array().unwrap().len(), 2);
    let series = body["series"].as_array().unwrap();
    assert_eq!(series[0]["name_th"], "ข");
    assert_eq!(series[1]["points"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn summary_of_empty_range_says_so() {
    let test_app = spawn_app(&fixture(), None).await;
    let body = get_json(&test_app.app, "/summary?start=2025-06-01&end=2025-06-02").await;
    assert_eq!(body["status"], "empty");
    assert_eq!(
        body["message"],
        "No data found for the selected time or station."
    );
}

#[tokio::test]
async fn download_returns_filtered_csv() {
    let test_app = spawn_app(&fixture(), None).await;
    let request = Request::builder()
        .uri("/download?station=%E0%B8%82")
        .body(Body::empty())
        .unwrap();
    let response = test_app
        .app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("filtered_data.csv"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("timestamp,stationID,nameTH"));
    assert!(lines[1].starts_with("2025-05-04 10:00:00,05t,ข"));
}
