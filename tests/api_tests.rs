use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use recommender_api::{
    api::{create_router, AppState},
    config::Config,
    db::MemoryEventStore,
    models::InteractionEvent,
};

/// Sessions 1 and 2 view items 1 then 4 and buy 5; session 3 views 1, buys 6, then buys 1
fn browsing_events() -> Vec<InteractionEvent> {
    let start: DateTime<Utc> = Utc::now() - Duration::hours(2);
    let at = |minute: i64| start + Duration::minutes(minute);

    vec![
        InteractionEvent::view(1, 1, at(0)),
        InteractionEvent::view(1, 4, at(1)),
        InteractionEvent::purchase(1, 5, at(2)),
        InteractionEvent::view(2, 1, at(0)),
        InteractionEvent::view(2, 4, at(1)),
        InteractionEvent::purchase(2, 5, at(3)),
        InteractionEvent::view(3, 1, at(0)),
        InteractionEvent::purchase(3, 6, at(1)),
        InteractionEvent::purchase(3, 1, at(2)),
    ]
}

fn create_test_app() -> Router {
    let config = tokio_test::assert_ok!(Config::from_vars(Vec::new()));
    let store = Arc::new(MemoryEventStore::new(browsing_events()));
    create_router(AppState::new(store, &config))
}

async fn send_raw(request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = create_test_app().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

async fn send(request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let (status, headers, bytes) = send_raw(request).await;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn item_ids(items: &Value) -> Vec<i64> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["item_id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let (status, _, body) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_every_response_carries_request_id() {
    let (_, headers, _) = send(get("/health")).await;
    let value = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(Uuid::parse_str(value).is_ok());

    let empty_basket = post_json("/api/v1/recommendations", json!({ "item_ids": [] }));
    let (status, headers, _) = send(empty_basket).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_incoming_request_id_is_echoed() {
    let id = Uuid::new_v4().to_string();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", &id)
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = send(request).await;
    assert_eq!(headers.get("x-request-id").unwrap().to_str().unwrap(), id);
}

#[tokio::test]
async fn test_additive_recommendations() {
    let (status, _, body) = send(post_json(
        "/api/v1/recommendations",
        json!({ "item_ids": [1] }),
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["policy"], "additive");
    assert_eq!(body["partial"], false);
    // every candidate scores 2.0; ties keep first-seen order across signals
    assert_eq!(item_ids(&body["items"]), vec![6, 5, 4]);
    for item in body["items"].as_array().unwrap() {
        assert_eq!(item["score"], 2.0);
    }
}

#[tokio::test]
async fn test_weighted_recommendations() {
    let (status, _, body) = send(post_json(
        "/api/v1/recommendations",
        json!({ "item_ids": [1], "policy": "weighted" }),
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["policy"], "weighted");
    assert_eq!(
        body["items"],
        json!([
            { "item_id": 5, "score": 9.0 },
            { "item_id": 6, "score": 6.5 },
        ])
    );
}

#[tokio::test]
async fn test_recommendations_respect_requested_count() {
    let (status, _, body) = send(post_json(
        "/api/v1/recommendations",
        json!({ "item_ids": [1], "num_recommendations": 1 }),
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    // each signal keeps only its best candidate before merging
    assert_eq!(item_ids(&body["items"]), vec![5]);
}

#[tokio::test]
async fn test_recommendations_never_include_seeds() {
    let (status, _, body) = send(post_json(
        "/api/v1/recommendations",
        json!({ "item_ids": [1, 5] }),
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    let ids = item_ids(&body["items"]);
    assert!(!ids.contains(&1));
    assert!(!ids.contains(&5));
}

#[tokio::test]
async fn test_unknown_seed_is_not_found() {
    let (status, _, body) = send(post_json(
        "/api/v1/recommendations",
        json!({ "item_ids": [1, 999] }),
    ))
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_zero_recommendations_is_bad_request() {
    let (status, _, body) = send(post_json(
        "/api/v1/recommendations",
        json!({ "item_ids": [1], "num_recommendations": 0 }),
    ))
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_purchase_paths_with_support() {
    let (status, _, body) = send(get(
        "/api/v1/items/1/paths?max_path_length=1&min_support=2",
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "path": [1, 5], "frequency": 2 }]));
}

#[tokio::test]
async fn test_purchase_paths_defaults() {
    let (status, _, body) = send(get("/api/v1/items/1/paths")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "path": [1, 4, 5], "frequency": 2 },
            { "path": [1, 6], "frequency": 1 },
        ])
    );
}

#[tokio::test]
async fn test_purchase_paths_unknown_item_is_empty() {
    let (status, _, body) = send(get("/api/v1/items/999/paths")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_purchase_paths_zero_length_is_bad_request() {
    let (status, _, _) = send(get("/api/v1/items/1/paths?max_path_length=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_item_stats_skip_unknown_items() {
    let (status, _, body) = send(post_json(
        "/api/v1/items/stats",
        json!({ "item_ids": [1, 42] }),
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    let stats = body.as_array().unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["item_id"], 1);
    assert_eq!(stats[0]["total_views"], 3);
    assert_eq!(stats[0]["total_purchases"], 1);
    assert_eq!(stats[0]["top_recommendation"]["item_id"], 5);
}

#[tokio::test]
async fn test_report_samples_known_items() {
    let (status, _, body) = send(get("/api/v1/report?count=10")).await;

    assert_eq!(status, StatusCode::OK);
    let mut ids = item_ids(&body);
    ids.sort();
    assert_eq!(ids, vec![1, 4, 5, 6]);
}

#[tokio::test]
async fn test_report_as_csv() {
    let request = Request::builder()
        .uri("/api/v1/report?count=10")
        .header(header::ACCEPT, "text/csv")
        .body(Body::empty())
        .unwrap();

    let (status, headers, bytes) = send_raw(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let csv = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert!(lines[0].starts_with("item_id,total_views,total_purchases"));
    assert_eq!(lines.len(), 5);
}
