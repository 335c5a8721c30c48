// Integration tests for POST /run/:connector against a mocked Meta Graph API

use adsync::warehouse::{TableRef, Warehouse};
use adsync::{AccountScope, IdempotentLoader, RetryPolicy};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use connector_manager::api::{create_router, ApiState};
use connector_manager::connectors::meta::MetaConnector;
use connector_manager::ConnectorManager;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(warehouse: Arc<Warehouse>, graph_url: &str) -> Router {
    let meta = MetaConnector::with_base_url(reqwest::Client::new(), graph_url.to_string());
    let manager = ConnectorManager::new(vec![Arc::new(meta)], IdempotentLoader::new(warehouse))
        .with_retry(RetryPolicy::immediate(1));
    create_router(ApiState {
        manager: Arc::new(manager),
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn job(accounts: Value) -> Value {
    json!({
        "project_id": "proj",
        "destination_table": "raw.meta_ads",
        "account_ids": accounts,
        "access_token": "tok",
        "start_date": "2025-01-01",
        "end_date": "2025-01-03",
    })
}

/// `/me` plus two insights pages for account 123 (2 rows, then 1).
async fn mock_graph(server: &mut ServerGuard) -> Vec<Mock> {
    let me = server
        .mock("GET", "/v24.0/me")
        .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
        .with_status(200)
        .with_body(r#"{"id":"42"}"#)
        .create_async()
        .await;
    let first = server
        .mock("GET", "/v24.0/act_123/insights")
        .match_query(Matcher::UrlEncoded(
            "time_range".into(),
            r#"{"since":"2025-01-01","until":"2025-01-03"}"#.into(),
        ))
        .with_status(200)
        .with_body(
            r#"{"data":[
                {"account_id":"123","ad_id":"1","date_start":"2025-01-01","impressions":"100","spend":"1.25","publisher_platform":"facebook"},
                {"account_id":"123","ad_id":"1","date_start":"2025-01-02","impressions":"80","spend":"0.75","publisher_platform":"instagram"}
            ],"paging":{"cursors":{"after":"c1"},"next":"https://graph.facebook.com/next"}}"#,
        )
        .create_async()
        .await;
    let second = server
        .mock("GET", "/v24.0/act_123/insights")
        .match_query(Matcher::UrlEncoded("after".into(), "c1".into()))
        .with_status(200)
        .with_body(
            r#"{"data":[
                {"account_id":"123","ad_id":"2","date_start":"2025-01-03","impressions":"5","spend":"0.10","publisher_platform":"facebook"}
            ],"paging":{"cursors":{"after":"c2"}}}"#,
        )
        .create_async()
        .await;
    vec![me, first, second]
}

#[tokio::test]
async fn test_run_meta_end_to_end() {
    let mut server = Server::new_async().await;
    let _mocks = mock_graph(&mut server).await;

    let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
    let app = create_test_app(Arc::clone(&warehouse), &server.url());

    let response = app.oneshot(post_json("/run/meta", job(json!(["123"])))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "Ok");
    assert_eq!(body["start_date"], "2025-01-01");
    assert_eq!(body["end_date"], "2025-01-03");
    assert_eq!(body["total_inserted_rows"], 3);
    assert_eq!(body["errors_count"], 0);
    assert_eq!(body["results"][0]["account_id"], "123");
    assert_eq!(body["results"][0]["destination_table"], "proj.raw.meta_ads");
    assert_eq!(body["results"][0]["inserted_rows"], 3);
    assert_eq!(body["results"][0]["status"], "success");
    assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));

    let table = TableRef::parse("raw.meta_ads", "proj").unwrap();
    let rows = warehouse.read_rows(&table).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["source"] == "Meta"));
    assert!(rows.iter().any(|r| r["date"] == "2025-01-03"));
}

#[tokio::test]
async fn test_rerun_same_window_is_idempotent() {
    let mut server = Server::new_async().await;
    let _mocks = mock_graph(&mut server).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");
    let warehouse = Arc::new(Warehouse::open(&db_path).unwrap());
    let app = create_test_app(warehouse, &server.url());

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/run/meta", job(json!("123"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total_inserted_rows"], 3);
    }

    // Reopen to check what was committed
    let warehouse = Warehouse::open(&db_path).unwrap();
    let table = TableRef::parse("raw.meta_ads", "proj").unwrap();
    let scope = AccountScope::parse("123").unwrap();
    assert_eq!(warehouse.count_rows(&table, Some(&scope)).unwrap(), 3);
}

#[tokio::test]
async fn test_failed_account_gives_partial_result() {
    let mut server = Server::new_async().await;
    let _mocks = mock_graph(&mut server).await;
    let _broken = server
        .mock("GET", "/v24.0/act_999/insights")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":{"message":"Unsupported get request","code":100}}"#)
        .create_async()
        .await;

    let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
    let app = create_test_app(warehouse, &server.url());

    let response = app
        .oneshot(post_json("/run/meta", job(json!(["123", "999"]))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);

    let body = body_json(response).await;
    assert_eq!(body["status"], "Partial");
    assert_eq!(body["errors_count"], 1);
    assert_eq!(body["total_inserted_rows"], 3);
    assert_eq!(body["results"][1]["account_id"], "999");
    assert_eq!(body["results"][1]["status"], "error");
    assert_eq!(body["results"][1]["error_kind"], "vendor");
    assert!(body["results"][1]["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported get request"));
}

#[tokio::test]
async fn test_bad_requests() {
    let server = Server::new_async().await;
    let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
    let app = create_test_app(warehouse, &server.url());

    let mut missing_project = job(json!(["123"]));
    missing_project.as_object_mut().unwrap().remove("project_id");
    let response = app
        .clone()
        .oneshot(post_json("/run/meta", missing_project))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Error");
    assert!(body["message"].as_str().unwrap().contains("project_id"));

    let mut inverted = job(json!(["123"]));
    inverted["start_date"] = json!("2025-02-01");
    let response = app.clone().oneshot(post_json("/run/meta", inverted)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json("/run/friendster", job(json!(["123"]))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("POST")
        .uri("/run/meta")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_connector_list() {
    let server = Server::new_async().await;
    let warehouse = Arc::new(Warehouse::open(":memory:").unwrap());
    let app = create_test_app(warehouse, &server.url());

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["service"], "connector-manager");

    let request = Request::builder()
        .uri("/api/connectors")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body, json!([{"name": "meta", "platform": "Meta", "fetch_style": "cursor"}]));
}
