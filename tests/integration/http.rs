//! HTTP surface wired to the SQLite store.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use stagewise::api::{build_router, ApiState};
use stagewise::storage::SqliteRepository;
use stagewise::validation::FinancialValidator;
use stagewise::workflow::SnapshotService;

async fn app() -> Router {
    let repo = SqliteRepository::connect("sqlite::memory:").await.unwrap();
    let service = SnapshotService::new(Arc::new(repo), FinancialValidator::default());
    build_router(Arc::new(ApiState::new(service, "stagewise-it")))
}

async fn send(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn finalize_and_explain_over_sqlite() {
    let app = app().await;
    let company = Uuid::new_v4();

    let (status, created) = send(
        &app,
        "POST",
        "/api/snapshots",
        json!({
            "company_id": company,
            "snapshot_date": "2026-06-30",
            "cash_balance": 500000,
            "monthly_revenue": 10000,
            "operating_costs": 30000,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, finalized) = send(&app, "POST", &format!("/api/snapshots/{id}/finalize"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finalized["snapshot"]["stage"], "SEED");
    assert_eq!(finalized["snapshot"]["monthly_burn"], "20000");
    assert_eq!(finalized["snapshot"]["runway_months"], "25.00");

    let (status, explanation) = send(&app, "GET", &format!("/api/snapshots/{id}/explanation"), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = explanation["contributing_signals"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["RunwayMonths", "MonthlyBurn"]);

    let (status, patched) = send(
        &app,
        "PATCH",
        &format!("/api/snapshots/{id}"),
        json!({ "cash_balance": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(patched["error"], "immutable_snapshot");
}

#[tokio::test]
async fn invalidate_requires_reason() {
    let app = app().await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/snapshots/{}/invalidate", Uuid::new_v4()),
        json!({ "reason": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "empty_invalidation_reason");
}
