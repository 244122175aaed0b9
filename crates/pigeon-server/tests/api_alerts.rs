//! Integration tests for alert publishing and recent reads over HTTP.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pigeon_db::{create_pool, DbPool, DbRuntimeSettings};
use pigeon_log::{EventLog, LogSettings, NewRecord, RecordView};
use pigeon_server::{app, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for oneshot

struct Harness {
    _dir: TempDir,
    pool: DbPool,
    log: EventLog,
    app: Router,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("alerts.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("should create pool");
    let log = EventLog::open(pool.clone(), LogSettings::default())
        .await
        .expect("should open log");
    let state = AppState::new(log.clone(), 10, CancellationToken::new());
    Harness {
        _dir: dir,
        pool,
        log,
        app: app(state),
    }
}

async fn post_alert(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/alerts")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn alert(message: &str) -> Value {
    json!({
        "source": "checkout",
        "type": "error",
        "message": message,
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness().await;
    let (status, body) = get_json(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn post_alert_returns_enriched_record() {
    let h = harness().await;
    let (status, body) = post_alert(
        &h.app,
        json!({
            "source": "checkout",
            "type": "error",
            "message": "payment declined",
            "metadata": { "order": 42 }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let view: RecordView = serde_json::from_value(body).unwrap();
    assert_eq!(view.payload["source"], "checkout");
    assert_eq!(view.payload["type"], "error");
    assert_eq!(view.payload["message"], "payment declined");
    assert_eq!(view.payload["metadata"]["order"], 42);
    assert_eq!(view.enriched_at.len(), "2024-05-01T12:00:00Z".len());
    assert!(view.enriched_at.ends_with('Z'));
    assert_eq!(h.log.head(), Some(view.id));
}

#[tokio::test]
async fn post_alert_missing_field_is_rejected() {
    let h = harness().await;
    let (status, _) = post_alert(&h.app, json!({ "source": "checkout", "type": "error" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.log.head(), None);
}

#[tokio::test]
async fn recent_returns_newest_first() {
    let h = harness().await;
    for i in 1..=5 {
        let (status, _) = post_alert(&h.app, alert(&format!("alert {i}"))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = get_json(&h.app, "/alerts/recent?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    let messages: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["payload"]["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, ["alert 5", "alert 4", "alert 3"]);
}

#[tokio::test]
async fn recent_defaults_to_ten() {
    let h = harness().await;
    for i in 0..12 {
        post_alert(&h.app, alert(&format!("alert {i}"))).await;
    }

    let (status, body) = get_json(&h.app, "/alerts/recent").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn recent_on_empty_log_is_empty() {
    let h = harness().await;
    let (status, body) = get_json(&h.app, "/alerts/recent?limit=100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn recent_rejects_out_of_range_limits() {
    let h = harness().await;
    for limit in ["0", "101", "-1"] {
        let (status, body) = get_json(&h.app, &format!("/alerts/recent?limit={limit}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "limit={limit}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn recent_skips_malformed_records() {
    let h = harness().await;
    post_alert(&h.app, alert("before")).await;
    h.log
        .append(NewRecord::from_raw("not json", "2024-05-01T12:00:00Z"))
        .await
        .unwrap();
    post_alert(&h.app, alert("after")).await;

    let (status, body) = get_json(&h.app, "/alerts/recent?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let messages: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["payload"]["message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, ["after", "before"]);
}

#[tokio::test]
async fn unavailable_store_maps_to_503() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.db");
    let pool = create_pool(
        path.to_str().unwrap(),
        DbRuntimeSettings {
            pool_max_size: 1,
            connection_timeout_ms: 100,
            ..DbRuntimeSettings::default()
        },
    )
    .unwrap();
    let log = EventLog::open(pool.clone(), LogSettings::default())
        .await
        .unwrap();
    let app = app(AppState::new(log, 10, CancellationToken::new()));

    let _held = pool.get().unwrap();
    let (status, body) = post_alert(&app, alert("lost")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let (status, _) = get_json(&app, "/alerts/recent").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn published_alerts_are_persisted() {
    let h = harness().await;
    post_alert(&h.app, alert("stored")).await;

    let conn = h.pool.get().unwrap();
    let payload: String = conn
        .query_row("SELECT payload_json FROM event_log", [], |row| row.get(0))
        .unwrap();
    let value: Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(value["message"], "stored");
}
