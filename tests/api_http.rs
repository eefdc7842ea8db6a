// tests/api_http.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    Router,
};
use chrono::Utc;
use http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

use newsroom_pulse::api::{create_router, AppState};
use newsroom_pulse::board::{TrendBoard, TrendSnapshot};
use newsroom_pulse::content::BatchOrigin;
use newsroom_pulse::events::RecordingSink;
use newsroom_pulse::scheduler::SyncLedger;
use newsroom_pulse::scoring::rank;
use newsroom_pulse::session::{DedupMarker, MemorySessionStore, SessionStore};
use newsroom_pulse::{AlertDispatcher, ContentItem};

fn app() -> (Router, Arc<TrendBoard>) {
    let sink = Arc::new(RecordingSink::new());
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let board = Arc::new(TrendBoard::new());
    let state = AppState {
        dispatcher: Arc::new(AlertDispatcher::new(sink, DedupMarker::breaking_alert(store))),
        board: board.clone(),
        ledger: SyncLedger::default(),
        alert_hold: Duration::ZERO,
    };
    (create_router(state), board)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if body.is_some() {
        req = req.header("content-type", "application/json");
    }
    let req = req
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 256 * 1024).await.unwrap();
    let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, v)
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn notify_then_dismiss_lifecycle() {
    let (app, _) = app();

    let (_, v) = call(&app, "GET", "/alert/active", None).await;
    assert!(v.is_null());

    let (s, v) = call(
        &app,
        "POST",
        "/notify",
        Some(r#"{"title":"Traffic","message":"Ring road closed","type":"warning"}"#),
    )
    .await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(v["shown"], Value::Bool(true));

    let (_, v) = call(&app, "POST", "/notify", Some(r#"{"title":"Second"}"#)).await;
    assert_eq!(v["shown"], Value::Bool(false));

    let (_, active) = call(&app, "GET", "/alert/active", None).await;
    assert_eq!(active["headline"], "Traffic: Ring road closed");
    assert_eq!(active["level"], "warning");
    let id = active["id"].as_str().unwrap().to_string();

    let (_, v) = call(&app, "POST", "/alert/dismiss", Some(r#"{"id":"alert-stale"}"#)).await;
    assert_eq!(v["dismissed"], Value::Bool(false));

    let body = format!(r#"{{"id":"{id}"}}"#);
    let (_, v) = call(&app, "POST", "/alert/dismiss", Some(&body)).await;
    assert_eq!(v["dismissed"], Value::Bool(true));

    let (_, v) = call(&app, "GET", "/alert/active", None).await;
    assert!(v.is_null());
}

#[tokio::test]
async fn trending_reads_the_board() {
    let (app, board) = app();

    let (s, _) = call(&app, "GET", "/trending?channel=news", None).await;
    assert_eq!(s, StatusCode::NOT_FOUND);

    let now = Utc::now();
    let items = vec![
        ContentItem::new("a", "A", now).engagement(10, 0),
        ContentItem::new("b", "B", now).engagement(500, 20),
    ];
    board.publish(TrendSnapshot {
        channel: "news".into(),
        updated_at: now,
        origin: BatchOrigin::Live,
        entries: rank(&items, now),
    });

    let (s, v) = call(&app, "GET", "/trending?channel=news", None).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(v[0]["channel"], "news");
    assert_eq!(v[0]["origin"], "live");
    assert_eq!(v[0]["entries"][0]["item"]["id"], "b");
    assert!(v[0]["entries"][0]["score"]["total"].as_f64().unwrap() > 500.0);

    let (_, all) = call(&app, "GET", "/trending", None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (_, ch) = call(&app, "GET", "/channels", None).await;
    assert_eq!(ch, Value::Array(vec![]));
}
