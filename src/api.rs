use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::alert::{AlertDispatcher, AlertRecord};
use crate::board::{TrendBoard, TrendSnapshot};
use crate::scheduler::{ChannelSync, SyncLedger};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<AlertDispatcher>,
    pub board: Arc<TrendBoard>,
    pub ledger: SyncLedger,
    pub alert_hold: Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trending", get(trending))
        .route("/alert/active", get(active_alert))
        .route("/alert/dismiss", post(dismiss_alert))
        .route("/notify", post(notify))
        .route("/channels", get(channels))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `?channel=news` for one board, no query for all of them.
async fn trending(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<TrendSnapshot>>, StatusCode> {
    match q.get("channel") {
        Some(ch) => state
            .board
            .get(ch)
            .map(|s| Json(vec![s]))
            .ok_or(StatusCode::NOT_FOUND),
        None => Ok(Json(
            state
                .board
                .channels()
                .iter()
                .filter_map(|ch| state.board.get(ch))
                .collect(),
        )),
    }
}

async fn active_alert(State(state): State<AppState>) -> Json<Option<AlertRecord>> {
    Json(state.dispatcher.active())
}

#[derive(serde::Deserialize)]
struct DismissReq {
    id: String,
}

#[derive(serde::Serialize)]
struct DismissResp {
    dismissed: bool,
}

async fn dismiss_alert(
    State(state): State<AppState>,
    Json(body): Json<DismissReq>,
) -> Result<Json<DismissResp>, StatusCode> {
    let dismissed = state
        .dispatcher
        .dismiss_after(body.id, state.alert_hold)
        .await
        .map_err(|e| {
            tracing::warn!(target: "api", error = %e, "dismiss task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(DismissResp { dismissed }))
}

#[derive(serde::Deserialize)]
struct NotifyReq {
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(serde::Serialize)]
struct NotifyResp {
    shown: bool,
}

async fn notify(State(state): State<AppState>, Json(body): Json<NotifyReq>) -> Json<NotifyResp> {
    let shown = state
        .dispatcher
        .handle_notification(&body.title, &body.message, &body.kind);
    Json(NotifyResp { shown })
}

async fn channels(State(state): State<AppState>) -> Json<Vec<ChannelSync>> {
    Json(state.ledger.snapshot())
}
