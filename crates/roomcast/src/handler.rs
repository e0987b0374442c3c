//! HTTP and WebSocket handlers.
//!
//! Handlers validate their inputs, call into [`ChatService`] and map
//! errors through [`RoomcastError`]'s `IntoResponse`.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use roomcast_dispatch::DispatchError;
use roomcast_protocol::{MessageContent, Nickname, RoomName, RoomSummary};
use roomcast_transport::{Connection, WebSocketConnection};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time;

use crate::RoomcastError;
use crate::service::ChatService;

/// Shared state for every handler.
pub type AppState = Arc<ChatService<WebSocketConnection>>;

#[derive(Debug, Deserialize)]
pub(crate) struct BindQuery {
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendQuery {
    #[serde(default)]
    content: String,
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "up" }))
}

pub(crate) async fn list_rooms(
    State(service): State<AppState>,
) -> Result<Json<Vec<RoomSummary>>, RoomcastError> {
    Ok(Json(service.list_rooms().await?))
}

pub(crate) async fn send_message(
    State(service): State<AppState>,
    Path((room, nickname)): Path<(String, String)>,
    Query(query): Query<SendQuery>,
) -> Result<Json<Value>, RoomcastError> {
    let room = RoomName::try_from(room)?;
    let nickname = Nickname::try_from(nickname)?;
    let content = MessageContent::try_from(query.content)?;

    let message = service.send_message(&room, &nickname, content).await?;
    Ok(Json(json!({
        "status": "sent",
        "message": message.render(),
    })))
}

/// Upgrades to a WebSocket bound to `room` as `nickname`.
///
/// A nickname that is already present is rejected with 409 before the
/// upgrade. A bind that loses a race after the upgrade gets an error
/// frame and a close.
pub(crate) async fn bind_room(
    State(service): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<BindQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, RoomcastError> {
    let room = RoomName::try_from(room)?;
    let nickname = Nickname::try_from(query.nickname)?;

    if service.registry().is_shutting_down() {
        return Err(DispatchError::ShuttingDown.into());
    }
    if let Some(existing) = service.registry().get(&room).await {
        if existing.has_nickname(&nickname).await {
            return Err(DispatchError::NicknameTaken { room, nickname }.into());
        }
    }

    let ws = ws.map_err(|e| RoomcastError::ConnectionSetup(e.body_text()))?;
    Ok(ws
        .on_upgrade(move |socket| serve_socket(service, room, nickname, socket))
        .into_response())
}

async fn serve_socket(
    service: AppState,
    room: RoomName,
    nickname: Nickname,
    socket: WebSocket,
) {
    let conn = Arc::new(WebSocketConnection::new(socket));
    match service.bind_room(&room, nickname, Arc::clone(&conn)).await {
        Ok(binding) => service.serve_connection(binding).await,
        Err(e) => {
            tracing::info!(%room, error = %e, "bind rejected after upgrade");
            let limit = service.registry().config().write_timeout;
            reject(conn, &e, limit).await;
        }
    }
}

async fn reject(
    conn: Arc<WebSocketConnection>,
    err: &RoomcastError,
    limit: Duration,
) {
    let body = json!({ "error": err.to_string() }).to_string();
    match time::timeout(limit, conn.send(body.as_bytes())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "failed to send bind error"),
        Err(_) => tracing::debug!("bind error frame timed out"),
    }
    match time::timeout(limit, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "failed to close rejected socket");
        }
        Err(_) => tracing::debug!("close of rejected socket timed out"),
    }
}
