//! The `/ws` push channel (spec.md §6): server pushes `{kind, trade_uuid?,
//! payload}`, client acks with `{ack: notification_id}`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    steam_id: u64,
}

#[derive(Debug, Deserialize)]
struct ClientAck {
    ack: Uuid,
}

pub async fn upgrade(ws: WebSocketUpgrade, Query(query): Query<WsQuery>, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle(socket, query.steam_id, state))
}

async fn handle(mut socket: WebSocket, steam_id: u64, state: AppState) {
    let mut rx = state.notifier.registry().register(steam_id);
    if let Err(err) = state.notifier.drain_on_reconnect(steam_id).await {
        warn!(steam_id, error = %err, "failed to drain pending notifications on connect");
    }

    loop {
        tokio::select! {
            pushed = rx.recv() => {
                let Some(notification) = pushed else { break };
                let frame = serde_json::json!({
                    "kind": notification.kind,
                    "notification_id": notification.id,
                    "payload": notification.payload,
                });
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientAck>(&text) {
                            Ok(ack) => {
                                if let Err(err) = state.notifier.ack(ack.ack).await {
                                    warn!(steam_id, error = %err, "failed to record notification ack");
                                }
                            }
                            Err(err) => debug!(steam_id, error = %err, "ignoring malformed ws frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(steam_id, error = %err, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    state.notifier.registry().unregister(steam_id);
}
