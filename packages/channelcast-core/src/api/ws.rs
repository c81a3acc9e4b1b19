//! The `/events` WebSocket endpoint: a one-way fan-out of [`BroadcastEvent`]s
//! to any number of connected clients. There is no incoming command
//! protocol — clients only ever read.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::events::BroadcastEvent;

use super::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Upgrades the connection and hands it off to [`handle_socket`].
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let guard = state.ws_manager.register();
    let cancel_token = guard.cancel_token();
    let mut broadcast_rx = state.events.subscribe();
    let (mut sender, mut receiver) = socket.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    log::debug!("[ws] client {} connected ({} total)", guard.id(), state.ws_manager.connection_count());

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // clients send nothing meaningful; ignore and keep reading
                    Some(Err(e)) => {
                        log::debug!("[ws] client {} read error: {e}", guard.id());
                        break;
                    }
                }
            }
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(frame) = encode(&event) {
                            if sender.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[ws] client {} lagged, {skipped} event(s) dropped", guard.id());
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    log::debug!("[ws] client {} disconnected", guard.id());
}

fn encode(event: &BroadcastEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            log::error!("[ws] failed to serialize event: {e}");
            None
        }
    }
}
