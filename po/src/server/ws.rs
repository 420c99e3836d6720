//! WebSocket event stream per run

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::{AppState, not_found};

pub async fn run_events(
    ws: WebSocketUpgrade,
    State(host): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Some(handle) = host.run(&id) else {
        return not_found("run", &id);
    };
    let rx = handle.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, id, rx))
}

async fn stream_events(
    mut socket: WebSocket,
    run_id: String,
    mut rx: tokio::sync::broadcast::Receiver<crate::events::RunEvent>,
) {
    debug!(%run_id, "WS subscriber attached");
    loop {
        match rx.recv().await {
            Ok(event) => {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };
                let terminal = matches!(
                    event,
                    crate::events::RunEvent::RunCompleted { .. } | crate::events::RunEvent::RunFailed { .. }
                );
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
                if terminal {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                let note = serde_json::json!({"event": "lagged", "missed": missed}).to_string();
                if socket.send(Message::Text(note.into())).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }
    debug!(%run_id, "WS subscriber detached");
}
