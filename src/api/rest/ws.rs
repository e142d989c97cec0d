use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tracing::{info, warn};

use crate::state::AppState;

/// Live feed of committed assignments, one JSON message per assignment.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| stream_assignments(socket, state))
}

async fn stream_assignments(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.assignment_events_tx.subscribe();

    info!("assignment feed client connected");

    let send_task = tokio::spawn(async move {
        while let Ok(assignment) = events.recv().await {
            let json = match serde_json::to_string(&assignment) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize assignment for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("assignment feed client disconnected");
}
