//! WebSocket upgrade + session loop. Each connection gets its own `Session`;
//! client messages and session events (countdown ticks, finished content
//! loads) are handled one at a time, and every resulting message is sent back
//! as JSON.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::Session;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "practica_valencia", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let (mut session, mut events) = Session::new(state);
  let session_id = session.id();
  info!(target: "practica_valencia", session = %session_id, "WebSocket connected");

  loop {
    let replies = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "practica_valencia", session = %session_id, "WS received: {:?}", &msg);
            session.handle_client(msg).await
          }
          Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e), retryable: false }],
        },
        Some(Ok(Message::Ping(payload))) => {
          if socket.send(Message::Pong(payload)).await.is_err() {
            break;
          }
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          error!(target: "practica_valencia", session = %session_id, error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => continue,
      },
      Some(event) = events.recv() => session.handle_event(event).await,
    };

    if let Err(e) = send_all(&mut socket, replies).await {
      error!(target: "practica_valencia", session = %session_id, error = %e, "WS send error");
      break;
    }
  }

  // Dropping the session stops its countdown and any pending load.
  drop(session);
  info!(target: "practica_valencia", session = %session_id, "WebSocket disconnected");
}

async fn send_all(socket: &mut WebSocket, replies: Vec<ServerWsMessage>) -> Result<(), axum::Error> {
  for reply in replies {
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e), "retryable": false }).to_string()
    });
    socket.send(Message::Text(out)).await?;
  }
  Ok(())
}
