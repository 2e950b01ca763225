//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::EngineCommand;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ClientMsg;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "new WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut outbound_rx = state.registry.register(conn_id);

    // The engine sends the welcome frames (connected, map, live pickups).
    if state
        .commands
        .send(EngineCommand::Connect { conn_id })
        .await
        .is_err()
    {
        warn!(conn_id = %conn_id, "engine unavailable, closing connection");
        state.registry.remove(conn_id);
        return;
    }

    // Writer task: drain the outbound queue into the socket. Frames are
    // serialized once by the engine and shared across connections.
    let writer_conn_id = conn_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
                debug!(conn_id = %writer_conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: decode frames and forward them to the engine.
    let rate_limiter = ConnectionRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, "rate limited inbound frame");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if state
                            .commands
                            .send(EngineCommand::Frame { conn_id, msg })
                            .await
                            .is_err()
                        {
                            debug!(conn_id = %conn_id, "command channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        // Protocol-invalid: log and ignore, never disconnect.
                        warn!(conn_id = %conn_id, error = %e, "unparseable client frame");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "binary frame ignored");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Drop pending writes and drain simulation state for this connection.
    writer_handle.abort();
    let _ = state
        .commands
        .send(EngineCommand::Disconnect { conn_id })
        .await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}
