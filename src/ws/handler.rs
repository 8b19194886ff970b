//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::app::users::{random_display_name, UserId};
use crate::app::AppState;
use crate::game::CommandError;
use crate::util::rate_limit::InboundThrottle;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let display_name = random_display_name(&mut rand::thread_rng());
    let (user_id, mut outbound_rx) = state.users.register(display_name.clone());
    info!(user_id = %user_id, name = %display_name, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // The first frame a client sees is its own identity
    let welcome = ServerMsg::Connected {
        user_id,
        username: display_name,
    };
    match welcome.encode() {
        Ok(frame) => {
            if let Err(e) = ws_sink.send(Message::Binary(frame.to_vec())).await {
                error!(user_id = %user_id, error = %e, "Failed to send welcome");
                state.users.unregister(user_id);
                return;
            }
        }
        Err(e) => error!(user_id = %user_id, error = %e, "Failed to encode welcome"),
    }

    // Spawn writer task: queued frames -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Binary(frame.to_vec())).await {
                debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    run_reader(user_id, ws_stream, &state).await;

    // Cleanup on disconnect: leave the session while the name still resolves
    state.dispatcher.disconnect(user_id);
    state.users.unregister(user_id);
    writer_handle.abort();

    info!(user_id = %user_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> dispatcher. Returns when the connection should close.
async fn run_reader(user_id: UserId, mut ws_stream: SplitStream<WebSocket>, state: &AppState) {
    let throttle = InboundThrottle::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                let msg = match ClientMsg::decode(&data) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Malformed frame, closing");
                        break;
                    }
                };

                if !throttle.admit(&msg) {
                    debug!(user_id = %user_id, kind = ?msg.kind(), "Throttled inbound frame");
                    continue;
                }

                match state.dispatcher.dispatch(user_id, msg) {
                    Ok(()) => {}
                    Err(CommandError::Game(e)) => {
                        debug!(user_id = %user_id, error = %e, "Command rejected");
                        state.dispatcher.reject(user_id, &e);
                    }
                    Err(CommandError::Protocol(e)) => {
                        warn!(user_id = %user_id, error = %e, "Invalid command, closing");
                        break;
                    }
                }
            }
            Ok(Message::Text(_)) => {
                warn!(user_id = %user_id, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(user_id = %user_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(user_id = %user_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}
