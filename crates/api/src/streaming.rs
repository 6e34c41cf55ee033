//! WebSocket transport for the poll protocol.

#![allow(missing_docs)]

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::connection::PollConnection;
use crate::middleware::AppState;
use crate::protocol::ServerFrame;

/// Streaming query parameters.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Admin token, verified once for the whole connection.
    pub token: Option<String>,
}

/// WebSocket handler for `GET /streaming`.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Drive one WebSocket until either side goes away.
async fn handle_socket(socket: WebSocket, query: StreamQuery, state: AppState) {
    let admin = match query.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => {
            let identity = state.verifier.verify(token);
            if identity.is_none() {
                warn!("Streaming admin token rejected, continuing unauthenticated");
            }
            identity
        }
        _ => None,
    };

    let (mut connection, mut outbound) = PollConnection::new(state, admin);
    let (mut sender, mut receiver) = socket.split();

    info!(connection_id = %connection.id(), "Streaming connection established");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = connection.handle_text(text.as_str()).await;
                        if send_frame(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(connection_id = %connection.id(), "Client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection_id = %connection.id(), error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            Some(frame) = outbound.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    connection.disconnect().await;
    info!(connection_id = %connection.id(), "Streaming connection closed");
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to encode server frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
