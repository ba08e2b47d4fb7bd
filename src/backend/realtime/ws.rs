/**
 * WebSocket Transport
 *
 * `GET /ws` upgrades to the sync protocol. The peer is authenticated
 * *before* the upgrade: a missing, expired or otherwise rejected token
 * refuses the handshake with `401` and a JSON error body, and no
 * connection is registered.
 *
 * # Token
 *
 * Browsers cannot set headers on a WebSocket upgrade, so the token is read
 * from the `access_token` query parameter first and from an
 * `Authorization: Bearer` header second. A loopback peer without a token is
 * a trusted server connection when `server.trust_loopback` is set.
 *
 * # Socket Tasks
 *
 * The socket is split. A writer task serializes `ServerMessage`s from a
 * bounded queue onto the sink; the reader loop hands every text frame to
 * the connection's `Agent`. Closing either side stops both.
 */

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::backend::auth::{extract_token, ConnectSession};
use crate::backend::error::BackendError;
use crate::backend::server::state::AppState;
use crate::backend::sync::{Agent, ConnectionState, SyncBackend};
use crate::shared::protocol::ServerMessage;

/// Query parameter carrying the access token
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Handle a WebSocket upgrade (GET /ws)
///
/// # Errors
///
/// * `401 Unauthorized` - token missing, invalid, expired or lacking scope
/// * `503 Service Unavailable` - the JWKS endpoint or the store is down
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, BackendError> {
    let phase = ConnectionState::Connecting.advance(ConnectionState::Authenticating)?;
    tracing::debug!("Handshake from {} ({:?})", peer, phase);

    let token = extract_token(&headers, params.get(ACCESS_TOKEN_PARAM).map(String::as_str));
    let session = state.connect.authenticate(peer, token.as_deref()).await?;
    let phase = phase.advance(ConnectionState::Authenticated)?;

    let backend = state.backend.clone();
    let buffer = state.config.server.outbound_buffer.max(1);
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, backend, session, peer, buffer, phase)))
}

async fn serve_socket(
    socket: WebSocket,
    backend: SyncBackend,
    session: ConnectSession,
    peer: SocketAddr,
    buffer: usize,
    phase: ConnectionState,
) {
    let connection = Arc::new(backend.connect_as(session));
    let handle = connection.handle();
    let (mut sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerMessage>(buffer);

    let writer = tokio::spawn(async move {
        let mut outbound = ReceiverStream::new(rx);
        while let Some(message) = outbound.next().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to serialize message for connection {}: {}", handle, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut phase = match phase.advance(ConnectionState::Active) {
        Ok(phase) => phase,
        Err(e) => {
            tracing::error!("Connection {} from {}: {}", handle, peer, e);
            return;
        }
    };
    tracing::info!("Connection {} from {} is {:?}", handle, peer, phase);

    let mut agent = Agent::new(connection, tx);
    if agent.init().await {
        while let Some(frame) = stream.next().await {
            let open = match frame {
                Ok(Message::Text(text)) => agent.handle_text(text.as_str()).await,
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => agent.handle_text(text).await,
                    Err(_) => agent.protocol_error("Binary frames must hold UTF-8 JSON").await,
                },
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!("Connection {} read error: {}", handle, e);
                    false
                }
            };
            if !open {
                break;
            }
        }
    }

    agent.close();
    drop(agent);
    let _ = writer.await;

    phase = phase.advance(ConnectionState::Closed).unwrap_or(ConnectionState::Closed);
    tracing::info!("Connection {} from {} is {:?}", handle, peer, phase);
}
