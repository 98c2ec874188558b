//! WebSocket upgrade endpoint.
//!
//! Authenticates the request, upgrades it and hands the socket to a hub
//! session. Axum messages are translated to the session's frame types here.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;

use vhub_core::session::{self, Inbound, Outbound};

use crate::auth::Principal;
use crate::error::{Result, ServerError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// WebSocket upgrade handler for hub connections
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let principal = state.auth.authenticate(&headers, params.token.as_deref())?;
    if state.hub.is_stopped() {
        return Err(ServerError::HubStopped);
    }

    let remote = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let max_frame_bytes = state.config.max_frame_bytes;

    Ok(ws
        .max_message_size(max_frame_bytes)
        .max_frame_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, principal, remote)))
}

async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal, remote: String) {
    let admission = match state.hub.register(principal.user_id, remote).await {
        Ok(admission) => admission,
        Err(e) => {
            tracing::warn!(user_id = %principal.user_id, error = %e, "rejecting upgraded socket");
            return;
        }
    };

    let (sink, stream) = socket.split();
    let stream = stream.map(|message| message.map(inbound));
    let sink = sink.with(|outbound: Outbound| future::ready(Ok::<_, axum::Error>(message(outbound))));

    session::run(
        state.hub.clone(),
        admission,
        stream,
        sink,
        state.config.pump.clone(),
    )
    .await;
}

fn inbound(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text),
        Message::Close(_) => Inbound::Close,
        Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => Inbound::Keepalive,
    }
}

fn message(outbound: Outbound) -> Message {
    match outbound {
        Outbound::Text(frame) => Message::Text(frame.to_string()),
        Outbound::Ping => Message::Ping(Vec::new()),
        Outbound::Close => Message::Close(None),
    }
}
