use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, ChatError};
use crate::middleware::auth::bearer_token;
use crate::models::UserId;
use crate::presence::{ConnectionHandle, ConnectionId, PresenceRegistry};
use crate::state::AppState;
use crate::websocket::message_types::{parse_client_event, ClientEvent, InboundError, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Authenticate before upgrading; browsers cannot set headers on a socket,
/// so `?token=` is accepted alongside the bearer header.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token.as_deref().or_else(|| bearer_token(&headers)) else {
        warn!("websocket connection rejected: no token provided");
        return AppError::Unauthorized.into_response();
    };
    let user = match state.jwt.verify(token) {
        Ok(user) => user,
        Err(err) => {
            warn!("websocket connection rejected: invalid token");
            return err.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: UserId, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = unbounded_channel::<ServerEvent>();
    state
        .sessions
        .connect(user.clone(), ConnectionHandle { id: connection_id, tx })
        .await;

    let (mut sender, mut receiver) = socket.split();

    let mut heartbeat = tokio::time::interval(state.config.heartbeat_interval);
    heartbeat.reset();
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(%connection_id, event = event.name(), error = %e, "failed to encode event"),
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        handle_frame(&state, connection_id, &user, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => last_seen = Instant::now(),
                    Some(Err(e)) => {
                        debug!(%connection_id, error = %e, "socket read failed");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() >= state.config.client_timeout {
                    info!(%connection_id, user_id = %user, "connection timed out");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.sessions.disconnect(connection_id).await;
}

async fn handle_frame(state: &AppState, connection: ConnectionId, user: &UserId, text: &str) {
    match parse_client_event(text) {
        Ok(event) => {
            if let Err(err) = dispatch(state, connection, user, event).await {
                report(state, connection, &err).await;
            }
        }
        Err(InboundError::Invalid { kind, error }) if kind.reports_errors() => {
            report(state, connection, &error).await;
        }
        Err(err) => debug!(connection_id = %connection, ?err, "dropped inbound frame"),
    }
}

async fn dispatch(
    state: &AppState,
    connection: ConnectionId,
    user: &UserId,
    event: ClientEvent,
) -> Result<(), ChatError> {
    match event {
        ClientEvent::InitPrivateChat { target_user_id } => {
            state
                .sessions
                .initiate(connection, user, &target_user_id)
                .await?;
        }
        ClientEvent::AcceptPrivateChat { room_id } => {
            state.sessions.accept(connection, user, &room_id).await?;
        }
        ClientEvent::SendPrivateChatMessage(request) => {
            state.delivery.send_message(connection, user, request).await?;
        }
        ClientEvent::PrivateChatTyping { room_id, is_typing } => {
            state
                .delivery
                .set_typing(connection, user, &room_id, is_typing)
                .await;
        }
        ClientEvent::CheckUserOnline { user_id } => {
            state.delivery.check_online(connection, &user_id).await;
        }
        ClientEvent::LeavePrivateChat { room_id } => {
            state.delivery.leave_room(connection, user, &room_id).await;
        }
        ClientEvent::MarkMessageRead {
            message_id,
            room_id,
        } => {
            state
                .delivery
                .read_receipt(connection, user, message_id, &room_id)
                .await;
        }
    }
    Ok(())
}

/// Errors go to the originating connection only; it stays open.
async fn report(state: &AppState, connection: ConnectionId, err: &ChatError) {
    debug!(connection_id = %connection, error = err.kind(), "chat error");
    state
        .presence
        .send_to_connection(connection, ServerEvent::from(err))
        .await;
}
