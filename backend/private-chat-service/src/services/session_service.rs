use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::metrics::WS_CONNECTIONS;
use crate::models::UserId;
use crate::presence::{ConnectionHandle, ConnectionId, Departure, PresenceRegistry};
use crate::room::{resolve_room, RoomId};
use crate::websocket::message_types::ServerEvent;

/// Connection lifecycle and the two-step room handshake.
#[derive(Clone)]
pub struct SessionService {
    presence: Arc<dyn PresenceRegistry>,
}

impl SessionService {
    pub fn new(presence: Arc<dyn PresenceRegistry>) -> Self {
        Self { presence }
    }

    pub async fn connect(&self, user: UserId, handle: ConnectionHandle) {
        let connection_id = handle.id;
        self.presence.register(user.clone(), handle).await;
        WS_CONNECTIONS.inc();
        info!(%connection_id, user_id = %user, "connection registered");
    }

    /// Drop the connection from presence. When it was the user's last one,
    /// the rooms it had joined hear that the user went offline.
    pub async fn disconnect(&self, connection: ConnectionId) -> Option<Departure> {
        let departure = self.presence.unregister(connection).await?;
        WS_CONNECTIONS.dec();
        info!(
            connection_id = %connection,
            user_id = %departure.user,
            rooms = departure.rooms.len(),
            user_offline = departure.user_offline,
            "connection unregistered"
        );

        if departure.user_offline {
            for room in &departure.rooms {
                self.presence
                    .broadcast_to_room(
                        room,
                        ServerEvent::UserOnlineStatus {
                            user_id: departure.user.clone(),
                            is_online: false,
                        },
                        None,
                    )
                    .await;
            }
        }
        Some(departure)
    }

    /// Start (or restart) a conversation from `initiator` towards `target`.
    ///
    /// The initiator's connection joins at once and hears
    /// `private-chat-started`. Online targets get `private-chat-request` and
    /// must accept; offline targets are not queued for.
    pub async fn initiate(
        &self,
        connection: ConnectionId,
        initiator: &UserId,
        target: &UserId,
    ) -> Result<RoomId, ChatError> {
        let room = resolve_room(initiator, target)?;

        self.presence.join_room(connection, &room).await;
        self.presence
            .send_to_connection(
                connection,
                ServerEvent::PrivateChatStarted {
                    room_id: room.clone(),
                    target_user_id: target.clone(),
                },
            )
            .await;

        let notified = self
            .presence
            .send_to_user(
                target,
                ServerEvent::PrivateChatRequest {
                    from_user_id: initiator.clone(),
                    room_id: room.clone(),
                },
            )
            .await;
        if notified == 0 {
            debug!(room_id = %room, target_id = %target, "target offline; session request dropped");
        }

        Ok(room)
    }

    /// Join `user`'s connection to a room it was invited to.
    pub async fn accept(
        &self,
        connection: ConnectionId,
        user: &UserId,
        room: &RoomId,
    ) -> Result<(), ChatError> {
        let counterpart = room
            .counterpart_of(user)
            .ok_or_else(|| ChatError::validation(format!("{user} is not a participant of {room}")))?;

        self.presence.join_room(connection, room).await;
        self.presence
            .send_to_connection(
                connection,
                ServerEvent::PrivateChatStarted {
                    room_id: room.clone(),
                    target_user_id: counterpart.clone(),
                },
            )
            .await;
        Ok(())
    }
}
