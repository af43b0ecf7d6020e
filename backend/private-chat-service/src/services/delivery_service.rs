use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::metrics::{AUTO_JOINS, MESSAGES_DELIVERED};
use crate::models::{Message, MessageId, UserId};
use crate::presence::{ConnectionId, PresenceRegistry};
use crate::room::RoomId;
use crate::services::PersistenceWriter;
use crate::websocket::message_types::{SendMessage, ServerEvent};

/// Live message delivery plus the ephemeral room signals.
#[derive(Clone)]
pub struct DeliveryService {
    presence: Arc<dyn PresenceRegistry>,
    writer: PersistenceWriter,
    max_message_chars: usize,
}

/// Reject blank text and text over `max_chars` characters.
pub fn validate_text(text: &str, max_chars: usize) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if text.chars().count() > max_chars {
        return Err(ChatError::validation(format!(
            "message exceeds {max_chars} characters"
        )));
    }
    Ok(())
}

impl DeliveryService {
    pub fn new(
        presence: Arc<dyn PresenceRegistry>,
        writer: PersistenceWriter,
        max_message_chars: usize,
    ) -> Self {
        Self {
            presence,
            writer,
            max_message_chars,
        }
    }

    /// Broadcast a new message to its room and queue it for storage.
    ///
    /// Target connections that never accepted the handshake are joined on
    /// the spot and told so together with the message. The sender is acked
    /// with `message-sent` whatever happened to individual recipients.
    pub async fn send_message(
        &self,
        connection: ConnectionId,
        sender: &UserId,
        request: SendMessage,
    ) -> Result<Message, ChatError> {
        validate_text(&request.text, self.max_message_chars)?;

        let room = request.room_id;
        match room.counterpart_of(sender) {
            None => {
                return Err(ChatError::validation(format!(
                    "{sender} is not a participant of {room}"
                )))
            }
            Some(counterpart) if counterpart != &request.target_user_id => {
                return Err(ChatError::validation(format!(
                    "targetUserId does not belong to {room}"
                )))
            }
            Some(_) => {}
        }
        let target = request.target_user_id;

        let message = Message::new(
            request.message_id.unwrap_or_default(),
            sender.clone(),
            target.clone(),
            Some(room.clone()),
            request.text,
            Utc::now(),
        );

        let joined = self
            .presence
            .auto_join(
                &target,
                &room,
                ServerEvent::PrivateChatAutoJoined {
                    from_user_id: sender.clone(),
                    room_id: room.clone(),
                    message: message.clone(),
                },
            )
            .await;
        if joined > 0 {
            AUTO_JOINS.inc_by(joined as u64);
            debug!(user_id = %target, room_id = %room, connections = joined, "auto-joined recipient");
        }
        self.presence.join_room(connection, &room).await;

        let reached = self
            .presence
            .broadcast_to_room(&room, ServerEvent::NewPrivateMessage(message.clone()), None)
            .await;
        MESSAGES_DELIVERED.inc();
        info!(
            message_id = %message.message_id,
            room_id = %room,
            connections = reached,
            "message broadcast"
        );

        self.writer.enqueue(message.clone());

        self.presence
            .send_to_connection(
                connection,
                ServerEvent::MessageSent {
                    message_id: message.message_id.clone(),
                    room_id: room,
                    timestamp: message.timestamp,
                },
            )
            .await;

        Ok(message)
    }

    /// Relay a typing flag to the other members of the room.
    pub async fn set_typing(
        &self,
        connection: ConnectionId,
        user: &UserId,
        room: &RoomId,
        is_typing: bool,
    ) {
        if !room.contains(user) {
            debug!(user_id = %user, room_id = %room, "typing signal for foreign room dropped");
            return;
        }
        self.presence
            .broadcast_to_room(
                room,
                ServerEvent::UserTypingIndicator {
                    user_id: user.clone(),
                    room_id: room.clone(),
                    is_typing,
                },
                Some(connection),
            )
            .await;
    }

    pub async fn check_online(&self, connection: ConnectionId, user: &UserId) {
        let is_online = self.presence.is_online(user).await;
        self.presence
            .send_to_connection(
                connection,
                ServerEvent::UserOnlineStatus {
                    user_id: user.clone(),
                    is_online,
                },
            )
            .await;
    }

    /// Leave a room and tell whoever is still in it.
    pub async fn leave_room(&self, connection: ConnectionId, user: &UserId, room: &RoomId) {
        if !self.presence.leave_room(connection, room).await {
            debug!(connection_id = %connection, room_id = %room, "leave for room not joined");
            return;
        }
        self.presence
            .broadcast_to_room(
                room,
                ServerEvent::UserLeftPrivateChat {
                    user_id: user.clone(),
                    room_id: room.clone(),
                },
                None,
            )
            .await;
    }

    /// UI-only read receipt. Durable read state changes through the REST
    /// mark-read endpoints.
    pub async fn read_receipt(
        &self,
        connection: ConnectionId,
        reader: &UserId,
        message_id: MessageId,
        room: &RoomId,
    ) {
        if !room.contains(reader) {
            debug!(user_id = %reader, room_id = %room, "read receipt for foreign room dropped");
            return;
        }
        self.presence
            .broadcast_to_room(
                room,
                ServerEvent::MessageRead {
                    message_id,
                    room_id: room.clone(),
                    reader_id: reader.clone(),
                },
                Some(connection),
            )
            .await;
    }
}
