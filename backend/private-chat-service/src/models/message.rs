use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, UserId};
use crate::room::RoomId;

/// The durable unit of communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    /// `None` for messages appended before a session bound them to a room
    pub room_id: Option<RoomId>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    /// Delivery acknowledgment from the sender's point of view
    pub is_sent: bool,
}

impl Message {
    /// A fresh, unread, not yet acknowledged message.
    pub fn new(
        message_id: MessageId,
        sender_id: UserId,
        recipient_id: UserId,
        room_id: Option<RoomId>,
        text: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            sender_id,
            recipient_id,
            room_id,
            text,
            timestamp,
            is_read: false,
            is_sent: false,
        }
    }

    /// The participant that is not `user`, if `user` took part at all.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.sender_id == user {
            Some(&self.recipient_id)
        } else if &self.recipient_id == user {
            Some(&self.sender_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let alice = UserId::parse("alice").unwrap();
        let bob = UserId::parse("bob").unwrap();
        let room = crate::room::resolve_room(&alice, &bob).unwrap();
        let msg = Message::new(
            MessageId::parse("m-1").unwrap(),
            alice,
            bob,
            Some(room),
            "hi".into(),
            "2024-05-01T10:00:00Z".parse().unwrap(),
        );

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["messageId"], "m-1");
        assert_eq!(value["senderId"], "alice");
        assert_eq!(value["recipientId"], "bob");
        assert_eq!(value["roomId"], "alice_bob");
        assert_eq!(value["isRead"], false);
        assert_eq!(value["isSent"], false);

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }
}
