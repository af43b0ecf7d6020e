//! Socket frames: `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChatError;
use crate::models::{Message, MessageId, UserId};
use crate::room::RoomId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    PrivateChatStarted {
        room_id: RoomId,
        target_user_id: UserId,
    },
    PrivateChatRequest {
        from_user_id: UserId,
        room_id: RoomId,
    },
    PrivateChatAutoJoined {
        from_user_id: UserId,
        room_id: RoomId,
        message: Message,
    },
    NewPrivateMessage(Message),
    MessageSent {
        message_id: MessageId,
        room_id: RoomId,
        timestamp: DateTime<Utc>,
    },
    UserTypingIndicator {
        user_id: UserId,
        room_id: RoomId,
        is_typing: bool,
    },
    UserOnlineStatus {
        user_id: UserId,
        is_online: bool,
    },
    UserLeftPrivateChat {
        user_id: UserId,
        room_id: RoomId,
    },
    MessageRead {
        message_id: MessageId,
        room_id: RoomId,
        reader_id: UserId,
    },
    ChatError {
        message: String,
        error: String,
    },
}

impl From<&ChatError> for ServerEvent {
    fn from(err: &ChatError) -> Self {
        ServerEvent::ChatError {
            message: err.to_string(),
            error: err.kind().to_string(),
        }
    }
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::PrivateChatStarted { .. } => "private-chat-started",
            ServerEvent::PrivateChatRequest { .. } => "private-chat-request",
            ServerEvent::PrivateChatAutoJoined { .. } => "private-chat-auto-joined",
            ServerEvent::NewPrivateMessage(_) => "new-private-message",
            ServerEvent::MessageSent { .. } => "message-sent",
            ServerEvent::UserTypingIndicator { .. } => "user-typing-indicator",
            ServerEvent::UserOnlineStatus { .. } => "user-online-status",
            ServerEvent::UserLeftPrivateChat { .. } => "user-left-private-chat",
            ServerEvent::MessageRead { .. } => "message-read",
            ServerEvent::ChatError { .. } => "chat-error",
        }
    }
}

/// Validated payload of `send-private-chat-message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub room_id: RoomId,
    /// Raw text; emptiness is checked by the delivery path
    pub text: String,
    pub target_user_id: UserId,
    /// Client-minted id for optimistic echo dedup
    pub message_id: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    InitPrivateChat { target_user_id: UserId },
    AcceptPrivateChat { room_id: RoomId },
    SendPrivateChatMessage(SendMessage),
    PrivateChatTyping { room_id: RoomId, is_typing: bool },
    CheckUserOnline { user_id: UserId },
    LeavePrivateChat { room_id: RoomId },
    MarkMessageRead { message_id: MessageId, room_id: RoomId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEventKind {
    InitPrivateChat,
    AcceptPrivateChat,
    SendPrivateChatMessage,
    PrivateChatTyping,
    CheckUserOnline,
    LeavePrivateChat,
    MarkMessageRead,
}

impl ClientEventKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "init-private-chat" => Self::InitPrivateChat,
            "accept-private-chat" => Self::AcceptPrivateChat,
            "send-private-chat-message" => Self::SendPrivateChatMessage,
            "private-chat-typing" => Self::PrivateChatTyping,
            "check-user-online" => Self::CheckUserOnline,
            "leave-private-chat" => Self::LeavePrivateChat,
            "mark-message-read" => Self::MarkMessageRead,
            _ => return None,
        })
    }

    /// Handshake and delivery problems are reported back as `chat-error`;
    /// signal events are dropped quietly.
    pub fn reports_errors(self) -> bool {
        matches!(
            self,
            Self::InitPrivateChat | Self::AcceptPrivateChat | Self::SendPrivateChatMessage
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundError {
    /// Not JSON, or no `event` name
    Malformed(String),
    UnknownEvent(String),
    Invalid {
        kind: ClientEventKind,
        error: ChatError,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawPayload {
    target_user_id: Option<String>,
    room_id: Option<String>,
    user_id: Option<String>,
    message_id: Option<String>,
    message: Option<String>,
    is_typing: Option<bool>,
}

impl RawPayload {
    fn require<'a>(
        missing: &mut Vec<&'static str>,
        name: &'static str,
        value: &'a Option<String>,
    ) -> Option<&'a str> {
        match value.as_deref() {
            Some(v) => Some(v),
            None => {
                missing.push(name);
                None
            }
        }
    }
}

fn missing(fields: Vec<&'static str>) -> ChatError {
    ChatError::MissingFields(fields.join(", "))
}

pub fn parse_client_event(text: &str) -> Result<ClientEvent, InboundError> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|e| InboundError::Malformed(e.to_string()))?;
    let kind = ClientEventKind::from_name(&frame.event)
        .ok_or_else(|| InboundError::UnknownEvent(frame.event.clone()))?;

    let invalid = |error: ChatError| InboundError::Invalid { kind, error };

    let payload: RawPayload = match frame.data {
        Value::Null => RawPayload::default(),
        data => serde_json::from_value(data)
            .map_err(|e| invalid(ChatError::validation(format!("malformed payload: {e}"))))?,
    };

    parse_payload(kind, payload).map_err(invalid)
}

fn parse_payload(kind: ClientEventKind, p: RawPayload) -> Result<ClientEvent, ChatError> {
    let mut absent = Vec::new();
    match kind {
        ClientEventKind::InitPrivateChat => {
            let target = RawPayload::require(&mut absent, "targetUserId", &p.target_user_id)
                .ok_or_else(|| missing(absent.clone()))?;
            Ok(ClientEvent::InitPrivateChat {
                target_user_id: UserId::parse(target)?,
            })
        }
        ClientEventKind::AcceptPrivateChat => {
            let room = RawPayload::require(&mut absent, "roomId", &p.room_id)
                .ok_or_else(|| missing(absent.clone()))?;
            Ok(ClientEvent::AcceptPrivateChat {
                room_id: RoomId::parse(room)?,
            })
        }
        ClientEventKind::SendPrivateChatMessage => {
            let room = RawPayload::require(&mut absent, "roomId", &p.room_id);
            let text = RawPayload::require(&mut absent, "message", &p.message);
            let target = RawPayload::require(&mut absent, "targetUserId", &p.target_user_id);
            let (Some(room), Some(text), Some(target)) = (room, text, target) else {
                return Err(missing(absent));
            };
            Ok(ClientEvent::SendPrivateChatMessage(SendMessage {
                room_id: RoomId::parse(room)?,
                text: text.to_string(),
                target_user_id: UserId::parse(target)?,
                message_id: p.message_id.as_deref().map(MessageId::parse).transpose()?,
            }))
        }
        ClientEventKind::PrivateChatTyping => {
            let room = RawPayload::require(&mut absent, "roomId", &p.room_id);
            if p.is_typing.is_none() {
                absent.push("isTyping");
            }
            let (Some(room), Some(is_typing)) = (room, p.is_typing) else {
                return Err(missing(absent));
            };
            Ok(ClientEvent::PrivateChatTyping {
                room_id: RoomId::parse(room)?,
                is_typing,
            })
        }
        ClientEventKind::CheckUserOnline => {
            let user = RawPayload::require(&mut absent, "userId", &p.user_id)
                .ok_or_else(|| missing(absent.clone()))?;
            Ok(ClientEvent::CheckUserOnline {
                user_id: UserId::parse(user)?,
            })
        }
        ClientEventKind::LeavePrivateChat => {
            let room = RawPayload::require(&mut absent, "roomId", &p.room_id)
                .ok_or_else(|| missing(absent.clone()))?;
            Ok(ClientEvent::LeavePrivateChat {
                room_id: RoomId::parse(room)?,
            })
        }
        ClientEventKind::MarkMessageRead => {
            let id = RawPayload::require(&mut absent, "messageId", &p.message_id);
            let room = RawPayload::require(&mut absent, "roomId", &p.room_id);
            let (Some(id), Some(room)) = (id, room) else {
                return Err(missing(absent));
            };
            Ok(ClientEvent::MarkMessageRead {
                message_id: MessageId::parse(id)?,
                room_id: RoomId::parse(room)?,
            })
        }
    }
}
