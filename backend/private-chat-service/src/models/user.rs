use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ChatError;

pub const MAX_ID_LEN: usize = 128;

/// Opaque user identifier issued by the identity provider.
///
/// Allowed characters are ASCII alphanumerics plus `-`, `.`, `@` and `:`.
/// The underscore is reserved as the room id separator, which keeps
/// `RoomId` unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ChatError::validation("user id cannot be empty"));
        }
        if raw.len() > MAX_ID_LEN {
            return Err(ChatError::validation("user id is too long"));
        }
        if !raw.bytes().all(is_user_id_byte) {
            return Err(ChatError::validation(format!(
                "user id {raw:?} contains invalid characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_user_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'@' | b':')
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Dedup key for a message across every arrival channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ChatError::validation("message id cannot be empty"));
        }
        if raw.len() > MAX_ID_LEN || raw.chars().any(char::is_control) {
            return Err(ChatError::validation("message id is malformed"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MessageId {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}
