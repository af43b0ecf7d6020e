//! Deterministic naming of two-party rooms.
//!
//! A room is never stored; both participants derive the same id from the
//! unordered pair of user ids, so neither side needs to know it in advance.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ChatError;
use crate::models::UserId;

const SEPARATOR: char = '_';

/// `"{low}_{high}"` where `low < high` in byte order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId {
    raw: String,
    low: UserId,
    high: UserId,
}

/// Resolve the room shared by `a` and `b`. Symmetric in its arguments.
pub fn resolve_room(a: &UserId, b: &UserId) -> Result<RoomId, ChatError> {
    if a == b {
        return Err(ChatError::SelfConversationNotAllowed);
    }
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    Ok(RoomId {
        raw: format!("{low}{SEPARATOR}{high}"),
        low: low.clone(),
        high: high.clone(),
    })
}

impl RoomId {
    /// Parse a room id received from a client. Only canonical ids are
    /// accepted: exactly one separator, two valid distinct users, sorted.
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let raw = raw.trim();
        let (left, right) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| ChatError::validation(format!("invalid room id {raw:?}")))?;
        let low = UserId::parse(left)?;
        let high = UserId::parse(right)?;
        let room = resolve_room(&low, &high)?;
        if room.raw != raw {
            return Err(ChatError::validation(format!(
                "room id {raw:?} is not in canonical order"
            )));
        }
        Ok(room)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn participants(&self) -> (&UserId, &UserId) {
        (&self.low, &self.high)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        &self.low == user || &self.high == user
    }

    /// The other participant, or `None` when `user` is not in this room.
    pub fn counterpart_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.low == user {
            Some(&self.high)
        } else if &self.high == user {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for RoomId {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.raw
    }
}
