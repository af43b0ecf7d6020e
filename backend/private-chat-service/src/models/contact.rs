use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, UserId};

/// Unread messages from one sender, computed on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadGroup {
    pub sender_id: UserId,
    pub count: u64,
    /// Ascending by timestamp
    pub messages: Vec<Message>,
    pub latest_message: String,
    pub latest_message_time: DateTime<Utc>,
}

impl UnreadGroup {
    /// Build a group from a sender's unread messages; `None` when empty.
    pub fn from_messages(sender_id: UserId, mut messages: Vec<Message>) -> Option<Self> {
        messages.sort_by_key(|m| m.timestamp);
        let latest = messages.last()?;
        Some(Self {
            latest_message: latest.text.clone(),
            latest_message_time: latest.timestamp,
            count: messages.len() as u64,
            sender_id,
            messages,
        })
    }
}

/// Read-side projection of one conversation, re-derivable at any time
/// from stored messages and presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub counterpart_id: UserId,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u64,
    pub is_online: bool,
}
