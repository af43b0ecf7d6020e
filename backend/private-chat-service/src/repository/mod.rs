//! Durable message storage.
//!
//! The store is the single source of truth for "did this message happen";
//! live broadcast never waits on it. Rows are append-only except for the
//! `is_read` false→true flip.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::AppError;
use crate::models::{Message, MessageId, UnreadGroup, UserId};
use crate::room::RoomId;

pub use memory::InMemoryMessageRepository;
pub use postgres::PgMessageRepository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Corrupt(detail) => AppError::Database(sqlx::Error::Decode(detail.into())),
        }
    }
}

/// Result of an idempotent append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A row with the same `message_id` already existed; nothing changed.
    Duplicate,
}

/// Last message and unread count for one counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub counterpart_id: UserId,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u64,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: &Message) -> Result<AppendOutcome, StoreError>;

    /// A page of the room's messages, ascending by timestamp with ties in
    /// insertion order. `offset` counts back from the newest message, so
    /// `offset = 0` is always the latest page.
    async fn history(
        &self,
        room: &RoomId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError>;

    /// Unread messages addressed to `recipient`, one group per sender,
    /// newest group first.
    async fn unread_by_recipient(&self, recipient: &UserId)
        -> Result<Vec<UnreadGroup>, StoreError>;

    /// Flip every unread message from `sender` to `recipient`. Returns the
    /// number of rows changed; zero on repeat calls.
    async fn mark_read(&self, recipient: &UserId, sender: &UserId) -> Result<u64, StoreError>;

    /// Flip the listed messages in `room` that are addressed to `recipient`.
    async fn mark_read_by_ids(
        &self,
        recipient: &UserId,
        room: &RoomId,
        ids: &[MessageId],
    ) -> Result<u64, StoreError>;

    async fn total_unread(&self, recipient: &UserId) -> Result<u64, StoreError>;

    /// One summary per counterpart, most recently active first.
    async fn contact_summaries(&self, user: &UserId)
        -> Result<Vec<ConversationSummary>, StoreError>;
}

/// Whether `message` belongs to `room`, counting room-less rows between
/// the same two participants.
pub(crate) fn belongs_to_room(message: &Message, room: &RoomId) -> bool {
    match &message.room_id {
        Some(id) => id == room,
        None => {
            room.contains(&message.sender_id)
                && room.counterpart_of(&message.sender_id) == Some(&message.recipient_id)
        }
    }
}
