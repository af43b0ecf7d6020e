use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{belongs_to_room, AppendOutcome, ConversationSummary, MessageRepository, StoreError};
use crate::models::{Message, MessageId, UnreadGroup, UserId};
use crate::room::RoomId;

#[derive(Default)]
struct Inner {
    /// Insertion order doubles as the tie-break sequence
    rows: Vec<Message>,
    index: HashMap<MessageId, usize>,
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    inner: RwLock<Inner>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }
}

/// Stable sort keeps insertion order among equal timestamps.
fn sorted_by_time(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by_key(|m| m.timestamp);
    messages
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: &Message) -> Result<AppendOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.index.contains_key(&message.message_id) {
            return Ok(AppendOutcome::Duplicate);
        }
        let pos = inner.rows.len();
        inner.index.insert(message.message_id.clone(), pos);
        inner.rows.push(message.clone());
        Ok(AppendOutcome::Inserted)
    }

    async fn history(
        &self,
        room: &RoomId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        let in_room = sorted_by_time(
            inner
                .rows
                .iter()
                .filter(|m| belongs_to_room(m, room))
                .cloned()
                .collect(),
        );

        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let end = in_room.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);
        Ok(in_room[start..end].to_vec())
    }

    async fn unread_by_recipient(
        &self,
        recipient: &UserId,
    ) -> Result<Vec<UnreadGroup>, StoreError> {
        let inner = self.inner.read().await;
        let mut by_sender: HashMap<UserId, Vec<Message>> = HashMap::new();
        for m in inner
            .rows
            .iter()
            .filter(|m| &m.recipient_id == recipient && !m.is_read)
        {
            by_sender
                .entry(m.sender_id.clone())
                .or_default()
                .push(m.clone());
        }

        let mut groups: Vec<UnreadGroup> = by_sender
            .into_iter()
            .filter_map(|(sender, messages)| UnreadGroup::from_messages(sender, messages))
            .collect();
        groups.sort_by(|a, b| b.latest_message_time.cmp(&a.latest_message_time));
        Ok(groups)
    }

    async fn mark_read(&self, recipient: &UserId, sender: &UserId) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for m in inner.rows.iter_mut() {
            if &m.recipient_id == recipient && &m.sender_id == sender && !m.is_read {
                m.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_read_by_ids(
        &self,
        recipient: &UserId,
        room: &RoomId,
        ids: &[MessageId],
    ) -> Result<u64, StoreError> {
        let wanted: HashSet<&MessageId> = ids.iter().collect();
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for m in inner.rows.iter_mut() {
            if wanted.contains(&m.message_id)
                && &m.recipient_id == recipient
                && !m.is_read
                && belongs_to_room(m, room)
            {
                m.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn total_unread(&self, recipient: &UserId) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .iter()
            .filter(|m| &m.recipient_id == recipient && !m.is_read)
            .count() as u64)
    }

    async fn contact_summaries(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let inner = self.inner.read().await;
        let mut summaries: HashMap<UserId, ConversationSummary> = HashMap::new();

        for m in sorted_by_time(inner.rows.clone()) {
            let Some(counterpart) = m.counterpart_of(user).cloned() else {
                continue;
            };
            let unread = u64::from(&m.recipient_id == user && !m.is_read);
            summaries
                .entry(counterpart.clone())
                .and_modify(|s| {
                    s.last_message = m.text.clone();
                    s.last_message_time = m.timestamp;
                    s.unread_count += unread;
                })
                .or_insert(ConversationSummary {
                    counterpart_id: counterpart,
                    last_message: m.text.clone(),
                    last_message_time: m.timestamp,
                    unread_count: unread,
                });
        }

        let mut out: Vec<_> = summaries.into_values().collect();
        out.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(out)
    }
}
