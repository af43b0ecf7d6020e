use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use std::collections::HashMap;

use super::{AppendOutcome, ConversationSummary, MessageRepository, StoreError};
use crate::models::{Message, MessageId, UnreadGroup, UserId};
use crate::room::RoomId;

const MESSAGE_COLUMNS: &str =
    "message_id, sender_id, recipient_id, room_id, text, sent_at, is_read, is_sent";

#[derive(Clone)]
pub struct PgMessageRepository {
    db: Pool<Postgres>,
}

impl PgMessageRepository {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{column}: {err}"))
}

fn row_to_message(row: &PgRow) -> Result<Message, StoreError> {
    let message_id: String = row.get("message_id");
    let sender_id: String = row.get("sender_id");
    let recipient_id: String = row.get("recipient_id");
    let room_id: Option<String> = row.get("room_id");

    Ok(Message {
        message_id: MessageId::parse(&message_id).map_err(|e| corrupt("message_id", e))?,
        sender_id: UserId::parse(&sender_id).map_err(|e| corrupt("sender_id", e))?,
        recipient_id: UserId::parse(&recipient_id).map_err(|e| corrupt("recipient_id", e))?,
        room_id: room_id
            .as_deref()
            .map(RoomId::parse)
            .transpose()
            .map_err(|e| corrupt("room_id", e))?,
        text: row.get("text"),
        timestamp: row.get("sent_at"),
        is_read: row.get("is_read"),
        is_sent: row.get("is_sent"),
    })
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: &Message) -> Result<AppendOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO private_messages \
                (message_id, sender_id, recipient_id, room_id, text, sent_at, is_read, is_sent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(message.message_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(message.recipient_id.as_str())
        .bind(message.room_id.as_ref().map(RoomId::as_str))
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(message.is_read)
        .bind(message.is_sent)
        .execute(&self.db)
        .await?;

        Ok(if result.rows_affected() == 0 {
            AppendOutcome::Duplicate
        } else {
            AppendOutcome::Inserted
        })
    }

    async fn history(
        &self,
        room: &RoomId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let (low, high) = room.participants();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM ( \
                SELECT {MESSAGE_COLUMNS}, seq FROM private_messages \
                WHERE room_id = $1 \
                   OR (room_id IS NULL AND ( \
                        (sender_id = $2 AND recipient_id = $3) \
                     OR (sender_id = $3 AND recipient_id = $2))) \
                ORDER BY sent_at DESC, seq DESC \
                LIMIT $4 OFFSET $5 \
             ) page \
             ORDER BY sent_at ASC, seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(room.as_str())
            .bind(low.as_str())
            .bind(high.as_str())
            .bind(limit.max(0))
            .bind(offset.max(0))
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn unread_by_recipient(
        &self,
        recipient: &UserId,
    ) -> Result<Vec<UnreadGroup>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM private_messages \
             WHERE recipient_id = $1 AND is_read = FALSE \
             ORDER BY sent_at ASC, seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(recipient.as_str())
            .fetch_all(&self.db)
            .await?;

        let mut by_sender: HashMap<UserId, Vec<Message>> = HashMap::new();
        for row in &rows {
            let m = row_to_message(row)?;
            by_sender.entry(m.sender_id.clone()).or_default().push(m);
        }

        let mut groups: Vec<UnreadGroup> = by_sender
            .into_iter()
            .filter_map(|(sender, messages)| UnreadGroup::from_messages(sender, messages))
            .collect();
        groups.sort_by(|a, b| b.latest_message_time.cmp(&a.latest_message_time));
        Ok(groups)
    }

    async fn mark_read(&self, recipient: &UserId, sender: &UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE private_messages SET is_read = TRUE \
             WHERE recipient_id = $1 AND sender_id = $2 AND is_read = FALSE",
        )
        .bind(recipient.as_str())
        .bind(sender.as_str())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_read_by_ids(
        &self,
        recipient: &UserId,
        room: &RoomId,
        ids: &[MessageId],
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(counterpart) = room.counterpart_of(recipient) else {
            return Ok(0);
        };
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        let result = sqlx::query(
            "UPDATE private_messages SET is_read = TRUE \
             WHERE recipient_id = $1 \
               AND message_id = ANY($2) \
               AND is_read = FALSE \
               AND (room_id = $3 OR (room_id IS NULL AND sender_id = $4))",
        )
        .bind(recipient.as_str())
        .bind(&ids)
        .bind(room.as_str())
        .bind(counterpart.as_str())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn total_unread(&self, recipient: &UserId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM private_messages \
             WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient.as_str())
        .fetch_one(&self.db)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn contact_summaries(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH mine AS (
                SELECT CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END AS counterpart_id,
                       recipient_id, text, sent_at, seq, is_read
                FROM private_messages
                WHERE sender_id = $1 OR recipient_id = $1
            ),
            latest AS (
                SELECT DISTINCT ON (counterpart_id) counterpart_id, text, sent_at
                FROM mine
                ORDER BY counterpart_id, sent_at DESC, seq DESC
            ),
            unread AS (
                SELECT counterpart_id, COUNT(*)::bigint AS unread_count
                FROM mine
                WHERE recipient_id = $1 AND is_read = FALSE
                GROUP BY counterpart_id
            )
            SELECT l.counterpart_id, l.text, l.sent_at, COALESCE(u.unread_count, 0) AS unread_count
            FROM latest l
            LEFT JOIN unread u USING (counterpart_id)
            ORDER BY l.sent_at DESC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let counterpart: String = row.get("counterpart_id");
                let last_message_time: DateTime<Utc> = row.get("sent_at");
                let unread: i64 = row.get("unread_count");
                Ok(ConversationSummary {
                    counterpart_id: UserId::parse(&counterpart)
                        .map_err(|e| corrupt("counterpart_id", e))?,
                    last_message: row.get("text"),
                    last_message_time,
                    unread_count: u64::try_from(unread).unwrap_or(0),
                })
            })
            .collect()
    }
}
