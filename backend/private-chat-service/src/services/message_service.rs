use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult, ChatError};
use crate::models::{ContactSummary, Message, MessageId, UnreadGroup, UserId};
use crate::presence::PresenceRegistry;
use crate::repository::{AppendOutcome, MessageRepository};
use crate::room::{resolve_room, RoomId};
use crate::services::delivery_service::validate_text;

/// Request body of `POST /messages`, already parsed into typed ids.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: Option<MessageId>,
    pub recipient_id: UserId,
    pub room_id: Option<RoomId>,
    pub text: String,
}

/// Read/write façade over the message store used by the REST surface.
#[derive(Clone)]
pub struct MessageService {
    repository: Arc<dyn MessageRepository>,
    presence: Arc<dyn PresenceRegistry>,
    history_default_limit: i64,
    history_max_limit: i64,
    max_message_chars: usize,
}

impl MessageService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRegistry>,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            repository,
            presence,
            history_default_limit: config.history_default_limit,
            history_max_limit: config.history_max_limit,
            max_message_chars: config.max_message_chars,
        }
    }

    /// Idempotent append on `message_id`; a client retrying the same id
    /// gets `Duplicate` back instead of a second row.
    pub async fn append(
        &self,
        sender: &UserId,
        request: NewMessage,
    ) -> AppResult<(Message, AppendOutcome)> {
        validate_text(&request.text, self.max_message_chars)?;
        let room = resolve_room(sender, &request.recipient_id)?;
        if let Some(claimed) = &request.room_id {
            if claimed != &room {
                return Err(ChatError::validation(format!(
                    "roomId {claimed} does not match the participants"
                ))
                .into());
            }
        }

        let message = Message::new(
            request.message_id.unwrap_or_default(),
            sender.clone(),
            request.recipient_id,
            Some(room),
            request.text,
            Utc::now(),
        );
        let outcome = self.repository.append(&message).await?;
        info!(message_id = %message.message_id, ?outcome, "message appended");
        Ok((message, outcome))
    }

    pub async fn history(
        &self,
        user: &UserId,
        room: &RoomId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> AppResult<Vec<Message>> {
        ensure_participant(user, room)?;
        let limit = limit
            .unwrap_or(self.history_default_limit)
            .clamp(1, self.history_max_limit);
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::BadRequest("offset must not be negative".into()));
        }
        Ok(self.repository.history(room, limit, offset).await?)
    }

    pub async fn unread(&self, user: &UserId) -> AppResult<Vec<UnreadGroup>> {
        Ok(self.repository.unread_by_recipient(user).await?)
    }

    pub async fn unread_count(&self, user: &UserId) -> AppResult<u64> {
        Ok(self.repository.total_unread(user).await?)
    }

    /// Flip specific messages in one room; only rows addressed to `user`
    /// are touched.
    pub async fn mark_read(
        &self,
        user: &UserId,
        room: &RoomId,
        ids: &[MessageId],
    ) -> AppResult<u64> {
        ensure_participant(user, room)?;
        let updated = self.repository.mark_read_by_ids(user, room, ids).await?;
        info!(user_id = %user, room_id = %room, updated, "messages marked read");
        Ok(updated)
    }

    /// Flip every unread message `sender` sent to `user`.
    pub async fn mark_sender_read(&self, user: &UserId, sender: &UserId) -> AppResult<u64> {
        if user == sender {
            return Err(ChatError::SelfConversationNotAllowed.into());
        }
        let updated = self.repository.mark_read(user, sender).await?;
        info!(user_id = %user, sender_id = %sender, updated, "sender marked read");
        Ok(updated)
    }

    /// Conversation list with presence filled in from this process.
    pub async fn contacts(&self, user: &UserId) -> AppResult<Vec<ContactSummary>> {
        let summaries = self.repository.contact_summaries(user).await?;
        let mut contacts = Vec::with_capacity(summaries.len());
        for s in summaries {
            let is_online = self.presence.is_online(&s.counterpart_id).await;
            contacts.push(ContactSummary {
                counterpart_id: s.counterpart_id,
                last_message: s.last_message,
                last_message_time: s.last_message_time,
                unread_count: s.unread_count,
                is_online,
            });
        }
        Ok(contacts)
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.presence.is_online(user).await
    }
}

fn ensure_participant(user: &UserId, room: &RoomId) -> AppResult<()> {
    if room.contains(user) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{user} is not a participant of {room}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::presence::{ConnectionHandle, LocalPresenceRegistry};
    use crate::repository::InMemoryMessageRepository;
    use tokio::sync::mpsc::unbounded_channel;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn service() -> (MessageService, Arc<LocalPresenceRegistry>) {
        let presence = Arc::new(LocalPresenceRegistry::new());
        let repo = Arc::new(InMemoryMessageRepository::new());
        let service = MessageService::new(repo, presence.clone(), &Config::test_defaults());
        (service, presence)
    }

    fn new_message(to: &str, text: &str, id: Option<&str>) -> NewMessage {
        NewMessage {
            message_id: id.map(|id| MessageId::parse(id).unwrap()),
            recipient_id: user(to),
            room_id: None,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn append_is_idempotent_on_message_id() {
        let (svc, _) = service();
        let alice = user("alice");

        let (_, first) = svc
            .append(&alice, new_message("bob", "hi", Some("m-1")))
            .await
            .unwrap();
        let (_, second) = svc
            .append(&alice, new_message("bob", "hi", Some("m-1")))
            .await
            .unwrap();
        assert_eq!(first, AppendOutcome::Inserted);
        assert_eq!(second, AppendOutcome::Duplicate);

        let room = resolve_room(&alice, &user("bob")).unwrap();
        let history = svc.history(&alice, &room, None, None).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn append_validates_input() {
        let (svc, _) = service();
        let alice = user("alice");

        let err = svc.append(&alice, new_message("bob", " ", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Chat(ChatError::EmptyMessage)));

        let err = svc.append(&alice, new_message("alice", "hi", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Chat(ChatError::SelfConversationNotAllowed)));

        let mut wrong_room = new_message("bob", "hi", None);
        wrong_room.room_id = Some(resolve_room(&alice, &user("carol")).unwrap());
        let err = svc.append(&alice, wrong_room).await.unwrap_err();
        assert!(matches!(err, AppError::Chat(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn history_is_limited_to_participants() {
        let (svc, _) = service();
        let room = resolve_room(&user("alice"), &user("bob")).unwrap();

        let err = svc.history(&user("carol"), &room, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = svc
            .history(&user("alice"), &room, None, Some(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn history_limit_is_clamped() {
        let (svc, _) = service();
        let alice = user("alice");
        for i in 0..3 {
            svc.append(&alice, new_message("bob", &format!("m{i}"), None))
                .await
                .unwrap();
        }
        let room = resolve_room(&alice, &user("bob")).unwrap();

        assert_eq!(svc.history(&alice, &room, Some(0), None).await.unwrap().len(), 1);
        assert_eq!(svc.history(&alice, &room, Some(10_000), None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sender_read_flip_updates_counts() {
        let (svc, _) = service();
        let (alice, bob) = (user("alice"), user("bob"));
        svc.append(&alice, new_message("bob", "one", None)).await.unwrap();
        svc.append(&alice, new_message("bob", "two", None)).await.unwrap();

        assert_eq!(svc.unread_count(&bob).await.unwrap(), 2);
        assert_eq!(svc.unread(&bob).await.unwrap()[0].count, 2);

        assert_eq!(svc.mark_sender_read(&bob, &alice).await.unwrap(), 2);
        assert_eq!(svc.mark_sender_read(&bob, &alice).await.unwrap(), 0);
        assert_eq!(svc.unread_count(&bob).await.unwrap(), 0);
        assert!(svc.unread(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn contacts_include_presence() {
        let (svc, presence) = service();
        let alice = user("alice");
        svc.append(&alice, new_message("bob", "hi", None)).await.unwrap();

        let contacts = svc.contacts(&user("bob")).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert!(!contacts[0].is_online);

        let (tx, _rx) = unbounded_channel();
        presence
            .register(alice.clone(), ConnectionHandle { id: uuid::Uuid::new_v4(), tx })
            .await;
        let contacts = svc.contacts(&user("bob")).await.unwrap();
        assert_eq!(contacts[0].counterpart_id, alice);
        assert_eq!(contacts[0].unread_count, 1);
        assert!(contacts[0].is_online);
    }
}
