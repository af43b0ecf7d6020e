use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::models::{Message, MessageId, UnreadGroup, UserId};
use crate::room::{resolve_room, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Local echo created at send time
    Optimistic,
    /// `new-private-message` / `private-chat-auto-joined`
    Live,
    /// History and unread loads
    Persisted,
}

#[derive(Default)]
struct RoomState {
    optimistic: HashMap<MessageId, Message>,
    live: HashMap<MessageId, Message>,
    persisted: HashMap<MessageId, Message>,
    /// Read flips made locally; read state never goes back to unread
    read_locally: HashSet<MessageId>,
    /// First arrival order across every source, used to break timestamp ties
    first_seen: HashMap<MessageId, u64>,
    view: Vec<Message>,
}

impl RoomState {
    fn source_mut(&mut self, source: Source) -> &mut HashMap<MessageId, Message> {
        match source {
            Source::Optimistic => &mut self.optimistic,
            Source::Live => &mut self.live,
            Source::Persisted => &mut self.persisted,
        }
    }

    /// Full rebuild from the three sources. Later sources override content;
    /// `is_read` and `is_sent` are OR-merged so neither flag regresses.
    fn recompute(&mut self) {
        let mut merged: HashMap<&MessageId, Message> = HashMap::new();
        for source in [&self.optimistic, &self.live, &self.persisted] {
            for (id, message) in source {
                match merged.get_mut(id) {
                    Some(current) => {
                        let is_read = current.is_read || message.is_read;
                        let is_sent = current.is_sent || message.is_sent;
                        *current = message.clone();
                        current.is_read = is_read;
                        current.is_sent = is_sent;
                    }
                    None => {
                        merged.insert(id, message.clone());
                    }
                }
            }
        }

        let mut view: Vec<Message> = merged
            .into_values()
            .map(|mut m| {
                m.is_read |= self.read_locally.contains(&m.message_id);
                m
            })
            .collect();
        let first_seen = &self.first_seen;
        view.sort_by_key(|m| {
            (
                m.timestamp,
                first_seen.get(&m.message_id).copied().unwrap_or(u64::MAX),
            )
        });
        self.view = view;
    }
}

/// Per-room merged view of everything a client has seen.
///
/// Each mutation records into one source set and recomputes the room's view
/// from scratch, so the view is always the dedup-by-`messageId` union sorted
/// by `(timestamp, first arrival)`.
#[derive(Default)]
pub struct ConversationStore {
    rooms: HashMap<RoomId, RoomState>,
    arrivals: u64,
}

fn room_of(message: &Message) -> Option<RoomId> {
    match &message.room_id {
        Some(room) => Some(room.clone()),
        None => resolve_room(&message.sender_id, &message.recipient_id).ok(),
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, source: Source, message: Message) -> Option<RoomId> {
        let room = room_of(&message)?;
        let seq = self.arrivals;
        let state = self.rooms.entry(room.clone()).or_default();
        if !state.first_seen.contains_key(&message.message_id) {
            state.first_seen.insert(message.message_id.clone(), seq);
            self.arrivals += 1;
        }
        state
            .source_mut(source)
            .insert(message.message_id.clone(), message);
        Some(room)
    }

    fn refresh(&mut self, room: &RoomId) {
        if let Some(state) = self.rooms.get_mut(room) {
            state.recompute();
        }
    }

    /// Local echo shown before the server has seen the message.
    pub fn record_local_send(&mut self, message: Message) {
        if let Some(room) = self.record(Source::Optimistic, message) {
            self.refresh(&room);
        }
    }

    /// Apply `message-sent`: the echo becomes sent and adopts the server
    /// timestamp. Returns `false` for an unknown id.
    pub fn acknowledge(
        &mut self,
        room: &RoomId,
        message_id: &MessageId,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let Some(state) = self.rooms.get_mut(room) else {
            return false;
        };
        let Some(echo) = state.optimistic.get_mut(message_id) else {
            return false;
        };
        echo.is_sent = true;
        echo.timestamp = timestamp;
        state.recompute();
        true
    }

    /// A message pushed over the socket.
    pub fn apply_live(&mut self, message: Message) {
        if let Some(room) = self.record(Source::Live, message) {
            self.refresh(&room);
        }
    }

    /// Merge a page returned by the history endpoint. Live and local copies
    /// the page does not mention stay; they may simply not be stored yet.
    pub fn apply_history(&mut self, room: &RoomId, page: Vec<Message>) {
        for message in page {
            if room_of(&message).as_ref() == Some(room) {
                self.record(Source::Persisted, message);
            }
        }
        self.rooms.entry(room.clone()).or_default().recompute();
    }

    /// Merge the grouped unread load; each message lands in its own room.
    pub fn apply_unread(&mut self, groups: &[UnreadGroup]) {
        let mut touched = HashSet::new();
        for message in groups.iter().flat_map(|g| g.messages.iter()) {
            if let Some(room) = self.record(Source::Persisted, message.clone()) {
                touched.insert(room);
            }
        }
        for room in touched {
            self.refresh(&room);
        }
    }

    /// Flip every message `reader` received in `room` to read, locally.
    pub fn mark_room_read(&mut self, room: &RoomId, reader: &UserId) -> usize {
        let Some(state) = self.rooms.get_mut(room) else {
            return 0;
        };
        let newly_read: Vec<MessageId> = state
            .view
            .iter()
            .filter(|m| &m.recipient_id == reader && !m.is_read)
            .map(|m| m.message_id.clone())
            .collect();
        let count = newly_read.len();
        state.read_locally.extend(newly_read);
        state.recompute();
        count
    }

    /// Ordered, deduplicated view of one room.
    pub fn messages(&self, room: &RoomId) -> &[Message] {
        self.rooms
            .get(room)
            .map(|s| s.view.as_slice())
            .unwrap_or(&[])
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }
}
