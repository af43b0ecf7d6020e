use std::collections::{BTreeMap, HashSet};

use crate::models::{Message, MessageId, UnreadGroup, UserId};

/// `PUT /mark-sender-read/:user_id`, to be fired after the badge cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkSenderRead {
    pub sender_id: UserId,
}

impl MarkSenderRead {
    pub fn path(&self) -> String {
        format!("/mark-sender-read/{}", self.sender_id)
    }
}

/// Unread badges per counterpart for one signed-in user.
///
/// Clearing a badge remembers the exact message ids it covered, so a server
/// reload that races the mark-read request cannot bring them back. An id is
/// forgotten once a reload stops listing it.
pub struct UnreadBadges {
    me: UserId,
    unread: BTreeMap<UserId, HashSet<MessageId>>,
    cleared: HashSet<MessageId>,
}

impl UnreadBadges {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            unread: BTreeMap::new(),
            cleared: HashSet::new(),
        }
    }

    fn track(&mut self, message: &Message) {
        if message.recipient_id != self.me
            || message.is_read
            || self.cleared.contains(&message.message_id)
        {
            return;
        }
        self.unread
            .entry(message.sender_id.clone())
            .or_default()
            .insert(message.message_id.clone());
    }

    /// Replace badges with the grouped `GET /unread-messages` result.
    pub fn apply_unread(&mut self, groups: &[UnreadGroup]) {
        let listed: HashSet<&MessageId> = groups
            .iter()
            .flat_map(|g| g.messages.iter())
            .map(|m| &m.message_id)
            .collect();
        self.cleared.retain(|id| listed.contains(id));

        self.unread.clear();
        for message in groups.iter().flat_map(|g| g.messages.iter()) {
            self.track(message);
        }
    }

    /// A live message; only ones addressed to this user count.
    pub fn record_incoming(&mut self, message: &Message) {
        self.track(message);
    }

    pub fn count_for(&self, counterpart: &UserId) -> usize {
        self.unread.get(counterpart).map_or(0, HashSet::len)
    }

    pub fn total(&self) -> usize {
        self.unread.values().map(HashSet::len).sum()
    }

    /// Counterparts with a non-zero badge, in id order.
    pub fn senders(&self) -> impl Iterator<Item = (&UserId, usize)> {
        self.unread
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(user, ids)| (user, ids.len()))
    }

    /// Zero the badge now and hand back the request that makes it durable.
    pub fn mark_read(&mut self, counterpart: &UserId) -> MarkSenderRead {
        if let Some(ids) = self.unread.remove(counterpart) {
            self.cleared.extend(ids);
        }
        MarkSenderRead {
            sender_id: counterpart.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    fn incoming(id: &str, from: &str, secs: i64) -> Message {
        Message::new(
            MessageId::parse(id).unwrap(),
            user(from),
            user("bob"),
            None,
            "hey".into(),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(secs),
        )
    }

    #[test]
    fn badges_group_by_sender_and_dedupe() {
        let mut badges = UnreadBadges::new(user("bob"));
        let group = UnreadGroup::from_messages(
            user("alice"),
            vec![incoming("1", "alice", 1), incoming("2", "alice", 2)],
        )
        .unwrap();
        badges.apply_unread(&[group]);
        badges.record_incoming(&incoming("2", "alice", 2));
        badges.record_incoming(&incoming("3", "carol", 3));

        assert_eq!(badges.count_for(&user("alice")), 2);
        assert_eq!(badges.count_for(&user("carol")), 1);
        assert_eq!(badges.total(), 3);
        assert_eq!(
            badges.senders().collect::<Vec<_>>(),
            [(&user("alice"), 2), (&user("carol"), 1)]
        );
    }

    #[test]
    fn own_and_read_messages_do_not_count() {
        let mut badges = UnreadBadges::new(user("bob"));
        let mut read = incoming("1", "alice", 1);
        read.is_read = true;
        badges.record_incoming(&read);

        let mut outgoing = incoming("2", "alice", 2);
        std::mem::swap(&mut outgoing.sender_id, &mut outgoing.recipient_id);
        badges.record_incoming(&outgoing);

        assert_eq!(badges.total(), 0);
    }

    #[test]
    fn mark_read_clears_locally_and_survives_stale_reload() {
        let mut badges = UnreadBadges::new(user("bob"));
        badges.record_incoming(&incoming("1", "alice", 1));
        badges.record_incoming(&incoming("2", "alice", 2));

        let request = badges.mark_read(&user("alice"));
        assert_eq!(request.path(), "/mark-sender-read/alice");
        assert_eq!(badges.count_for(&user("alice")), 0);

        // Reload fetched before the server applied the flip.
        let stale = UnreadGroup::from_messages(
            user("alice"),
            vec![incoming("1", "alice", 1), incoming("2", "alice", 2)],
        )
        .unwrap();
        badges.apply_unread(&[stale]);
        assert_eq!(badges.count_for(&user("alice")), 0);

        badges.record_incoming(&incoming("3", "alice", 3));
        assert_eq!(badges.count_for(&user("alice")), 1);
    }

    #[test]
    fn same_instant_message_after_clear_still_counts() {
        let mut badges = UnreadBadges::new(user("bob"));
        badges.record_incoming(&incoming("1", "alice", 5));
        badges.mark_read(&user("alice"));

        // Stored after the flip, but stamped with the same instant.
        let later = UnreadGroup::from_messages(user("alice"), vec![incoming("2", "alice", 5)])
            .unwrap();
        badges.apply_unread(&[later.clone()]);
        assert_eq!(badges.count_for(&user("alice")), 1);
        badges.apply_unread(&[later]);
        assert_eq!(badges.count_for(&user("alice")), 1);
    }

    #[test]
    fn cleared_ids_are_forgotten_once_the_server_drops_them() {
        let mut badges = UnreadBadges::new(user("bob"));
        badges.record_incoming(&incoming("1", "alice", 1));
        badges.mark_read(&user("alice"));

        badges.apply_unread(&[]);
        // An older message from a skewed clock is not masked by the clear.
        let skewed = UnreadGroup::from_messages(user("alice"), vec![incoming("0", "alice", -60)])
            .unwrap();
        badges.apply_unread(&[skewed]);
        assert_eq!(badges.count_for(&user("alice")), 1);
    }
}
