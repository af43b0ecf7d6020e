use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ConnectionHandle, ConnectionId, Departure, PresenceRegistry};
use crate::models::UserId;
use crate::room::RoomId;
use crate::websocket::message_types::ServerEvent;

struct Connection {
    user: UserId,
    handle: ConnectionHandle,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    users: HashMap<UserId, HashSet<ConnectionId>>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl Inner {
    fn deliver(&self, id: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(&id) {
            Some(conn) => {
                let ok = conn.handle.tx.send(event).is_ok();
                if !ok {
                    // Receiver is gone; the connection task unregisters on exit.
                    debug!(connection_id = %id, "skipping closed connection");
                }
                ok
            }
            None => false,
        }
    }
}

/// Single-process registry. Every map sits behind one lock so join, leave
/// and broadcast always observe the same membership.
#[derive(Default, Clone)]
pub struct LocalPresenceRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl LocalPresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl LocalPresenceRegistry {
    pub(crate) async fn connections_for(&self, user: &UserId) -> Vec<ConnectionId> {
        self.inner
            .read()
            .await
            .users
            .get(user)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) async fn is_member(&self, connection: ConnectionId, room: &RoomId) -> bool {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&connection))
    }

    pub(crate) async fn room_members(&self, room: &RoomId) -> Vec<(ConnectionId, UserId)> {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| guard.connections.get(id).map(|c| (*id, c.user.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl PresenceRegistry for LocalPresenceRegistry {
    async fn register(&self, user: UserId, handle: ConnectionHandle) {
        let mut guard = self.inner.write().await;
        let id = handle.id;
        guard.users.entry(user.clone()).or_default().insert(id);
        guard.connections.insert(
            id,
            Connection {
                user,
                handle,
                rooms: HashSet::new(),
            },
        );
    }

    async fn unregister(&self, connection: ConnectionId) -> Option<Departure> {
        let mut guard = self.inner.write().await;
        let conn = guard.connections.remove(&connection)?;

        for room in &conn.rooms {
            if let Some(members) = guard.rooms.get_mut(room) {
                members.remove(&connection);
                if members.is_empty() {
                    guard.rooms.remove(room);
                }
            }
        }

        let mut user_offline = true;
        if let Some(ids) = guard.users.get_mut(&conn.user) {
            ids.remove(&connection);
            user_offline = ids.is_empty();
            if user_offline {
                guard.users.remove(&conn.user);
            }
        }

        let mut rooms: Vec<RoomId> = conn.rooms.into_iter().collect();
        rooms.sort();
        Some(Departure {
            user: conn.user,
            rooms,
            user_offline,
        })
    }

    async fn is_online(&self, user: &UserId) -> bool {
        self.inner
            .read()
            .await
            .users
            .get(user)
            .is_some_and(|ids| !ids.is_empty())
    }

    async fn join_room(&self, connection: ConnectionId, room: &RoomId) -> bool {
        let mut guard = self.inner.write().await;
        let Some(conn) = guard.connections.get_mut(&connection) else {
            return false;
        };
        if !conn.rooms.insert(room.clone()) {
            return false;
        }
        guard.rooms.entry(room.clone()).or_default().insert(connection);
        true
    }

    async fn leave_room(&self, connection: ConnectionId, room: &RoomId) -> bool {
        let mut guard = self.inner.write().await;
        let was_member = guard
            .connections
            .get_mut(&connection)
            .is_some_and(|conn| conn.rooms.remove(room));
        if let Some(members) = guard.rooms.get_mut(room) {
            members.remove(&connection);
            if members.is_empty() {
                guard.rooms.remove(room);
            }
        }
        was_member
    }

    async fn auto_join(&self, user: &UserId, room: &RoomId, notice: ServerEvent) -> usize {
        let mut guard = self.inner.write().await;
        let Some(ids) = guard.users.get(user) else {
            return 0;
        };
        let ids: Vec<ConnectionId> = ids.iter().copied().collect();
        let mut joined = Vec::new();
        for id in ids {
            if let Some(conn) = guard.connections.get_mut(&id) {
                if conn.rooms.insert(room.clone()) {
                    joined.push(id);
                }
            }
        }
        if joined.is_empty() {
            return 0;
        }
        guard.rooms.entry(room.clone()).or_default().extend(joined.iter().copied());
        for id in &joined {
            guard.deliver(*id, notice.clone());
        }
        joined.len()
    }

    async fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        self.inner.read().await.deliver(connection, event)
    }

    async fn send_to_user(&self, user: &UserId, event: ServerEvent) -> usize {
        let guard = self.inner.read().await;
        let Some(ids) = guard.users.get(user) else {
            return 0;
        };
        ids.iter()
            .filter(|id| guard.deliver(**id, event.clone()))
            .count()
    }

    async fn broadcast_to_room(
        &self,
        room: &RoomId,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let guard = self.inner.read().await;
        let Some(members) = guard.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|id| Some(**id) != except)
            .filter(|id| guard.deliver(**id, event.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::resolve_room;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use uuid::Uuid;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).unwrap()
    }

    async fn connect(
        registry: &LocalPresenceRegistry,
        who: &str,
    ) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = unbounded_channel();
        let id = Uuid::new_v4();
        registry
            .register(user(who), ConnectionHandle { id, tx })
            .await;
        (id, rx)
    }

    fn online(who: &str, is_online: bool) -> ServerEvent {
        ServerEvent::UserOnlineStatus {
            user_id: user(who),
            is_online,
        }
    }

    #[tokio::test]
    async fn last_connection_gone_means_offline() {
        let registry = LocalPresenceRegistry::new();
        let (c1, _rx1) = connect(&registry, "alice").await;
        let (c2, _rx2) = connect(&registry, "alice").await;
        assert!(registry.is_online(&user("alice")).await);
        assert_eq!(registry.connections_for(&user("alice")).await.len(), 2);

        let first = registry.unregister(c1).await.unwrap();
        assert!(!first.user_offline);
        assert!(registry.is_online(&user("alice")).await);

        let last = registry.unregister(c2).await.unwrap();
        assert!(last.user_offline);
        assert!(!registry.is_online(&user("alice")).await);
        assert!(registry.unregister(c2).await.is_none());
    }

    #[tokio::test]
    async fn unregister_leaves_every_room() {
        let registry = LocalPresenceRegistry::new();
        let (alice, _rx) = connect(&registry, "alice").await;
        let ab = resolve_room(&user("alice"), &user("bob")).unwrap();
        let ac = resolve_room(&user("alice"), &user("carol")).unwrap();

        assert!(registry.join_room(alice, &ab).await);
        assert!(!registry.join_room(alice, &ab).await);
        assert!(registry.join_room(alice, &ac).await);

        let departure = registry.unregister(alice).await.unwrap();
        assert_eq!(departure.rooms, vec![ab.clone(), ac.clone()]);
        assert!(registry.room_members(&ab).await.is_empty());
        assert!(!registry.is_member(alice, &ac).await);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_connection() {
        let registry = LocalPresenceRegistry::new();
        let (alice, mut alice_rx) = connect(&registry, "alice").await;
        let (bob, mut bob_rx) = connect(&registry, "bob").await;
        let room = resolve_room(&user("alice"), &user("bob")).unwrap();
        registry.join_room(alice, &room).await;
        registry.join_room(bob, &room).await;

        let sent = registry
            .broadcast_to_room(&room, online("alice", true), Some(alice))
            .await;
        assert_eq!(sent, 1);
        assert_eq!(bob_rx.recv().await, Some(online("alice", true)));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_receivers_are_skipped() {
        let registry = LocalPresenceRegistry::new();
        let (bob, bob_rx) = connect(&registry, "bob").await;
        drop(bob_rx);

        assert!(!registry.send_to_connection(bob, online("x", true)).await);
        assert_eq!(registry.send_to_user(&user("bob"), online("x", true)).await, 0);
        assert_eq!(registry.send_to_user(&user("nobody"), online("x", true)).await, 0);
    }

    #[tokio::test]
    async fn leave_room_reports_membership() {
        let registry = LocalPresenceRegistry::new();
        let (alice, _rx) = connect(&registry, "alice").await;
        let room = resolve_room(&user("alice"), &user("bob")).unwrap();

        assert!(!registry.leave_room(alice, &room).await);
        registry.join_room(alice, &room).await;
        assert_eq!(
            registry.room_members(&room).await,
            vec![(alice, user("alice"))]
        );
        assert!(registry.leave_room(alice, &room).await);
        assert!(!registry.is_member(alice, &room).await);
    }

    #[tokio::test]
    async fn unknown_connection_cannot_join() {
        let registry = LocalPresenceRegistry::new();
        let room = resolve_room(&user("alice"), &user("bob")).unwrap();
        assert!(!registry.join_room(Uuid::new_v4(), &room).await);
        assert!(registry.room_members(&room).await.is_empty());
    }

    #[tokio::test]
    async fn auto_join_only_notifies_new_members() {
        let registry = LocalPresenceRegistry::new();
        let (tab1, mut rx1) = connect(&registry, "bob").await;
        let (tab2, mut rx2) = connect(&registry, "bob").await;
        let room = resolve_room(&user("alice"), &user("bob")).unwrap();
        registry.join_room(tab1, &room).await;

        let joined = registry
            .auto_join(&user("bob"), &room, online("alice", true))
            .await;
        assert_eq!(joined, 1);
        assert!(registry.is_member(tab2, &room).await);
        assert_eq!(rx2.recv().await, Some(online("alice", true)));
        assert!(rx1.try_recv().is_err());

        assert_eq!(
            registry
                .auto_join(&user("bob"), &room, online("alice", true))
                .await,
            0
        );
        assert_eq!(
            registry
                .auto_join(&user("nobody"), &room, online("alice", true))
                .await,
            0
        );
    }
}
