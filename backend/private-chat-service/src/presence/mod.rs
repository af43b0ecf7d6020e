//! Who is connected, and which connections sit in which rooms.
//!
//! State is process-local and never persisted; a reconnect always redoes the
//! handshake. Protocol code only talks to the [`PresenceRegistry`] trait so a
//! shared backplane can be layered on without touching it.

mod local;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::UserId;
use crate::room::RoomId;
use crate::websocket::message_types::ServerEvent;

pub use local::LocalPresenceRegistry;

pub type ConnectionId = Uuid;

/// Outbound side of one live socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub tx: UnboundedSender<ServerEvent>,
}

/// What `unregister` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user: UserId,
    /// Rooms the connection had joined
    pub rooms: Vec<RoomId>,
    /// True when this was the user's last connection
    pub user_offline: bool,
}

#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    async fn register(&self, user: UserId, handle: ConnectionHandle);

    /// Remove the connection from its user and every room. `None` when the
    /// connection was not registered.
    async fn unregister(&self, connection: ConnectionId) -> Option<Departure>;

    async fn is_online(&self, user: &UserId) -> bool;

    /// Returns `true` when the connection was newly added.
    async fn join_room(&self, connection: ConnectionId, room: &RoomId) -> bool;

    /// Returns `true` when the connection was a member.
    async fn leave_room(&self, connection: ConnectionId, room: &RoomId) -> bool;

    /// Join every connection of `user` that is not yet in `room` and send
    /// `notice` to each of them. Returns how many were joined.
    async fn auto_join(&self, user: &UserId, room: &RoomId, notice: ServerEvent) -> usize;

    async fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool;

    /// Send to every connection of `user`; returns how many accepted it.
    async fn send_to_user(&self, user: &UserId, event: ServerEvent) -> usize;

    /// Send to every connection in `room` except `except`; returns how many
    /// accepted it.
    async fn broadcast_to_room(
        &self,
        room: &RoomId,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize;
}
