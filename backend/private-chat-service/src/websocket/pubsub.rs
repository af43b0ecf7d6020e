//! Cross-instance fanout over Redis pub/sub.
//!
//! [`FanoutRegistry`] wraps the local registry: room broadcasts and
//! user-directed sends are delivered locally as usual and also published,
//! tagged with this instance's id. The listener replays events published by
//! other instances to local connections only, so nothing loops back.
//!
//! Auto-joins travel on the target user's channel ahead of the room
//! broadcast, so the instance holding the recipient joins it before the
//! message arrives.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::UserId;
use crate::presence::{ConnectionHandle, ConnectionId, Departure, PresenceRegistry};
use crate::room::RoomId;
use crate::websocket::message_types::ServerEvent;

const ROOM_PREFIX: &str = "private-chat:room:";
const USER_PREFIX: &str = "private-chat:user:";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    origin: Uuid,
    /// Set on user-channel events that join the user to a room first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join: Option<RoomId>,
    event: ServerEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Room(RoomId),
    User(UserId),
}

impl Target {
    fn channel(&self) -> String {
        match self {
            Target::Room(room) => format!("{ROOM_PREFIX}{room}"),
            Target::User(user) => format!("{USER_PREFIX}{user}"),
        }
    }

    fn from_channel(channel: &str) -> Option<Self> {
        if let Some(room) = channel.strip_prefix(ROOM_PREFIX) {
            return RoomId::parse(room).ok().map(Target::Room);
        }
        channel
            .strip_prefix(USER_PREFIX)
            .and_then(|user| UserId::parse(user).ok())
            .map(Target::User)
    }
}

pub struct FanoutRegistry {
    local: Arc<dyn PresenceRegistry>,
    instance_id: Uuid,
    outbox: UnboundedSender<(String, String)>,
}

impl FanoutRegistry {
    /// Connect to Redis and start the publisher and listener tasks.
    pub async fn start(
        client: Client,
        local: Arc<dyn PresenceRegistry>,
    ) -> redis::RedisResult<(Self, JoinHandle<()>, JoinHandle<()>)> {
        let instance_id = Uuid::new_v4();
        let manager = ConnectionManager::new(client.clone()).await?;
        let (outbox, rx) = unbounded_channel();

        let publisher = tokio::spawn(run_publisher(manager, rx));
        let listener = {
            let local = local.clone();
            tokio::spawn(async move {
                if let Err(e) = run_listener(client, local, instance_id).await {
                    error!(error = %e, "redis fanout listener failed");
                }
            })
        };
        info!(%instance_id, "redis fanout enabled");

        Ok((
            Self {
                local,
                instance_id,
                outbox,
            },
            publisher,
            listener,
        ))
    }

    fn publish(&self, target: Target, join: Option<RoomId>, event: ServerEvent) {
        let envelope = Envelope {
            origin: self.instance_id,
            join,
            event,
        };
        match serde_json::to_string(&envelope) {
            Ok(payload) => {
                if self.outbox.send((target.channel(), payload)).is_err() {
                    warn!("redis publisher stopped; event not fanned out");
                }
            }
            Err(e) => error!(error = %e, "failed to encode fanout envelope"),
        }
    }
}

async fn run_publisher(
    mut conn: ConnectionManager,
    mut rx: UnboundedReceiver<(String, String)>,
) {
    while let Some((channel, payload)) = rx.recv().await {
        if let Err(e) = conn.publish::<_, _, ()>(&channel, payload).await {
            warn!(%channel, error = %e, "redis publish failed");
        }
    }
}

async fn run_listener(
    client: Client,
    local: Arc<dyn PresenceRegistry>,
    instance_id: Uuid,
) -> redis::RedisResult<()> {
    // PubSub requires a dedicated connection, not multiplexed
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(format!("{ROOM_PREFIX}*")).await?;
    pubsub.psubscribe(format!("{USER_PREFIX}*")).await?;
    let mut stream = pubsub.on_message();

    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%channel, error = %e, "unreadable fanout payload");
                continue;
            }
        };
        let Some(target) = Target::from_channel(&channel) else {
            debug!(%channel, "ignoring unknown fanout channel");
            continue;
        };
        let envelope: Envelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%channel, error = %e, "malformed fanout envelope");
                continue;
            }
        };
        if envelope.origin == instance_id {
            continue;
        }

        replay(local.as_ref(), target, envelope).await;
    }
    Ok(())
}

/// Apply an event from another instance to local connections.
async fn replay(local: &dyn PresenceRegistry, target: Target, envelope: Envelope) -> usize {
    match (target, envelope.join) {
        (Target::Room(room), _) => local.broadcast_to_room(&room, envelope.event, None).await,
        (Target::User(user), Some(room)) => local.auto_join(&user, &room, envelope.event).await,
        (Target::User(user), None) => local.send_to_user(&user, envelope.event).await,
    }
}

#[async_trait]
impl PresenceRegistry for FanoutRegistry {
    async fn register(&self, user: UserId, handle: ConnectionHandle) {
        self.local.register(user, handle).await
    }

    async fn unregister(&self, connection: ConnectionId) -> Option<Departure> {
        self.local.unregister(connection).await
    }

    async fn is_online(&self, user: &UserId) -> bool {
        self.local.is_online(user).await
    }

    async fn join_room(&self, connection: ConnectionId, room: &RoomId) -> bool {
        self.local.join_room(connection, room).await
    }

    async fn leave_room(&self, connection: ConnectionId, room: &RoomId) -> bool {
        self.local.leave_room(connection, room).await
    }

    async fn auto_join(&self, user: &UserId, room: &RoomId, notice: ServerEvent) -> usize {
        let joined = self.local.auto_join(user, room, notice.clone()).await;
        self.publish(Target::User(user.clone()), Some(room.clone()), notice);
        joined
    }

    async fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        self.local.send_to_connection(connection, event).await
    }

    async fn send_to_user(&self, user: &UserId, event: ServerEvent) -> usize {
        let delivered = self.local.send_to_user(user, event.clone()).await;
        self.publish(Target::User(user.clone()), None, event);
        delivered
    }

    async fn broadcast_to_room(
        &self,
        room: &RoomId,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let delivered = self.local.broadcast_to_room(room, event.clone(), except).await;
        self.publish(Target::Room(room.clone()), None, event);
        delivered
    }
}
