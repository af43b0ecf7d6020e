use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::middleware::auth::JwtKeys;
use crate::presence::PresenceRegistry;
use crate::repository::MessageRepository;
use crate::services::{DeliveryService, MessageService, PersistenceWriter, SessionService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub sessions: SessionService,
    pub delivery: DeliveryService,
    pub messages: MessageService,
}

impl AppState {
    /// Wire services together and start the persistence writer. The handle
    /// completes once every state clone is dropped and the queue drains.
    pub fn build(
        config: Arc<Config>,
        repository: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRegistry>,
    ) -> (Self, JoinHandle<()>) {
        let (writer, writer_task) = PersistenceWriter::spawn(repository.clone());
        let state = Self {
            jwt: Arc::new(JwtKeys::from_secret(&config.jwt_secret)),
            sessions: SessionService::new(presence.clone()),
            delivery: DeliveryService::new(presence.clone(), writer, config.max_message_chars),
            messages: MessageService::new(repository, presence.clone(), &config),
            presence,
            config,
        };
        (state, writer_task)
    }
}
