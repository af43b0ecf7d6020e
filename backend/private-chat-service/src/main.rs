use private_chat_service::{
    config::{self, StorageBackend},
    db, error, logging,
    presence::{LocalPresenceRegistry, PresenceRegistry},
    repository::{InMemoryMessageRepository, MessageRepository, PgMessageRepository},
    routes,
    state::AppState,
    websocket::pubsub::FanoutRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let repository: Arc<dyn MessageRepository> = match cfg.storage {
        StorageBackend::Postgres => {
            let url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            // Pool creation also applies embedded migrations (idempotent)
            let db = db::init_pool(url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            Arc::new(PgMessageRepository::new(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("STORAGE_BACKEND=memory; messages will not survive a restart");
            Arc::new(InMemoryMessageRepository::new())
        }
    };

    let local: Arc<dyn PresenceRegistry> = Arc::new(LocalPresenceRegistry::new());
    let presence: Arc<dyn PresenceRegistry> = match cfg.redis_url.as_deref() {
        Some(url) => {
            let client = redis::Client::open(url)?;
            let (fanout, _publisher, _listener) = FanoutRegistry::start(client, local)
                .await
                .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;
            Arc::new(fanout)
        }
        None => {
            tracing::info!("REDIS_URL not set; presence is local to this instance");
            local
        }
    };

    let (state, writer_task) = AppState::build(cfg.clone(), repository, presence);
    let app = routes::build_router(&state).with_state(state);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?;
    tracing::info!(%bind_addr, storage = ?cfg.storage, "starting private-chat-service");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    // Give the writer a moment to store whatever is still queued.
    if tokio::time::timeout(Duration::from_secs(5), writer_task)
        .await
        .is_err()
    {
        tracing::warn!("persistence writer still busy at shutdown");
    }

    Ok(())
}
