use db_pool::parse_env_with_default;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Where durable messages live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local store; nothing survives a restart.
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "STORAGE_BACKEND must be postgres or memory, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    /// Interval between server pings on each socket
    pub heartbeat_interval: Duration,
    /// Silence after which a socket is considered dead
    pub client_timeout: Duration,
    pub history_default_limit: i64,
    pub history_max_limit: i64,
    pub max_message_chars: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) => StorageBackend::Postgres,
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL missing".into()));
        }

        let redis_url = env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.len() < 16 {
            return Err(AppError::Config(
                "JWT_SECRET must be at least 16 bytes".into(),
            ));
        }

        let heartbeat_secs: u64 = parse_env_with_default("WS_HEARTBEAT_INTERVAL_SECS", 25);
        let timeout_secs: u64 = parse_env_with_default("WS_CLIENT_TIMEOUT_SECS", 60);
        if heartbeat_secs == 0 || timeout_secs <= heartbeat_secs {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed a non-zero WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let history_max_limit: i64 = parse_env_with_default("HISTORY_MAX_LIMIT", 200_i64).max(1);
        let history_default_limit: i64 =
            parse_env_with_default("HISTORY_DEFAULT_LIMIT", 50_i64).clamp(1, history_max_limit);

        Ok(Self {
            port: parse_env_with_default("PORT", 3000),
            storage,
            database_url,
            redis_url,
            jwt_secret,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            client_timeout: Duration::from_secs(timeout_secs),
            history_default_limit,
            history_max_limit,
            max_message_chars: parse_env_with_default("MAX_MESSAGE_CHARS", 4000),
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            storage: StorageBackend::Memory,
            database_url: None,
            redis_url: None,
            jwt_secret: "test-secret-with-enough-bytes".into(),
            heartbeat_interval: Duration::from_secs(25),
            client_timeout: Duration::from_secs(60),
            history_default_limit: 50,
            history_max_limit: 200,
            max_message_chars: 4000,
        }
    }
}
