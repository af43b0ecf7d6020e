//! Postgres pool construction for the chat backend
//!
//! Reads pool sizing from the environment, builds a `sqlx` pool and verifies
//! it with a round trip before handing it to the service.

mod env_utils;

pub use env_utils::{parse_env_optional, parse_env_with_default};

use once_cell::sync::Lazy;
use prometheus::{IntGaugeVec, Opts};
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

static POOL_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new("db_pool_connections", "Connections held by the pool"),
        &["service", "state"],
    )
    .expect("db_pool_connections gauge definition is valid");
    // A second registration (e.g. two pools in one test binary) is harmless.
    let _ = prometheus::default_registry().register(Box::new(gauge.clone()));
    gauge
});

/// Pool settings for one service
#[derive(Clone)]
pub struct DbConfig {
    /// Label used in logs and metrics
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Budget for the verification query after the pool is built
    pub connect_timeout_secs: u64,
    /// Budget for checking a connection out of the pool
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl DbConfig {
    /// Build a config for `service_name` using `database_url` and any
    /// `DB_*` overrides present in the environment.
    pub fn from_env(service_name: &str, database_url: &str) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            database_url: database_url.to_string(),
            max_connections: parse_env_with_default("DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_env_with_default("DB_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_secs: parse_env_with_default(
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            acquire_timeout_secs: parse_env_with_default(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            ),
            idle_timeout_secs: parse_env_with_default(
                "DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout_secs,
            ),
            max_lifetime_secs: parse_env_with_default(
                "DB_MAX_LIFETIME_SECS",
                defaults.max_lifetime_secs,
            ),
        }
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            acquire_timeout_secs = self.acquire_timeout_secs,
            idle_timeout_secs = self.idle_timeout_secs,
            max_lifetime_secs = self.max_lifetime_secs,
            "database pool configuration"
        );
    }
}

/// Build the pool and verify it answers `SELECT 1` within the connect budget.
pub async fn create_pool(config: DbConfig) -> Result<PgPool, sqlx::Error> {
    debug!(service = %config.service_name, "creating database pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await?;

    match tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(Ok(_)) => {
            info!(service = %config.service_name, "database pool created and verified");
            record_pool_metrics(&pool, &config.service_name);

            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    if pool_clone.is_closed() {
                        break;
                    }
                    record_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(service = %config.service_name, error = %e, "database verification failed");
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "database verification timed out"
            );
            Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "database verification timeout",
            )))
        }
    }
}

/// Apply the service's embedded migrations.
pub async fn run_migrations(pool: &PgPool, migrator: &Migrator) -> Result<(), MigrateError> {
    migrator.run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

fn record_pool_metrics(pool: &PgPool, service: &str) {
    let size = i64::from(pool.size());
    let idle = i64::try_from(pool.num_idle()).unwrap_or(i64::MAX);
    POOL_CONNECTIONS.with_label_values(&[service, "total"]).set(size);
    POOL_CONNECTIONS.with_label_values(&[service, "idle"]).set(idle);
    POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set((size - idle).max(0));
}
