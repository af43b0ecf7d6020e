use db_pool::{create_pool as create_pg_pool, run_migrations, DbConfig};
use sqlx::migrate::Migrator;
use sqlx::{Pool, Postgres};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Build the verified pool and bring the schema up to date.
pub async fn init_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    let cfg = DbConfig::from_env("private-chat-service", database_url);
    cfg.log_config();
    let pool = create_pg_pool(cfg).await?;
    run_migrations(&pool, &MIGRATOR).await?;
    Ok(pool)
}
