use crate::config::Config;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use std::time::Duration;

static SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Opens the connection pool described by `config`.
pub async fn connect(config: &Config) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.database_url.to_owned());
    opt.max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect_timeout(Duration::from_secs(1))
        .idle_timeout(Duration::from_secs(60))
        .sqlx_logging(config.sql_logging);

    Database::connect(opt).await
}

/// Creates any missing relations, indexes and constraints. Safe to re-run.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    log::info!("applying database schema");
    db.execute_unprepared(SCHEMA).await?;
    Ok(())
}
