use std::{str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parse database url {database_url}"))?;
    open(options, max_connections).await
}

/// WAL lets readers run beside the single writer; writers queue on the busy timeout
/// instead of failing straight away.
async fn open(options: SqliteConnectOptions, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = options
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let db = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .context("connect to database")?;
    info!(max_connections, "database pool ready");
    Ok(db)
}

pub async fn migrate(db: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
/// The connection is never recycled, otherwise the data would vanish with it.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url parses")
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");
    migrate(&db).await.expect("migrations apply");
    db
}

/// On-disk database shared by several connections, for tests where requests really overlap.
#[cfg(test)]
pub async fn file_pool(path: &std::path::Path, max_connections: u32) -> SqlitePool {
    let db = open(SqliteConnectOptions::new().filename(path), max_connections)
        .await
        .expect("file-backed sqlite");
    migrate(&db).await.expect("migrations apply");
    db
}
