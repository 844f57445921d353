//! Database initialization and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup uses this module to open the shared SQLx pool and apply schema
//! migrations before accepting websocket/API traffic. Failure here is the one
//! fatal error path of the service.

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::services::persistence::env_parse;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://huddle.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Open the `SQLite` pool (creating the file if needed) and run migrations.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the connection fails, or a
/// migration fails.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS))
        .connect_with(options)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied.
///
/// An in-memory `SQLite` database lives and dies with its connection, so the
/// pool is pinned to exactly one connection that never expires.
#[cfg(test)]
pub async fn init_memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should open");
    sqlx::migrate!("src/db/migrations")
        .run(&pool)
        .await
        .expect("migrations should apply");
    pool
}
