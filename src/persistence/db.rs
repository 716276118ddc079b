//! `SQLite` connection and schema bootstrap.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::Result;

use super::schema;

/// Alias for the shared `SQLite` pool.
pub type Database = SqlitePool;

/// Connect to the `SQLite` database file, creating it if missing, and apply
/// the schema.
///
/// The file may be shared by multiple service instances; all claim
/// serialization happens in the store, not in process memory.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect(path: impl AsRef<Path>) -> Result<Database> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}

/// Connect to an in-memory database (tests) and apply the schema.
///
/// A single connection keeps the memory database alive and shared across
/// all pool checkouts.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect_memory() -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}
