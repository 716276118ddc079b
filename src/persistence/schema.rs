//! `SQLite` schema bootstrap logic.
//!
//! The single table definition uses `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the port pool table definition to the connected database.
///
/// A row is either fully free (`kind`, `session_id`, `locked_at` all NULL)
/// or fully claimed. `UNIQUE(session_id, kind)` holds the one-port-per-kind
/// invariant for claimed rows; `SQLite` treats NULLs as distinct, so free
/// rows never collide.
///
/// # Errors
///
/// Returns `AppError::Db` if the DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS recording_port (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    value       INTEGER NOT NULL,
    kind        TEXT,
    session_id  TEXT,
    locked_at   TEXT,
    CONSTRAINT value_unique UNIQUE (value),
    CONSTRAINT kind_of_session_unique UNIQUE (session_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_recording_port_session ON recording_port(session_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
