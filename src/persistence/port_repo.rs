//! Durable port pool repository.
//!
//! The only component touching `recording_port` rows. Claims are a single
//! atomic read-modify-write statement against the store: the lowest-numbered
//! free row is selected and claimed in one `UPDATE ... RETURNING`, so two
//! concurrent callers can never observe the same free row. A separate
//! find-then-claim pair would be unsafe here because the store is the shared
//! source of truth across service instances.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::Row;
use tracing::{debug, warn};

use crate::models::port::{PortKind, PortSlot};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for port pool rows.
#[derive(Clone)]
pub struct PortRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct PortRow {
    id: i64,
    value: i64,
    kind: Option<String>,
    session_id: Option<String>,
    locked_at: Option<String>,
}

impl PortRow {
    /// Convert a database row into the domain model.
    fn into_slot(self) -> Result<PortSlot> {
        let value = u16::try_from(self.value)
            .map_err(|_| AppError::Db(format!("port value out of range: {}", self.value)))?;
        let kind = self
            .kind
            .as_deref()
            .map(|s| {
                PortKind::parse(s).ok_or_else(|| AppError::Db(format!("invalid port kind: {s}")))
            })
            .transpose()?;
        let locked_at = self
            .locked_at
            .as_deref()
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| AppError::Db(format!("invalid locked_at: {e}")))
            })
            .transpose()?;

        Ok(PortSlot {
            id: self.id,
            value,
            kind,
            session_id: self.session_id,
            locked_at,
        })
    }
}

impl PortRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Seed the pool with one row per port in `[min, max)`.
    ///
    /// Idempotent: existing rows are left untouched, so re-running on every
    /// startup converges. Rows are never created or destroyed afterwards,
    /// only transitioned between free and claimed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if an insert fails.
    pub async fn seed(&self, min: u16, max: u16) -> Result<()> {
        for port in min..max {
            sqlx::query("INSERT OR IGNORE INTO recording_port (value) VALUES (?1)")
                .bind(i64::from(port))
                .execute(self.db.as_ref())
                .await?;
        }
        debug!(min, max, "port pool seeded");
        Ok(())
    }

    /// Atomically claim the lowest-numbered free port for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PoolExhausted` if no free row exists, `AppError::Db`
    /// if the session already holds a port of this kind or the statement
    /// fails.
    pub async fn acquire(&self, kind: PortKind, session_id: &str) -> Result<u16> {
        let locked_at = Utc::now().to_rfc3339();

        let row = sqlx::query(
            "UPDATE recording_port
                SET kind = ?1, session_id = ?2, locked_at = ?3
              WHERE id = (SELECT MIN(id) FROM recording_port WHERE locked_at IS NULL)
          RETURNING value",
        )
        .bind(kind.as_str())
        .bind(session_id)
        .bind(&locked_at)
        .fetch_optional(self.db.as_ref())
        .await
        .map_err(|err| {
            if err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation())
            {
                AppError::Db(format!("session {session_id} already holds a {kind} port"))
            } else {
                AppError::from(err)
            }
        })?;

        let Some(row) = row else {
            return Err(AppError::PoolExhausted(format!(
                "no free port for kind {kind}, session {session_id}"
            )));
        };

        let value: i64 = row.try_get("value")?;
        let value = u16::try_from(value)
            .map_err(|_| AppError::Db(format!("port value out of range: {value}")))?;

        debug!(port = value, %kind, session_id, "port acquired");
        Ok(value)
    }

    /// Claim one port per kind in the given order, all-or-nothing.
    ///
    /// If any claim fails, every port already held by the session is released
    /// before the failure is surfaced.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PartialAllocation` when a mid-set claim failed and
    /// the earlier claims were rolled back; the first claim's failure is
    /// surfaced unchanged.
    pub async fn acquire_set(
        &self,
        kinds: &[PortKind],
        session_id: &str,
    ) -> Result<HashMap<PortKind, u16>> {
        let mut acquired = HashMap::new();

        for &kind in kinds {
            match self.acquire(kind, session_id).await {
                Ok(value) => {
                    acquired.insert(kind, value);
                }
                Err(err) => {
                    if acquired.is_empty() {
                        return Err(err);
                    }

                    if let Err(release_err) = self.release(session_id).await {
                        warn!(session_id, error = %release_err, "rollback release failed");
                        // Release is idempotent; retry once before giving up.
                        if let Err(retry_err) = self.release(session_id).await {
                            warn!(session_id, error = %retry_err, "rollback release retry failed");
                        }
                    }

                    return Err(AppError::PartialAllocation(format!(
                        "claim for kind {kind} failed after {} port(s): {err}",
                        acquired.len()
                    )));
                }
            }
        }

        Ok(acquired)
    }

    /// Release every port currently owned by a session.
    ///
    /// Idempotent — releasing a session with no held ports is a no-op.
    /// Returns the number of rows freed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn release(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE recording_port
                SET kind = NULL, session_id = NULL, locked_at = NULL
              WHERE session_id = ?1",
        )
        .bind(session_id)
        .execute(self.db.as_ref())
        .await?;

        let freed = result.rows_affected();
        debug!(session_id, freed, "ports released");
        Ok(freed)
    }

    /// Ports currently held by a session, by kind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn ports_for_session(&self, session_id: &str) -> Result<HashMap<PortKind, u16>> {
        let rows: Vec<PortRow> = sqlx::query_as(
            "SELECT id, value, kind, session_id, locked_at
               FROM recording_port WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_all(self.db.as_ref())
        .await?;

        let mut ports = HashMap::new();
        for row in rows {
            let slot = row.into_slot()?;
            if let Some(kind) = slot.kind {
                ports.insert(kind, slot.value);
            }
        }
        Ok(ports)
    }

    /// Number of currently unclaimed rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_free(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recording_port WHERE locked_at IS NULL")
                .fetch_one(self.db.as_ref())
                .await?;
        Ok(count.unsigned_abs())
    }

    /// Total number of provisioned rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_total(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recording_port")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count.unsigned_abs())
    }

    /// All rows ordered by port number, for operator inspection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_slots(&self) -> Result<Vec<PortSlot>> {
        let rows: Vec<PortRow> = sqlx::query_as(
            "SELECT id, value, kind, session_id, locked_at
               FROM recording_port ORDER BY value",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(PortRow::into_slot).collect()
    }
}
