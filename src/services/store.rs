//! Board store — the persistence gateway for board snapshots.
//!
//! DESIGN
//! ======
//! The store treats a board as one opaque row keyed by board id: text fields
//! plus JSON-encoded tasks, notes and roster. The hub reads a row on cache
//! miss; flushes upsert the whole row; the retention sweep bulk-deletes rows
//! that have not been written recently.
//!
//! Flushes are fire-and-forget and may complete out of order, so every row
//! carries the board revision it was taken at and an upsert never replaces a
//! row holding a newer revision.

use sqlx::SqlitePool;
use time::OffsetDateTime;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid timestamp in stored row: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

/// Serialized form of a board as stored by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRecord {
    pub id: String,
    pub content_code: String,
    /// JSON array of tasks.
    pub content_tasks: String,
    /// JSON string holding the notes text.
    pub content_notes: String,
    pub huddle_link: String,
    /// JSON array of roster members.
    pub team: String,
    pub revision: i64,
    pub last_updated: OffsetDateTime,
}

/// Persistence gateway contract. Implementations must tolerate concurrent
/// independent upserts; keys never overlap across boards.
#[async_trait::async_trait]
pub trait BoardStore: Send + Sync {
    /// Read the stored record for a board, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    async fn get(&self, board_id: &str) -> Result<Option<BoardRecord>, StoreError>;

    /// Insert or replace a board record unless the stored revision is newer.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    async fn upsert(&self, record: &BoardRecord) -> Result<(), StoreError>;

    /// Delete every record last written before `cutoff`. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete fails.
    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;
}

// =============================================================================
// SQLITE
// =============================================================================

pub struct SqliteBoardStore {
    pool: SqlitePool,
}

impl SqliteBoardStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type BoardRow = (String, String, String, String, String, String, i64, i64);

fn row_to_record(row: BoardRow) -> Result<BoardRecord, StoreError> {
    let (id, content_code, content_tasks, content_notes, huddle_link, team, revision, last_updated) = row;
    Ok(BoardRecord {
        id,
        content_code,
        content_tasks,
        content_notes,
        huddle_link,
        team,
        revision,
        last_updated: OffsetDateTime::from_unix_timestamp(last_updated)?,
    })
}

#[async_trait::async_trait]
impl BoardStore for SqliteBoardStore {
    async fn get(&self, board_id: &str) -> Result<Option<BoardRecord>, StoreError> {
        let row = sqlx::query_as::<_, BoardRow>(
            "SELECT id, content_code, content_tasks, content_notes, huddle_link, team, revision, last_updated \
             FROM boards WHERE id = ?1",
        )
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    async fn upsert(&self, record: &BoardRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO boards (id, content_code, content_tasks, content_notes, huddle_link, team, revision, last_updated) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT (id) DO UPDATE SET \
                 content_code = excluded.content_code, content_tasks = excluded.content_tasks, \
                 content_notes = excluded.content_notes, huddle_link = excluded.huddle_link, \
                 team = excluded.team, revision = excluded.revision, last_updated = excluded.last_updated \
             WHERE excluded.revision >= boards.revision",
        )
        .bind(&record.id)
        .bind(&record.content_code)
        .bind(&record.content_tasks)
        .bind(&record.content_notes)
        .bind(&record.huddle_link)
        .bind(&record.team)
        .bind(record.revision)
        .bind(record.last_updated.unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM boards WHERE last_updated < ?1")
            .bind(cutoff.unix_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
