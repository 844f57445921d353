//! Board service — field updates, record conversion, and hydration.
//!
//! DESIGN
//! ======
//! A field update replaces one field wholesale under the board's write lock.
//! There is no merge and no validation beyond decoding the payload into the
//! field's type: the last writer to take the lock wins that field.
//!
//! Every successful update bumps the board revision and schedules a flush of
//! the full field set, built while the lock is still held so the record is a
//! consistent snapshot.
//!
//! ERROR HANDLING
//! ==============
//! A payload that does not decode for its type is a no-op here; the raw
//! message is still rebroadcast by the caller. Stored JSON columns that fail
//! to decode fall back to the field default instead of failing the load.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::{Envelope, UpdateKind};
use crate::services::persistence;
use crate::services::store::{BoardRecord, BoardStore};
use crate::state::{Board, BoardContent, BoardInner, Member, Task};

// =============================================================================
// FIELD UPDATES
// =============================================================================

/// A decoded field replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Code(String),
    Tasks(Vec<Task>),
    Notes(String),
    Link(String),
    Team(Vec<Member>),
}

impl FieldUpdate {
    /// Decode an envelope into a field update. Returns `None` for unknown
    /// types and for payloads that do not match the field's type.
    #[must_use]
    pub fn decode(envelope: &Envelope) -> Option<Self> {
        let kind = envelope.update_kind()?;
        let payload = &envelope.payload;
        let update = match kind {
            UpdateKind::Code => payload.as_str().map(|s| Self::Code(s.to_owned())),
            UpdateKind::Notes => payload.as_str().map(|s| Self::Notes(s.to_owned())),
            UpdateKind::Link => payload.as_str().map(|s| Self::Link(s.to_owned())),
            UpdateKind::Tasks => serde_json::from_value(payload.clone()).ok().map(Self::Tasks),
            UpdateKind::Team => serde_json::from_value(payload.clone()).ok().map(Self::Team),
        };
        if update.is_none() {
            debug!(kind = kind.as_str(), "undecodable payload; field left unchanged");
        }
        update
    }

    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Code(_) => UpdateKind::Code,
            Self::Tasks(_) => UpdateKind::Tasks,
            Self::Notes(_) => UpdateKind::Notes,
            Self::Link(_) => UpdateKind::Link,
            Self::Team(_) => UpdateKind::Team,
        }
    }

    fn apply_to(self, content: &mut BoardContent) {
        match self {
            Self::Code(code) => content.content_code = code,
            Self::Tasks(tasks) => content.content_tasks = tasks,
            Self::Notes(notes) => content.content_notes = notes,
            Self::Link(link) => content.huddle_link = link,
            Self::Team(team) => content.team = team,
        }
    }
}

/// Apply a field update from `sender` to a live board and schedule a flush.
///
/// Returns `false` without touching the board when `sender` is no longer
/// attached to it (reclaimed by fan-out, or the board was evicted).
pub async fn apply_update(store: &Arc<dyn BoardStore>, board: &Board, sender: Uuid, update: FieldUpdate) -> bool {
    let kind = update.kind();
    let record = {
        let mut inner = board.inner.write().await;
        if !inner.clients.contains_key(&sender) {
            debug!(board_id = %board.id, client_id = %sender, kind = kind.as_str(), "update from detached connection ignored");
            return false;
        }
        update.apply_to(&mut inner.content);
        inner.revision += 1;
        to_record(&inner)
    };
    debug!(board_id = %board.id, kind = kind.as_str(), revision = record.revision, "applied field update");
    persistence::schedule_flush(store.clone(), record);
    true
}

// =============================================================================
// RECORD CONVERSION
// =============================================================================

/// Serialize the full field set of a board, stamped with its revision.
#[must_use]
pub fn to_record(inner: &BoardInner) -> BoardRecord {
    let content = &inner.content;
    BoardRecord {
        id: content.id.clone(),
        content_code: content.content_code.clone(),
        content_tasks: serde_json::to_string(&content.content_tasks).unwrap_or_else(|_| "[]".into()),
        content_notes: serde_json::to_string(&content.content_notes).unwrap_or_else(|_| "\"\"".into()),
        huddle_link: content.huddle_link.clone(),
        team: serde_json::to_string(&content.team).unwrap_or_else(|_| "[]".into()),
        revision: inner.revision,
        last_updated: OffsetDateTime::now_utc(),
    }
}

/// Rebuild a live board from a stored record.
#[must_use]
pub fn board_from_record(record: BoardRecord) -> Board {
    let content = BoardContent {
        content_tasks: decode_column(&record.id, "content_tasks", &record.content_tasks),
        content_notes: decode_column(&record.id, "content_notes", &record.content_notes),
        team: decode_column(&record.id, "team", &record.team),
        id: record.id,
        content_code: record.content_code,
        huddle_link: record.huddle_link,
    };
    Board::new(content, record.revision)
}

fn decode_column<T: DeserializeOwned + Default>(board_id: &str, column: &str, raw: &str) -> T {
    if raw.is_empty() {
        return T::default();
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(%board_id, column, error = %e, "stored column failed to decode; using default");
            T::default()
        }
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
