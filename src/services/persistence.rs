//! Persistence service — fire-and-forget flushes and the retention sweep.
//!
//! DESIGN
//! ======
//! Flushes run on their own task so a slow or unavailable store never stalls
//! fan-out. They are not sequenced against each other; the store's revision
//! check makes a late, stale flush a no-op instead of a rollback.
//!
//! The retention sweep runs on a fixed cadence and deletes records that have
//! not been written within the retention window. Boards that currently have
//! connections are re-flushed first, which refreshes their timestamp and keeps
//! a live board's record from being purged under it.
//!
//! ERROR HANDLING
//! ==============
//! Store failures are logged and dropped. In-memory state stays authoritative
//! and the next mutation's flush tries again.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::services::board::to_record;
use crate::services::hub::HubHandle;
use crate::services::store::{BoardRecord, BoardStore, StoreError};

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Tuning knobs for the retention sweep, loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Records not written within this window are deleted.
    pub retention: Duration,
}

impl SweepConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1)),
            retention: Duration::from_secs(env_parse("RETENTION_SECS", DEFAULT_RETENTION_SECS)),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// FLUSH
// =============================================================================

/// Spawn a fire-and-forget upsert of a board record.
pub fn schedule_flush(store: Arc<dyn BoardStore>, record: BoardRecord) {
    tokio::spawn(async move {
        match store.upsert(&record).await {
            Ok(()) => debug!(board_id = %record.id, revision = record.revision, "persisted board state"),
            Err(e) => error!(error = %e, board_id = %record.id, "board flush failed"),
        }
    });
}

// =============================================================================
// RETENTION SWEEP
// =============================================================================

/// Spawn the periodic retention sweep. The first sweep runs one interval
/// after startup.
pub fn spawn_sweep_task(store: Arc<dyn BoardStore>, hub: HubHandle, config: SweepConfig) -> JoinHandle<()> {
    info!(
        interval_secs = config.interval.as_secs(),
        retention_secs = config.retention.as_secs(),
        "retention sweep configured"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match sweep_once(store.as_ref(), &hub, config.retention).await {
                Ok(0) => debug!("retention sweep found nothing to delete"),
                Ok(deleted) => info!(deleted, "retention sweep deleted stale boards"),
                Err(e) => error!(error = %e, "retention sweep failed"),
            }
        }
    })
}

/// Refresh every connected board, then delete records older than the
/// retention window. Returns the number of deleted records.
///
/// # Errors
///
/// Returns a [`StoreError`] if the delete fails. Refresh failures are logged
/// and do not abort the sweep.
pub async fn sweep_once(store: &dyn BoardStore, hub: &HubHandle, retention: Duration) -> Result<u64, StoreError> {
    for board in hub.live_boards().await {
        let record = {
            let inner = board.inner.read().await;
            if inner.clients.is_empty() {
                continue;
            }
            to_record(&inner)
        };
        if let Err(e) = store.upsert(&record).await {
            error!(error = %e, board_id = %record.id, "failed to refresh live board before sweep");
        }
    }

    store.delete_older_than(retention_cutoff(OffsetDateTime::now_utc(), retention)).await
}

/// Oldest `last_updated` a record may carry and survive. A window reaching
/// past the representable range keeps everything.
fn retention_cutoff(now: OffsetDateTime, retention: Duration) -> OffsetDateTime {
    time::Duration::try_from(retention)
        .ok()
        .and_then(|window| now.checked_sub(window))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
