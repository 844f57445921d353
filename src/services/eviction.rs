//! Eviction — deferred removal of empty boards from memory.
//!
//! Each arm is an independent one-shot task. When it fires it re-checks, under
//! the registry lock, that the board is still loaded, has no connections and
//! no attach in flight; only then is it removed. Several arms for one board
//! can be outstanding at once and each is safe to run.
//!
//! Lock order is registry map, then board. Nothing takes them the other way.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::services::hub::BoardMap;

/// Schedule an eviction check for `board_id` after `grace`.
pub fn arm(boards: BoardMap, board_id: String, grace: Duration) -> JoinHandle<bool> {
    debug!(%board_id, grace_secs = grace.as_secs(), "eviction armed");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        evict_if_idle(&boards, &board_id).await
    })
}

/// Remove the board if it is idle. Returns `true` when it was removed.
pub async fn evict_if_idle(boards: &BoardMap, board_id: &str) -> bool {
    let mut map = boards.lock().await;
    let Some(board) = map.get(board_id).map(Arc::clone) else {
        return false;
    };
    if board.pending_attaches.load(Ordering::SeqCst) > 0 {
        debug!(%board_id, "eviction skipped: attach in flight");
        return false;
    }
    let clients = board.client_count().await;
    if clients > 0 {
        debug!(%board_id, clients, "eviction skipped: board has connections");
        return false;
    }
    map.remove(board_id);
    info!(%board_id, "evicted board from memory");
    true
}
