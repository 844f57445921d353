//! Hub — the board registry and fan-out coordinator.
//!
//! ARCHITECTURE
//! ============
//! One task owns event processing for every live board. Connection handlers
//! submit `Attach`, `Detach` and `Fanout` events to a single bounded intake and
//! the hub applies them strictly one at a time, in arrival order.
//!
//! Resolving which board a new connection joins happens before its `Attach`
//! is queued, under the registry-wide map lock, so two first-time joins for
//! the same id always end up on the same `Board`.
//!
//! DESIGN
//! ======
//! - The board map is touched only under its mutex: by `resolve` (lookup or
//!   insert) and by eviction (re-check and remove).
//! - A board's content and client set are touched only under the board's own
//!   `RwLock`. Lock order is map, then board.
//! - Fan-out never blocks. A full outbound queue marks that connection dead:
//!   it is removed from the board at once, which closes its queue, and its
//!   member leaves the roster as if it had detached. Fan-out from a connection
//!   that is no longer attached is ignored.
//! - A `BoardLease` keeps a resolved board pinned in memory until its attach
//!   is processed. A lease dropped without attaching arms eviction instead.
//!
//! LIFECYCLE
//! =========
//! 1. `resolve` → lease (load from store or create on miss)
//! 2. `attach` → roster join, `INITIAL_STATE` to the client, `TEAM_UPDATE` to
//!    peers; the caller waits for the hub to confirm
//! 3. `fanout` per inbound message
//! 4. `detach` → roster leave; last one out arms eviction

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::{self, OutboundMessage};
use crate::services::board::{board_from_record, to_record};
use crate::services::persistence::{env_parse, schedule_flush};
use crate::services::store::{BoardStore, StoreError};
use crate::services::eviction;
use crate::state::{Board, BoardContent, BoardInner, Member};

const DEFAULT_HUB_INTAKE_CAPACITY: usize = 1024;
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
const DEFAULT_EVICTION_GRACE_SECS: u64 = 10 * 60;

/// Live boards keyed by board id.
pub type BoardMap = Arc<Mutex<HashMap<String, Arc<Board>>>>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("failed to load board: {0}")]
    Store(#[from] StoreError),
    #[error("hub is not running")]
    Closed,
    #[error("connection closed before it could attach")]
    Rejected,
}

/// Hub tuning, loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the hub's event intake.
    pub intake_capacity: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// How long an empty board stays loaded.
    pub eviction_grace: Duration,
}

impl HubConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            intake_capacity: env_parse("HUB_INTAKE_CAPACITY", DEFAULT_HUB_INTAKE_CAPACITY).max(1),
            outbound_queue_capacity: env_parse("OUTBOUND_QUEUE_CAPACITY", DEFAULT_OUTBOUND_QUEUE_CAPACITY).max(1),
            eviction_grace: Duration::from_secs(env_parse("EVICTION_GRACE_SECS", DEFAULT_EVICTION_GRACE_SECS)),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            intake_capacity: DEFAULT_HUB_INTAKE_CAPACITY,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            eviction_grace: Duration::from_secs(DEFAULT_EVICTION_GRACE_SECS),
        }
    }
}

/// What a connection hands the hub when it attaches.
pub struct ClientRegistration {
    pub client_id: Uuid,
    pub member: Member,
    /// Sending half of the connection's outbound queue. The hub keeps the
    /// only copy, so removing it from the board closes the queue.
    pub tx: mpsc::Sender<OutboundMessage>,
}

/// A resolved board held for a connection that has not attached yet.
pub struct BoardLease {
    board: Arc<Board>,
    boards: BoardMap,
    grace: Duration,
    attached: bool,
}

impl BoardLease {
    #[must_use]
    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }
}

impl Drop for BoardLease {
    fn drop(&mut self) {
        self.board.pending_attaches.fetch_sub(1, Ordering::SeqCst);
        if !self.attached && tokio::runtime::Handle::try_current().is_ok() {
            eviction::arm(Arc::clone(&self.boards), self.board.id.clone(), self.grace);
        }
    }
}

enum HubEvent {
    Attach { lease: BoardLease, client: ClientRegistration, ack: oneshot::Sender<bool> },
    Detach { board: Arc<Board>, client_id: Uuid },
    Fanout { board: Arc<Board>, sender: Uuid, text: OutboundMessage },
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable handle used by connection handlers and background tasks.
#[derive(Clone)]
pub struct HubHandle {
    boards: BoardMap,
    intake: mpsc::Sender<HubEvent>,
    store: Arc<dyn BoardStore>,
    config: HubConfig,
}

/// Spawn the hub event loop. It runs until every handle is dropped.
#[must_use]
pub fn spawn_hub(store: Arc<dyn BoardStore>, config: HubConfig) -> (HubHandle, JoinHandle<()>) {
    let boards: BoardMap = Arc::new(Mutex::new(HashMap::new()));
    let (intake, rx) = mpsc::channel(config.intake_capacity.max(1));

    info!(
        intake_capacity = config.intake_capacity,
        outbound_queue_capacity = config.outbound_queue_capacity,
        eviction_grace_secs = config.eviction_grace.as_secs(),
        "hub configured"
    );

    let hub = Hub { boards: Arc::clone(&boards), store: Arc::clone(&store), grace: config.eviction_grace };
    let task = tokio::spawn(hub.run(rx));
    (HubHandle { boards, intake, store, config }, task)
}

impl HubHandle {
    #[must_use]
    pub fn config(&self) -> HubConfig {
        self.config
    }

    /// Look up a live board or load/create it, and pin it for an attach.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Store`] if the board is not in memory and the
    /// store read fails.
    pub async fn resolve(&self, board_id: &str) -> Result<BoardLease, HubError> {
        let mut boards = self.boards.lock().await;
        let board = if let Some(board) = boards.get(board_id) {
            debug!(%board_id, "joining in-memory board");
            Arc::clone(board)
        } else {
            let board = if let Some(record) = self.store.get(board_id).await? {
                info!(%board_id, revision = record.revision, "loaded board from store");
                Arc::new(board_from_record(record))
            } else {
                info!(%board_id, "no stored board; creating a new one");
                let mut board = Board::new(BoardContent::welcome(board_id), 0);
                schedule_flush(Arc::clone(&self.store), to_record(board.inner.get_mut()));
                Arc::new(board)
            };
            boards.insert(board_id.to_owned(), Arc::clone(&board));
            board
        };

        board.pending_attaches.fetch_add(1, Ordering::SeqCst);
        Ok(BoardLease { board, boards: Arc::clone(&self.boards), grace: self.config.eviction_grace, attached: false })
    }

    /// Attach a connection to a resolved board. Returns once the hub has
    /// processed the attach, so the connection is in the board's client set
    /// before it reads anything from its socket.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub loop has stopped, or
    /// [`HubError::Rejected`] if `INITIAL_STATE` could not be queued.
    pub async fn attach(&self, lease: BoardLease, client: ClientRegistration) -> Result<(), HubError> {
        let (ack, attached) = oneshot::channel();
        self.intake
            .send(HubEvent::Attach { lease, client, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        match attached.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(HubError::Rejected),
            Err(_) => Err(HubError::Closed),
        }
    }

    /// Queue a detach. Safe to call for a connection already reclaimed.
    pub async fn detach(&self, board: Arc<Board>, client_id: Uuid) {
        if self.intake.send(HubEvent::Detach { board, client_id }).await.is_err() {
            warn!(%client_id, "hub stopped; detach dropped");
        }
    }

    /// Queue a fan-out of raw message text to every peer of `sender`.
    pub async fn fanout(&self, board: Arc<Board>, sender: Uuid, text: OutboundMessage) {
        if self.intake.send(HubEvent::Fanout { board, sender, text }).await.is_err() {
            warn!(client_id = %sender, "hub stopped; fanout dropped");
        }
    }

    /// The live board for `board_id`, if loaded.
    #[cfg(test)]
    pub async fn board(&self, board_id: &str) -> Option<Arc<Board>> {
        self.boards.lock().await.get(board_id).cloned()
    }

    #[cfg(test)]
    pub async fn contains(&self, board_id: &str) -> bool {
        self.boards.lock().await.contains_key(board_id)
    }

    /// Every board currently loaded.
    pub async fn live_boards(&self) -> Vec<Arc<Board>> {
        self.boards.lock().await.values().cloned().collect()
    }
}

// =============================================================================
// EVENT LOOP
// =============================================================================

struct Hub {
    boards: BoardMap,
    store: Arc<dyn BoardStore>,
    grace: Duration,
}

impl Hub {
    async fn run(self, mut rx: mpsc::Receiver<HubEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                HubEvent::Attach { lease, client, ack } => {
                    let attached = self.attach(lease, client).await;
                    let _ = ack.send(attached);
                }
                HubEvent::Detach { board, client_id } => self.detach(board, client_id).await,
                HubEvent::Fanout { board, sender, text } => self.fanout(&board, sender, &text).await,
            }
        }
        info!("hub stopped");
    }

    async fn attach(&self, mut lease: BoardLease, client: ClientRegistration) -> bool {
        let board = Arc::clone(lease.board());
        let ClientRegistration { client_id, member, tx } = client;
        let member_id = member.id.clone();

        let mut inner = board.inner.write().await;
        inner.content.team.retain(|m| m.id != member_id);
        inner.content.team.push(member);

        // INITIAL_STATE is taken under the same lock that admits the client,
        // so no update can land between the snapshot and its first fan-out.
        let queued = match message::initial_state(&inner.content, client_id) {
            Ok(initial) => tx.try_send(initial).is_ok(),
            Err(e) => {
                warn!(board_id = %board.id, %client_id, error = %e, "failed to encode initial state");
                false
            }
        };
        if !queued {
            inner.content.team.retain(|m| m.id != member_id);
            warn!(board_id = %board.id, %client_id, "connection gone before attach; skipping");
            return false;
        }

        inner.clients.insert(client_id, tx);
        inner.revision += 1;
        lease.attached = true;

        match message::team_update(&inner.content.team) {
            Ok(text) => {
                deliver_and_reclaim(&board.id, &mut inner, Some(client_id), &text);
            }
            Err(e) => warn!(board_id = %board.id, error = %e, "failed to encode roster"),
        }

        let clients = inner.clients.len();
        let record = to_record(&inner);
        drop(inner);
        drop(lease);

        schedule_flush(Arc::clone(&self.store), record);
        info!(board_id = %board.id, %client_id, clients, "client attached");
        if clients == 0 {
            eviction::arm(Arc::clone(&self.boards), board.id.clone(), self.grace);
        }
        true
    }

    async fn detach(&self, board: Arc<Board>, client_id: Uuid) {
        let member_id = client_id.to_string();

        let mut inner = board.inner.write().await;
        // Dropping the sender closes the outbound queue.
        let was_attached = inner.clients.remove(&client_id).is_some();

        let before = inner.content.team.len();
        inner.content.team.retain(|m| m.id != member_id);
        let record = if inner.content.team.len() == before {
            None
        } else {
            inner.revision += 1;
            if !inner.clients.is_empty() {
                match message::team_update(&inner.content.team) {
                    Ok(text) => {
                        deliver_and_reclaim(&board.id, &mut inner, None, &text);
                    }
                    Err(e) => warn!(board_id = %board.id, error = %e, "failed to encode roster"),
                }
            }
            Some(to_record(&inner))
        };
        let remaining = inner.clients.len();
        drop(inner);

        if let Some(record) = record {
            schedule_flush(Arc::clone(&self.store), record);
        }
        info!(board_id = %board.id, %client_id, was_attached, remaining, "client detached");

        if remaining == 0 {
            eviction::arm(Arc::clone(&self.boards), board.id.clone(), self.grace);
        }
    }

    async fn fanout(&self, board: &Board, sender: Uuid, text: &OutboundMessage) {
        let mut inner = board.inner.write().await;
        // A reclaimed connection may still be reading; its messages go nowhere.
        if !inner.clients.contains_key(&sender) {
            debug!(board_id = %board.id, client_id = %sender, "fanout from detached connection ignored");
            return;
        }

        let roster_changed = deliver_and_reclaim(&board.id, &mut inner, Some(sender), text);
        let remaining = inner.clients.len();
        debug!(board_id = %board.id, client_id = %sender, recipients = remaining.saturating_sub(1), "fanout");

        let record = roster_changed.then(|| {
            inner.revision += 1;
            to_record(&inner)
        });
        drop(inner);

        if let Some(record) = record {
            schedule_flush(Arc::clone(&self.store), record);
        }
        if remaining == 0 {
            eviction::arm(Arc::clone(&self.boards), board.id.clone(), self.grace);
        }
    }
}

/// Non-blocking enqueue to every client except `exclude`. Clients whose queue
/// is full or closed are removed. Returns the removed client ids.
fn deliver(board_id: &str, inner: &mut BoardInner, exclude: Option<Uuid>, text: &OutboundMessage) -> Vec<Uuid> {
    let mut dead = Vec::new();
    for (client_id, tx) in &inner.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        match tx.try_send(text.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%board_id, %client_id, "outbound queue full; dropping connection");
                dead.push(*client_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%board_id, %client_id, "outbound queue closed; dropping connection");
                dead.push(*client_id);
            }
        }
    }
    for client_id in &dead {
        inner.clients.remove(client_id);
    }
    dead
}

/// `deliver`, then take every dropped connection's member off the roster and
/// send the new roster to whoever is left. Repeats while that roster send
/// drops further connections. Returns `true` if the roster changed.
fn deliver_and_reclaim(board_id: &str, inner: &mut BoardInner, exclude: Option<Uuid>, text: &OutboundMessage) -> bool {
    let mut dead = deliver(board_id, inner, exclude, text);
    let mut roster_changed = false;
    while !dead.is_empty() {
        let dead_ids: Vec<String> = dead.iter().map(Uuid::to_string).collect();
        let before = inner.content.team.len();
        inner.content.team.retain(|m| !dead_ids.contains(&m.id));
        if inner.content.team.len() == before {
            break;
        }
        roster_changed = true;
        info!(%board_id, reclaimed = dead.len(), remaining = inner.clients.len(), "reclaimed dropped connections");
        if inner.clients.is_empty() {
            break;
        }
        dead = match message::team_update(&inner.content.team) {
            Ok(roster) => deliver(board_id, inner, None, &roster),
            Err(e) => {
                warn!(%board_id, error = %e, "failed to encode roster");
                break;
            }
        };
    }
    roster_changed
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
