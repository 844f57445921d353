//! Shared application state and the live board model.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the persistence gateway, the hub handle (which owns the map of live
//! boards), and the optional AI client.
//!
//! Each `Board` carries its own `RwLock` over content and attached clients, so
//! boards are mutated in parallel while same-board writers serialize.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::llm::LlmChat;
use crate::message::OutboundMessage;
use crate::services::hub::HubHandle;
use crate::services::store::BoardStore;

/// Code shown in a board nobody has edited yet.
pub const WELCOME_CODE: &str = "// Welcome to your Huddle!\n// Start coding here.";

// =============================================================================
// CONTENT
// =============================================================================

/// One entry of a board's task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// A member currently present on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// The shared fields of a board. Serializes as the `INITIAL_STATE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardContent {
    pub id: String,
    pub content_code: String,
    pub content_tasks: Vec<Task>,
    pub content_notes: String,
    pub huddle_link: String,
    pub team: Vec<Member>,
}

impl BoardContent {
    /// Placeholder content for a board with no stored record.
    #[must_use]
    pub fn welcome(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            content_code: WELCOME_CODE.to_owned(),
            content_tasks: Vec::new(),
            content_notes: String::new(),
            huddle_link: String::new(),
            team: Vec::new(),
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Lock-protected part of a board.
pub struct BoardInner {
    pub content: BoardContent,
    /// Attached connections: `client_id` -> outbound queue.
    pub clients: HashMap<Uuid, mpsc::Sender<OutboundMessage>>,
    /// Bumped on every mutation; stamped onto each flush.
    pub revision: i64,
}

/// Live state of one board.
pub struct Board {
    pub id: String,
    pub inner: RwLock<BoardInner>,
    /// Attaches that resolved this board but have not reached the hub yet.
    /// Eviction treats a board with pending attaches as occupied.
    pub pending_attaches: AtomicUsize,
}

impl Board {
    #[must_use]
    pub fn new(content: BoardContent, revision: i64) -> Self {
        Self {
            id: content.id.clone(),
            inner: RwLock::new(BoardInner { content, clients: HashMap::new(), revision }),
            pending_attaches: AtomicUsize::new(0),
        }
    }

    /// Number of attached connections.
    pub async fn client_count(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    /// Clone of the current content, read under the board lock.
    pub async fn snapshot(&self) -> BoardContent {
        self.inner.read().await.content.clone()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BoardStore>,
    pub hub: HubHandle,
    /// Optional AI client. `None` if no provider key is configured.
    pub llm: Option<Arc<dyn LlmChat>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn BoardStore>, hub: HubHandle, llm: Option<Arc<dyn LlmChat>>) -> Self {
        Self { store, hub, llm }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use time::OffsetDateTime;

    use crate::llm::types::LlmError;
    use crate::services::hub::{HubConfig, spawn_hub};
    use crate::services::store::{BoardRecord, StoreError};

    /// In-memory `BoardStore` with the same revision rule as the SQLite store.
    #[derive(Default)]
    pub struct MemoryStore {
        records: Mutex<HashMap<String, BoardRecord>>,
        upserts: AtomicUsize,
        get_delay: Option<Duration>,
    }

    impl MemoryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Store whose `get` sleeps first, to widen race windows.
        #[must_use]
        pub fn with_get_delay(delay: Duration) -> Self {
            Self { get_delay: Some(delay), ..Self::default() }
        }

        pub fn insert(&self, record: BoardRecord) {
            self.records
                .lock()
                .expect("store mutex should lock")
                .insert(record.id.clone(), record);
        }

        #[must_use]
        pub fn record(&self, id: &str) -> Option<BoardRecord> {
            self.records
                .lock()
                .expect("store mutex should lock")
                .get(id)
                .cloned()
        }

        #[must_use]
        pub fn upsert_count(&self) -> usize {
            self.upserts.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl BoardStore for MemoryStore {
        async fn get(&self, board_id: &str) -> Result<Option<BoardRecord>, StoreError> {
            if let Some(delay) = self.get_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.record(board_id))
        }

        async fn upsert(&self, record: &BoardRecord) -> Result<(), StoreError> {
            self.upserts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut records = self.records.lock().expect("store mutex should lock");
            let newer = records
                .get(&record.id)
                .is_none_or(|stored| stored.revision <= record.revision);
            if newer {
                records.insert(record.id.clone(), record.clone());
            }
            Ok(())
        }

        async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
            let mut records = self.records.lock().expect("store mutex should lock");
            let before = records.len();
            records.retain(|_, r| r.last_updated >= cutoff);
            Ok((before - records.len()) as u64)
        }
    }

    /// `LlmChat` double that returns a canned reply or error and records prompts.
    pub struct MockLlm {
        reply: Result<String, String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl MockLlm {
        #[must_use]
        pub fn replying(text: &str) -> Self {
            Self { reply: Ok(text.to_owned()), prompts: Mutex::new(Vec::new()) }
        }

        #[must_use]
        pub fn failing(message: &str) -> Self {
            Self { reply: Err(message.to_owned()), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait::async_trait]
    impl LlmChat for MockLlm {
        async fn complete(&self, _max_tokens: u32, prompt: &str) -> Result<String, LlmError> {
            self.prompts
                .lock()
                .expect("mock mutex should lock")
                .push(prompt.to_owned());
            self.reply.clone().map_err(LlmError::ApiRequest)
        }
    }

    /// Hub config with a short grace period for timing tests.
    #[must_use]
    pub fn test_hub_config() -> HubConfig {
        HubConfig { intake_capacity: 64, outbound_queue_capacity: 16, eviction_grace: Duration::from_secs(600) }
    }

    /// Create a test `AppState` over the given store with a running hub.
    #[must_use]
    pub fn test_app_state_with_store(store: Arc<MemoryStore>) -> AppState {
        let store: Arc<dyn BoardStore> = store;
        let (hub, _task) = spawn_hub(store.clone(), test_hub_config());
        AppState::new(store, hub, None)
    }

    /// Create a test `AppState` with an empty in-memory store.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a test `AppState` with a mock LLM.
    #[must_use]
    pub fn test_app_state_with_llm(llm: Arc<dyn LlmChat>) -> AppState {
        let mut state = test_app_state();
        state.llm = Some(llm);
        state
    }

    /// A task as the browser client builds it (no assignee).
    #[must_use]
    pub fn dummy_task(id: &str, text: &str) -> Task {
        Task { id: id.to_owned(), text: text.to_owned(), assignee: None, completed: false }
    }

    #[must_use]
    pub fn dummy_member(id: &str) -> Member {
        Member { id: id.to_owned(), name: format!("member-{id}"), color: "#3b82f6".to_owned() }
    }
}
