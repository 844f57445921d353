//! Message — the JSON envelope exchanged with board clients.
//!
//! ARCHITECTURE
//! ============
//! Every WebSocket message in either direction is `{type, payload}`. The
//! server only interprets the envelope far enough to recognise field updates;
//! the raw text is what gets rebroadcast to peers, so clients always see the
//! bytes the sender wrote.
//!
//! DESIGN
//! ======
//! - `INITIAL_STATE` is server→client only and additionally carries
//!   `clientId`, the identifier assigned to the receiving connection.
//! - Outbound messages are `Utf8Bytes`, the websocket text type itself, so
//!   one fan-out costs a refcount bump per recipient and the write pump hands
//!   the same buffer to the socket without copying.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{BoardContent, Member};

// =============================================================================
// TYPE CONSTANTS
// =============================================================================

pub const INITIAL_STATE: &str = "INITIAL_STATE";
pub const CODE_UPDATE: &str = "CODE_UPDATE";
pub const TASKS_UPDATE: &str = "TASKS_UPDATE";
pub const NOTES_UPDATE: &str = "NOTES_UPDATE";
pub const LINK_UPDATE: &str = "LINK_UPDATE";
pub const TEAM_UPDATE: &str = "TEAM_UPDATE";

/// Serialized envelope queued for a connection's outbound pump.
pub type OutboundMessage = axum::extract::ws::Utf8Bytes;

// =============================================================================
// TYPES
// =============================================================================

/// Field-update message types a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Code,
    Tasks,
    Notes,
    Link,
    Team,
}

impl UpdateKind {
    /// Map a wire `type` to an update kind. `INITIAL_STATE` and anything
    /// unknown map to `None`.
    #[must_use]
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            CODE_UPDATE => Some(Self::Code),
            TASKS_UPDATE => Some(Self::Tasks),
            NOTES_UPDATE => Some(Self::Notes),
            LINK_UPDATE => Some(Self::Link),
            TEAM_UPDATE => Some(Self::Team),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => CODE_UPDATE,
            Self::Tasks => TASKS_UPDATE,
            Self::Notes => NOTES_UPDATE,
            Self::Link => LINK_UPDATE,
            Self::Team => TEAM_UPDATE,
        }
    }
}

/// Inbound envelope. The payload stays untyped until the update kind is known.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    #[must_use]
    pub fn update_kind(&self) -> Option<UpdateKind> {
        UpdateKind::from_type(&self.kind)
    }
}

#[derive(Serialize)]
struct OutboundEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a T,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    client_id: Option<Uuid>,
}

// =============================================================================
// CODEC
// =============================================================================

/// Decode one inbound text message.
///
/// # Errors
///
/// Returns the JSON error when the text is not a `{type, payload}` object.
pub fn decode(text: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(text)
}

/// Encode a server-originated message.
///
/// # Errors
///
/// Returns the JSON error if the payload fails to serialize.
pub fn encode<T: Serialize>(kind: &str, payload: &T) -> Result<OutboundMessage, serde_json::Error> {
    let json = serde_json::to_string(&OutboundEnvelope { kind, payload, client_id: None })?;
    Ok(OutboundMessage::from(json))
}

/// Encode the `INITIAL_STATE` message for a newly attached connection.
///
/// # Errors
///
/// Returns the JSON error if the snapshot fails to serialize.
pub fn initial_state(content: &BoardContent, client_id: Uuid) -> Result<OutboundMessage, serde_json::Error> {
    let json =
        serde_json::to_string(&OutboundEnvelope { kind: INITIAL_STATE, payload: content, client_id: Some(client_id) })?;
    Ok(OutboundMessage::from(json))
}

/// Encode a roster broadcast.
///
/// # Errors
///
/// Returns the JSON error if the roster fails to serialize.
pub fn team_update(team: &[Member]) -> Result<OutboundMessage, serde_json::Error> {
    encode(TEAM_UPDATE, &team)
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
