//! WebSocket handler — one connection per attached client.
//!
//! DESIGN
//! ======
//! On upgrade the board is resolved and the connection is registered with the
//! hub, which queues `INITIAL_STATE` as the first outbound message. Two pumps
//! then run side by side:
//! - read pump: inbound text → board mutation → hub fan-out
//! - write pump: private outbound queue → socket, batching whatever is ready
//!
//! Whichever pump ends first ends the connection. The other is aborted and
//! the hub is told to detach.
//!
//! LIFECYCLE
//! =========
//! 1. `GET /ws/{board_id}` → resolve (load or create) → upgrade
//! 2. attach → `INITIAL_STATE` to the client, `TEAM_UPDATE` to peers
//! 3. pumps run until the socket closes or the hub drops the queue
//! 4. detach → roster leave, eviction armed if the board is empty

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{Sink, SinkExt, Stream, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::{self, OutboundMessage};
use crate::services::board::{FieldUpdate, apply_update};
use crate::services::hub::{BoardLease, ClientRegistration};
use crate::state::{AppState, Board, Member};

/// Roster colors handed out at random on join.
const MEMBER_COLORS: [&str; 8] =
    ["#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#8b5cf6", "#ec4899"];

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let lease = match state.hub.resolve(&board_id).await {
        Ok(lease) => lease,
        Err(e) => {
            tracing::error!(%board_id, error = %e, "ws: board resolve failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Could not initialize board").into_response();
        }
    };

    let name = params.get("name").cloned();
    ws.on_upgrade(move |socket| run_ws(socket, state, lease, name))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(socket: WebSocket, state: AppState, lease: BoardLease, name: Option<String>) {
    let client_id = Uuid::new_v4();
    let board = Arc::clone(lease.board());
    let (tx, rx) = mpsc::channel::<OutboundMessage>(state.hub.config().outbound_queue_capacity.max(1));

    let member = new_member(client_id, name);
    info!(board_id = %board.id, %client_id, name = %member.name, "ws: client connected");

    if let Err(e) = state.hub.attach(lease, ClientRegistration { client_id, member, tx }).await {
        warn!(board_id = %board.id, %client_id, error = %e, "ws: attach failed");
        return;
    }

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_pump(sink, rx));
    let mut reader = tokio::spawn(read_pump(stream, state.clone(), Arc::clone(&board), client_id));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.hub.detach(Arc::clone(&board), client_id).await;
    info!(board_id = %board.id, %client_id, "ws: client disconnected");
}

/// Roster entry for a new connection. The member id is the client id so the
/// hub can drop it on detach.
fn new_member(client_id: Uuid, name: Option<String>) -> Member {
    let name = name
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Guest-{}", &client_id.simple().to_string()[..4]));
    let color = MEMBER_COLORS[rand::rng().random_range(0..MEMBER_COLORS.len())];
    Member { id: client_id.to_string(), name, color: color.to_owned() }
}

// =============================================================================
// PUMPS
// =============================================================================

async fn read_pump<S>(mut stream: S, state: AppState, board: Arc<Board>, client_id: Uuid)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !process_inbound_text(&state, &board, client_id, text).await {
                    debug!(%client_id, "ws: connection reclaimed; ending read pump");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%client_id, error = %e, "ws: read failed");
                break;
            }
        }
    }
}

/// Drain the outbound queue into the socket. Every message already waiting is
/// written before a single flush. When the hub drops the queue the client gets
/// a close frame.
pub(crate) async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<OutboundMessage>)
where
    S: Sink<Message> + Unpin,
{
    while let Some(first) = rx.recv().await {
        if sink.feed(Message::Text(first)).await.is_err() {
            return;
        }
        while let Ok(next) = rx.try_recv() {
            if sink.feed(Message::Text(next)).await.is_err() {
                return;
            }
        }
        if sink.flush().await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

// =============================================================================
// INBOUND
// =============================================================================

/// Handle one inbound text message from `client_id`.
///
/// Recognized field updates are applied to the board first. The raw text is
/// then fanned out to every peer whether or not it decoded. Returns `false`
/// once the connection is no longer attached to the board; nothing is applied
/// or relayed in that case.
pub(crate) async fn process_inbound_text(
    state: &AppState,
    board: &Arc<Board>,
    client_id: Uuid,
    text: OutboundMessage,
) -> bool {
    let update = match message::decode(text.as_str()) {
        Ok(envelope) => {
            let update = FieldUpdate::decode(&envelope);
            if update.is_none() {
                debug!(board_id = %board.id, %client_id, kind = %envelope.kind, "ws: relaying without mutation");
            }
            update
        }
        Err(e) => {
            warn!(board_id = %board.id, %client_id, error = %e, "ws: undecodable message; relaying as-is");
            None
        }
    };

    let attached = match update {
        Some(update) => apply_update(&state.store, board, client_id, update).await,
        None => board.inner.read().await.clients.contains_key(&client_id),
    };
    if !attached {
        return false;
    }

    state.hub.fanout(Arc::clone(board), client_id, text).await;
    true
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
