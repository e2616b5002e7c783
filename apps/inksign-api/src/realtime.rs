//! Realtime peer channel
//!
//! Each signing session is an independent broadcast channel with explicit
//! join/leave semantics; a message from one peer fans out to the other
//! members of the same session only. Sessions disappear when their last
//! peer leaves. The hub is transport-agnostic; the WebSocket handler at
//! the bottom is the only axum-aware piece.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

use crate::state::AppState;

/// Per-session channel capacity; slow peers drop old messages rather than
/// stalling the session.
const SESSION_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct PeerMessage {
    pub sender: u64,
    pub body: String,
}

struct SessionChannel {
    tx: broadcast::Sender<PeerMessage>,
    next_peer: u64,
    members: usize,
}

/// Registry of live signing sessions.
#[derive(Default)]
pub struct SessionHub {
    sessions: Mutex<HashMap<String, SessionChannel>>,
}

/// Membership in one session, produced by [`SessionHub::join`].
pub struct PeerHandle {
    pub id: u64,
    pub tx: broadcast::Sender<PeerMessage>,
    pub rx: broadcast::Receiver<PeerMessage>,
}

impl PeerHandle {
    /// Broadcast to the session; receivers filter out their own id.
    pub fn send(&self, body: String) {
        let _ = self.tx.send(PeerMessage {
            sender: self.id,
            body,
        });
    }
}

impl SessionHub {
    pub fn join(&self, session_id: &str) -> PeerHandle {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        let channel = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(SESSION_CAPACITY);
                SessionChannel {
                    tx,
                    next_peer: 0,
                    members: 0,
                }
            });
        channel.members += 1;
        let id = channel.next_peer;
        channel.next_peer += 1;
        PeerHandle {
            id,
            tx: channel.tx.clone(),
            rx: channel.tx.subscribe(),
        }
    }

    pub fn leave(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if let Some(channel) = sessions.get_mut(session_id) {
            channel.members -= 1;
            if channel.members == 0 {
                sessions.remove(session_id);
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session: String,
}

/// Handler: GET /ws?session=<id>
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| peer_loop(socket, state, query.session))
}

async fn peer_loop(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let PeerHandle {
        id: peer_id,
        tx,
        mut rx,
    } = state.hub.join(&session_id);
    debug!("Peer {} joined session {}", peer_id, session_id);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = tx.send(PeerMessage { sender: peer_id, body: text });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
            outgoing = rx.recv() => match outgoing {
                Ok(message) if message.sender != peer_id => {
                    if sink.send(Message::Text(message.body)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    debug!("Peer {} lagged, dropped {} messages", peer_id, dropped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    state.hub.leave(&session_id);
    debug!("Peer {} left session {}", peer_id, session_id);
}
