//! Per-session rooms: who is listening and every action seen so far.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tutorboard_core::ServerMessage;

pub const CHANNEL_CAPACITY: usize = 256;

/// A relayed frame and the peer that produced it.
pub type Envelope = (String, ServerMessage);

pub struct Room {
    tx: broadcast::Sender<Envelope>,
    peers: HashSet<String>,
    /// Append-only action log for late joiners.
    history: Vec<Value>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, peers: HashSet::new(), history: Vec::new() }
    }
}

/// Shared relay state.
pub struct AppState {
    rooms: DashMap<String, Room>,
    /// Oldest actions are dropped beyond this many per session.
    history_cap: Option<usize>,
}

impl AppState {
    pub fn new(history_cap: Option<usize>) -> Self {
        Self { rooms: DashMap::new(), history_cap }
    }

    /// Subscribe `peer_id` to a session and snapshot its history.
    ///
    /// Both happen under the room lock, so every action is either in the
    /// snapshot or delivered through the receiver, never both or neither.
    pub fn join(&self, session_id: &str, peer_id: &str) -> (broadcast::Receiver<Envelope>, Vec<Value>) {
        let mut room = self.rooms.entry(session_id.to_string()).or_insert_with(Room::new);
        room.peers.insert(peer_id.to_string());
        (room.tx.subscribe(), room.history.clone())
    }

    /// Resubscribe a peer whose receiver lagged. The old receiver is
    /// dropped by the caller; the peer rebuilds from the returned history.
    pub fn resync(&self, session_id: &str, peer_id: &str) -> (broadcast::Receiver<Envelope>, Vec<Value>) {
        self.join(session_id, peer_id)
    }

    /// Unsubscribe a peer. The room and its history stay.
    pub fn leave(&self, session_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(session_id) {
            room.peers.remove(peer_id);
        }
    }

    /// Append an action to the session log and fan it out. Returns the log length.
    pub fn record_action(&self, session_id: &str, from: &str, action: Value) -> usize {
        let mut room = self.rooms.entry(session_id.to_string()).or_insert_with(Room::new);
        room.history.push(action.clone());
        if let Some(cap) = self.history_cap {
            let excess = room.history.len().saturating_sub(cap);
            if excess > 0 {
                room.history.drain(..excess);
            }
        }
        // No receivers is fine: nobody has asked for this session yet.
        let _ = room.tx.send((from.to_string(), ServerMessage::WhiteboardAction { action }));
        room.history.len()
    }

    pub fn history(&self, session_id: &str) -> Vec<Value> {
        self.rooms.get(session_id).map(|room| room.history.clone()).unwrap_or_default()
    }

    pub fn peer_count(&self, session_id: &str) -> usize {
        self.rooms.get(session_id).map(|room| room.peers.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
