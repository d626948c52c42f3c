//! Messaging protocol and client-side synchronization session.
//!
//! Every local action is sent once, tagged with the session id. Peer actions
//! and the late-joiner history come back through [`SyncSession`], which hands
//! them out in the order they must be applied. Live actions that arrive while
//! the history request is outstanding are held back until the history has
//! been handed out.
//!
//! A history reply describes the whole board, so the board is rebuilt from
//! it: the caller checks [`SyncSession::take_resync`] and resets before
//! applying. Local actions sent while the reply was outstanding are not in
//! that history and are handed back after it.

use crate::action::{ActionSink, WhiteboardAction};
use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    WhiteboardAction { session_id: String, action: Value },
    WhiteboardRequestHistory { session_id: String },
}

/// Messages received from the relay.
///
/// Actions stay as raw JSON here so the relay can carry types it doesn't know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    WhiteboardAction { action: Value },
    WhiteboardHistory { history: Vec<Value> },
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    Received(ServerMessage),
    Error { message: String },
}

/// A message channel to the relay.
pub trait Transport {
    /// Queue one text frame. Fire-and-forget: success means accepted for sending.
    fn send(&mut self, msg: &str) -> Result<(), SyncError>;

    /// Drain pending events without blocking.
    fn poll_events(&mut self) -> Vec<SyncEvent>;
}

/// Client side of one whiteboard session's synchronization.
#[derive(Debug)]
pub struct SyncSession {
    session_id: String,
    state: ConnectionState,
    awaiting_history: bool,
    resync: bool,
    buffered: Vec<WhiteboardAction>,
    /// Own actions sent while the history request was outstanding.
    unconfirmed: Vec<WhiteboardAction>,
    outgoing: Vec<String>,
    sent: u64,
}

impl SyncSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: ConnectionState::Disconnected,
            awaiting_history: false,
            resync: false,
            buffered: Vec::new(),
            unconfirmed: Vec::new(),
            outgoing: Vec::new(),
            sent: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Drawing works but nothing propagates.
    pub fn is_local_only(&self) -> bool {
        !self.is_connected()
    }

    pub fn is_awaiting_history(&self) -> bool {
        self.awaiting_history
    }

    /// Whether a history reply arrived since the last call. The board must
    /// be reset before applying the actions handed out with it.
    pub fn take_resync(&mut self) -> bool {
        std::mem::take(&mut self.resync)
    }

    /// Number of actions queued for sending since the session started.
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Mark the channel open and request the session history.
    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.request_history();
    }

    /// Ask the relay for every action so far. Live actions are buffered until it arrives.
    pub fn request_history(&mut self) {
        let msg = ClientMessage::WhiteboardRequestHistory { session_id: self.session_id.clone() };
        if self.queue(&msg) {
            self.awaiting_history = true;
        }
    }

    /// Fall back to local-only mode. Queued messages are dropped.
    pub fn degrade(&mut self, reason: &str) {
        if self.state == ConnectionState::Connected {
            log::warn!("Whiteboard {} is now local-only: {reason}", self.session_id);
        }
        self.state = ConnectionState::Error;
        self.awaiting_history = false;
        self.unconfirmed.clear();
        self.outgoing.clear();
    }

    /// Close the session. Nothing is sent or buffered afterwards.
    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.awaiting_history = false;
        self.buffered.clear();
        self.unconfirmed.clear();
        self.outgoing.clear();
    }

    fn queue(&mut self, msg: &ClientMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        match serde_json::to_string(msg) {
            Ok(json) => {
                self.outgoing.push(json);
                true
            }
            Err(e) => {
                log::error!("Failed to serialize message: {e}");
                false
            }
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Feed a transport event. Returns the peer actions to apply, in order.
    pub fn handle_event(&mut self, event: SyncEvent) -> Vec<WhiteboardAction> {
        match event {
            SyncEvent::Connected => {
                self.connected();
                Vec::new()
            }
            SyncEvent::Disconnected => {
                self.degrade("disconnected");
                self.state = ConnectionState::Disconnected;
                self.flush_buffered()
            }
            SyncEvent::Error { message } => {
                self.degrade(&message);
                self.flush_buffered()
            }
            SyncEvent::Received(msg) => self.handle_server_message(msg),
        }
    }

    /// Parse and handle one raw server frame.
    pub fn handle_message(&mut self, json: &str) -> Vec<WhiteboardAction> {
        match serde_json::from_str::<ServerMessage>(json) {
            Ok(msg) => self.handle_server_message(msg),
            Err(e) => {
                log::debug!("Ignoring unparseable server message: {e}");
                Vec::new()
            }
        }
    }

    pub fn handle_server_message(&mut self, msg: ServerMessage) -> Vec<WhiteboardAction> {
        match msg {
            ServerMessage::WhiteboardAction { action } => {
                let Some(action) = WhiteboardAction::from_value(action) else {
                    return Vec::new();
                };
                if self.awaiting_history {
                    self.buffered.push(action);
                    Vec::new()
                } else {
                    vec![action]
                }
            }
            ServerMessage::WhiteboardHistory { history } => {
                let total = history.len();
                let mut actions: Vec<WhiteboardAction> =
                    history.into_iter().filter_map(WhiteboardAction::from_value).collect();
                log::debug!(
                    "Replaying {} of {total} history actions, then {} buffered and {} own",
                    actions.len(),
                    self.buffered.len(),
                    self.unconfirmed.len()
                );
                self.awaiting_history = false;
                self.resync = true;
                actions.append(&mut self.buffered);
                actions.append(&mut self.unconfirmed);
                actions
            }
            ServerMessage::Error { message } => {
                log::warn!("Relay error: {message}");
                Vec::new()
            }
        }
    }

    fn flush_buffered(&mut self) -> Vec<WhiteboardAction> {
        std::mem::take(&mut self.buffered)
    }
}

impl ActionSink for SyncSession {
    fn emit(&mut self, action: WhiteboardAction) {
        if !self.is_connected() {
            return;
        }
        let value = match serde_json::to_value(&action) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to serialize {} action: {e}", action.kind());
                return;
            }
        };
        let msg = ClientMessage::WhiteboardAction { session_id: self.session_id.clone(), action: value };
        if self.queue(&msg) {
            self.sent += 1;
            if self.awaiting_history {
                self.unconfirmed.push(action);
            }
        }
    }
}
