//! Native WebSocket transport.
//!
//! A background thread owns the socket; the caller talks to it through
//! channels and polls for events once per frame.

use crate::error::SyncError;
use crate::sync::{ConnectionState, ServerMessage, SyncEvent, Transport};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// How long a read may block before queued sends get a turn.
const READ_POLL: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Send(String),
    Close,
}

/// Check that `url` is a ws:// or wss:// URL.
pub fn validate_url(url: &str) -> Result<Url, SyncError> {
    let parsed = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(SyncError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

fn open_socket(url: &str) -> Result<Socket, String> {
    let (mut socket, response) = tungstenite::connect(url).map_err(|e| format!("Connection failed: {e}"))?;
    log::info!("Connected to {url} ({})", response.status());
    if let MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        if let Err(e) = tcp.set_read_timeout(Some(READ_POLL)).and(tcp.set_write_timeout(Some(WRITE_TIMEOUT))) {
            log::warn!("Could not set socket timeouts: {e}");
        }
    }
    Ok(socket)
}

/// Write every queued command. Returns `false` once the socket is done.
fn flush_commands(socket: &mut Socket, commands: &Receiver<Command>, events: &Sender<SyncEvent>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Send(text)) => {
                if let Err(e) = socket.send(Message::Text(text)) {
                    log::error!("Relay send failed: {e}");
                    let _ = events.send(SyncEvent::Error { message: format!("Send failed: {e}") });
                    return false;
                }
            }
            Ok(Command::Close) => {
                let _ = socket.close(None);
                return false;
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Wait briefly for one frame and forward it. Returns `false` once the socket is done.
fn read_frame(socket: &mut Socket, events: &Sender<SyncEvent>) -> bool {
    match socket.read() {
        Ok(Message::Text(text)) => {
            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => {
                    let _ = events.send(SyncEvent::Received(msg));
                }
                Err(e) => log::warn!("Dropping unreadable relay frame: {e}"),
            }
            true
        }
        Ok(Message::Close(_)) => false,
        Ok(_) => true,
        Err(tungstenite::Error::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => true,
        Err(e) => {
            log::error!("Relay read failed: {e}");
            false
        }
    }
}

fn run_socket(url: String, commands: Receiver<Command>, events: Sender<SyncEvent>) {
    let mut socket = match open_socket(&url) {
        Ok(socket) => socket,
        Err(message) => {
            log::error!("{message}");
            let _ = events.send(SyncEvent::Error { message });
            return;
        }
    };
    let _ = events.send(SyncEvent::Connected);
    while flush_commands(&mut socket, &commands, &events) && read_frame(&mut socket, &events) {}
    log::info!("Relay socket to {url} closed");
    let _ = events.send(SyncEvent::Disconnected);
}

/// Relay client whose socket lives on a worker thread.
pub struct NativeWebSocket {
    state: ConnectionState,
    commands: Option<Sender<Command>>,
    events: Option<Receiver<SyncEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    pub fn new() -> Self {
        Self { state: ConnectionState::Disconnected, commands: None, events: None, worker: None }
    }

    /// Start connecting. Completion is reported as [`SyncEvent::Connected`].
    pub fn connect(&mut self, url: &str) -> Result<(), SyncError> {
        if self.commands.is_some() {
            return Err(SyncError::AlreadyConnected);
        }
        let url = validate_url(url)?.to_string();
        let (command_tx, command_rx) = channel();
        let (event_tx, event_rx) = channel();
        self.worker = Some(thread::spawn(move || run_socket(url, command_rx, event_tx)));
        self.commands = Some(command_tx);
        self.events = Some(event_rx);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Ask the worker to close the socket. It exits on its own.
    pub fn disconnect(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        self.events = None;
        self.worker = None;
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Transport for NativeWebSocket {
    fn send(&mut self, msg: &str) -> Result<(), SyncError> {
        let commands = self.commands.as_ref().ok_or(SyncError::NotConnected)?;
        commands
            .send(Command::Send(msg.to_string()))
            .map_err(|_| SyncError::Transport("relay worker has stopped".to_string()))
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        let Some(events) = self.events.as_ref() else {
            return Vec::new();
        };
        let drained: Vec<SyncEvent> = events.try_iter().collect();
        for event in &drained {
            match event {
                SyncEvent::Connected => self.state = ConnectionState::Connected,
                SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                SyncEvent::Received(_) => {}
            }
        }
        drained
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}
