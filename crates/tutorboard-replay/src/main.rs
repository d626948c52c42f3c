//! Replays a session history onto a blank board and writes the result as an
//! image. The history comes from a saved file or straight from a running
//! relay. Useful to check what a late joiner would see.

use clap::Parser;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tutorboard_core::media::{self, ExportFormat};
use tutorboard_core::{
    ClientMessage, MediaError, NativeWebSocket, ServerMessage, SyncError, SyncEvent, Transport, Whiteboard,
    WhiteboardAction, WhiteboardConfig,
};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Expected an action array or a whiteboard-history message")]
    UnknownFormat,
    #[error("Export failed: {0}")]
    Media(#[from] MediaError),
    #[error("Relay error: {0}")]
    Sync(#[from] SyncError),
    #[error("Relay closed before sending the history")]
    RelayClosed,
    #[error("No history from the relay after {0:?}")]
    Timeout(Duration),
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// History file: a JSON array of actions or a `whiteboard-history` frame.
    #[arg(required_unless_present = "relay", conflicts_with = "relay")]
    input: Option<PathBuf>,
    /// Fetch the history from a running relay instead, e.g. ws://localhost:3030/ws.
    #[arg(long, requires = "session")]
    relay: Option<String>,
    /// Session to fetch from the relay.
    #[arg(long)]
    session: Option<String>,
    /// Seconds to wait for the relay.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Where to write the image. The extension picks PNG or JPEG.
    #[arg(long, short, default_value = "replay.png")]
    output: PathBuf,
    /// Board configuration (JSON). Defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Counts from one replay run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub total: usize,
    pub applied: usize,
    pub skipped: usize,
}

/// Extract the raw actions from a history file.
pub fn parse_history(json: &str) -> Result<Vec<Value>, ReplayError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(actions) => Ok(actions),
        other => match serde_json::from_value::<ServerMessage>(other) {
            Ok(ServerMessage::WhiteboardHistory { history }) => Ok(history),
            _ => Err(ReplayError::UnknownFormat),
        },
    }
}

/// Ask a relay for a session's history over a fresh connection.
pub fn fetch_history(url: &str, session_id: &str, timeout: Duration) -> Result<Vec<Value>, ReplayError> {
    let mut ws = NativeWebSocket::new();
    ws.connect(url)?;
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        for event in ws.poll_events() {
            match event {
                SyncEvent::Connected => {
                    let request = ClientMessage::WhiteboardRequestHistory { session_id: session_id.to_string() };
                    ws.send(&serde_json::to_string(&request)?)?;
                }
                SyncEvent::Received(ServerMessage::WhiteboardHistory { history }) => return Ok(history),
                SyncEvent::Received(ServerMessage::Error { message }) => log::warn!("Relay says: {message}"),
                SyncEvent::Received(ServerMessage::WhiteboardAction { .. }) => {}
                SyncEvent::Error { message } => return Err(SyncError::Transport(message).into()),
                SyncEvent::Disconnected => return Err(ReplayError::RelayClosed),
            }
        }
        thread::sleep(Duration::from_millis(10));
    }
    Err(ReplayError::Timeout(timeout))
}

/// Apply every recognisable action, in order, to `board`.
pub fn replay(board: &mut Whiteboard, history: Vec<Value>) -> ReplayStats {
    let mut stats = ReplayStats { total: history.len(), ..ReplayStats::default() };
    for value in history {
        let applied = WhiteboardAction::from_value(value).is_some_and(|action| board.apply_remote(&action));
        if applied {
            stats.applied += 1;
        } else {
            stats.skipped += 1;
        }
    }
    stats
}

fn export_format(path: &Path) -> ExportFormat {
    match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => ExportFormat::Jpeg,
        _ => ExportFormat::Png,
    }
}

/// Write the committed surface of `board` to `path`.
pub fn write_image(board: &Whiteboard, path: &Path) -> Result<(), ReplayError> {
    let uri = board.export(export_format(path))?;
    let (_, bytes) = media::decode_data_uri(&uri)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn run(args: Args) -> Result<ReplayStats, ReplayError> {
    let config = match &args.config {
        Some(path) => WhiteboardConfig::from_json(&fs::read_to_string(path)?)?,
        None => WhiteboardConfig::default(),
    };
    let history = match (&args.relay, &args.input) {
        (Some(url), _) => {
            let session = args.session.as_deref().unwrap_or_default();
            fetch_history(url, session, Duration::from_secs(args.timeout))?
        }
        (None, Some(path)) => parse_history(&fs::read_to_string(path)?)?,
        (None, None) => return Err(ReplayError::UnknownFormat),
    };
    let mut board = Whiteboard::new(config, "replay");
    let stats = replay(&mut board, history);
    log::info!(
        "Replayed {} of {} actions ({} stickies, {} documents on top)",
        stats.applied,
        stats.total,
        board.objects().sticky_count(),
        board.objects().document_count()
    );
    write_image(&board, &args.output)?;
    Ok(stats)
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let output = args.output.clone();
    match run(args) {
        Ok(stats) => {
            if stats.skipped > 0 {
                log::warn!("{} actions were skipped", stats.skipped);
            }
            println!("Wrote {}", output.display());
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tutorboard_core::Rgba;

    fn red_line() -> Value {
        json!([
            { "type": "start", "point": { "x": 10.0, "y": 10.0 }, "tool": "pen",
              "color": "#ff0000", "lineWidth": 6.0, "opacity": 1.0 },
            { "type": "draw", "from": { "x": 10.0, "y": 10.0 }, "to": { "x": 60.0, "y": 10.0 },
              "tool": "pen", "color": "#ff0000", "lineWidth": 6.0, "opacity": 1.0 },
            { "type": "end" },
            { "type": "laser-dot" }
        ])
    }

    #[test]
    fn test_parse_both_formats() {
        let bare = red_line().to_string();
        assert_eq!(parse_history(&bare).unwrap().len(), 4);

        let framed = json!({ "type": "whiteboard-history", "history": red_line() }).to_string();
        assert_eq!(parse_history(&framed).unwrap().len(), 4);

        assert!(matches!(parse_history(r#"{"type":"error","message":"x"}"#), Err(ReplayError::UnknownFormat)));
        assert!(matches!(parse_history("nope"), Err(ReplayError::Json(_))));
    }

    #[test]
    fn test_replay_and_write_png() {
        let config = WhiteboardConfig::default().with_size(80, 40);
        let mut board = Whiteboard::new(config, "replay");
        let stats = replay(&mut board, parse_history(&red_line().to_string()).unwrap());
        assert_eq!(stats, ReplayStats { total: 4, applied: 3, skipped: 1 });
        assert_eq!(board.canvas().committed().pixel(35, 10), Some(Rgba::new(255, 0, 0, 255)));

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("board.png");
        write_image(&board, &out).unwrap();
        let bytes = fs::read(&out).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_fetch_history_from_relay() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            let request: ClientMessage = serde_json::from_str(&socket.read().unwrap().into_text().unwrap()).unwrap();
            let reply = json!({ "type": "whiteboard-history", "history": red_line() }).to_string();
            socket.send(tungstenite::Message::Text(reply)).unwrap();
            while socket.read().is_ok() {}
            request
        });

        let history = fetch_history(&format!("ws://{addr}/ws"), "lesson-7", Duration::from_secs(5)).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(relay.join().unwrap(), ClientMessage::WhiteboardRequestHistory { session_id: "lesson-7".into() });
    }

    #[test]
    fn test_fetch_history_rejects_bad_url() {
        assert!(matches!(
            fetch_history("http://localhost/ws", "s", Duration::from_secs(1)),
            Err(ReplayError::Sync(SyncError::InvalidUrl(_)))
        ));
    }

    #[test]
    fn test_args_need_file_or_relay() {
        assert!(Args::try_parse_from(["tutorboard-replay"]).is_err());
        assert!(Args::try_parse_from(["tutorboard-replay", "--relay", "ws://x/ws"]).is_err());
        let args = Args::try_parse_from(["tutorboard-replay", "--relay", "ws://x/ws", "--session", "s1"]).unwrap();
        assert!(args.input.is_none());
        assert!(Args::try_parse_from(["tutorboard-replay", "history.json"]).is_ok());
    }

    #[test]
    fn test_run_with_config_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("history.json");
        let config = dir.path().join("board.json");
        let output = dir.path().join("board.JPG");
        fs::write(&input, red_line().to_string()).unwrap();
        fs::write(&config, r#"{ "width": 64, "height": 32 }"#).unwrap();

        let args = Args {
            input: Some(input),
            relay: None,
            session: None,
            timeout: 10,
            output: output.clone(),
            config: Some(config),
        };
        let stats = run(args).unwrap();
        assert_eq!(stats.applied, 3);
        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }
}
