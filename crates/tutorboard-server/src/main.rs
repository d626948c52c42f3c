//! Tutorboard WebSocket Relay Server
//!
//! Relays whiteboard actions between the peers of a session and keeps each
//! session's action log so late joiners can replay it.
//!
//! ## Protocol
//!
//! ```json
//! { "type": "whiteboard-request-history", "sessionId": "s1" }
//! { "type": "whiteboard-action", "sessionId": "s1", "action": { "type": "clear" } }
//! ```
//!
//! The first subscribes the socket to `s1` and answers with
//! `{ "type": "whiteboard-history", "history": [...] }`. The second is
//! appended to the log and forwarded to every other subscriber as
//! `{ "type": "whiteboard-action", "action": {...} }`.
//!
//! A subscriber that falls too far behind is sent the full history again
//! and rebuilds its board from it.

mod state;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use state::{AppState, Envelope};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tutorboard_core::{ClientMessage, ServerMessage};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:3030")]
    addr: SocketAddr,
    /// Keep at most this many actions per session.
    #[arg(long)]
    history_cap: Option<usize>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorboard_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let state = Arc::new(AppState::new(args.history_cap));

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("Tutorboard relay listening on {}", args.addr);
    info!("WebSocket endpoint: ws://{}/ws", args.addr);

    let listener = match tokio::net::TcpListener::bind(args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {e}", args.addr);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {e}");
    }
}

async fn index() -> &'static str {
    "Tutorboard Relay Server - Connect via WebSocket at /ws"
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health { status: "ok", sessions: state.room_count() })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize reply: {e}");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_session: Option<String> = None;
    let mut session_rx: Option<broadcast::Receiver<Envelope>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::WhiteboardRequestHistory { session_id }) => {
                            if let Some(old) = current_session.take() {
                                if old != session_id {
                                    state.leave(&old, &peer_id);
                                }
                            }
                            let (rx, history) = state.join(&session_id, &peer_id);
                            info!("Peer {} joined session {} ({} actions)", peer_id, session_id, history.len());
                            session_rx = Some(rx);
                            current_session = Some(session_id);
                            if !send_json(&mut sender, &ServerMessage::WhiteboardHistory { history }).await {
                                break;
                            }
                        }
                        Ok(ClientMessage::WhiteboardAction { session_id, action }) => {
                            let len = state.record_action(&session_id, &peer_id, action);
                            debug!("Session {} now has {} actions", session_id, len);
                        }
                        Err(e) => {
                            warn!("Invalid message from {}: {}", peer_id, e);
                            let err = ServerMessage::Error { message: format!("Invalid message: {e}") };
                            if !send_json(&mut sender, &err).await {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            msg = async {
                match &mut session_rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match msg {
                    Ok((from, server_msg)) => {
                        // Don't echo back to sender
                        if from != peer_id && !send_json(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Peer {} fell behind, {} actions skipped; resending history", peer_id, skipped);
                        let Some(session_id) = current_session.as_deref() else {
                            session_rx = None;
                            continue;
                        };
                        let (rx, history) = state.resync(session_id, &peer_id);
                        session_rx = Some(rx);
                        if !send_json(&mut sender, &ServerMessage::WhiteboardHistory { history }).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => session_rx = None,
                }
            }
        }
    }

    if let Some(ref session_id) = current_session {
        state.leave(session_id, &peer_id);
    }
    info!("Connection closed: {}", peer_id);
}
