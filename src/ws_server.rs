//! WebSocket acceptor. Each inbound binary message is one complete
//! outbound frame (already framed by the browser polyfill); each client is
//! replayed the push buffer once, 3s after its first message.
//!
//! Grounded on `session.rs`'s `run_session_loop` — a `tokio::select!` over
//! the socket and an outbound channel, responding to ping/close directly.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::{ClientHandle, ClientKind, ClientRegistry};
use crate::queue::CommandQueue;
use crate::replay::PushBuffer;

const REPLAY_DELAY: Duration = Duration::from_secs(3);

/// Everything a WS connection handler needs, bundled so the axum handler
/// signature stays small.
#[derive(Clone)]
pub struct WsState {
    pub queue: Arc<CommandQueue>,
    pub registry: ClientRegistry,
    pub push_buffer: Arc<PushBuffer>,
}

pub fn router(state: WsState) -> Router {
    Router::new().route("/", get(upgrade)).with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let handle = state.registry.register(ClientKind::Ws, tx).await;
    let mut replayed = false;

    loop {
        tokio::select! {
            biased;
            outgoing = rx.recv() => {
                match outgoing {
                    Some(bytes) => {
                        if sink.send(Message::Binary(bytes.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        state.queue.enqueue(bytes.to_vec(), Some(handle.clone())).await;
                        if !replayed {
                            replayed = true;
                            schedule_replay(state.push_buffer.clone(), handle.clone());
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Text(_))) => {
                        debug!("ignoring unexpected text frame on binary WS endpoint");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "ws read error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.remove(handle.id()).await;
}

fn schedule_replay(push_buffer: Arc<PushBuffer>, handle: ClientHandle) {
    tokio::spawn(async move {
        tokio::time::sleep(REPLAY_DELAY).await;
        for entry in push_buffer.snapshot().await {
            if !handle.send(entry.frame) {
                break;
            }
        }
    });
}
