//! Fan-out: classify each `FromRadio` frame as push (broadcast + buffer) or
//! response (unicast to the originating client, or broadcast if the
//! in-flight command had no originator), and drive the command queue's
//! streaming-vs-terminal transition.
//!
//! Grounded on `local_fanout.rs`'s broadcast-to-every-consumer accept loop
//! and `cache.rs`'s `EventBus::publish` send-and-log-receiver-count idiom.

use std::sync::Arc;

use mc_protocol::{is_push, is_streaming, Direction};
use tracing::warn;

use crate::client::ClientRegistry;
use crate::queue::CommandQueue;
use crate::replay::PushBuffer;
use crate::startup::StartupGate;

/// Handle one decoded `FromRadio` frame payload.
pub async fn dispatch_from_radio(
    payload: &[u8],
    gate: &StartupGate,
    queue: &Arc<CommandQueue>,
    registry: &ClientRegistry,
    push_buffer: &Arc<PushBuffer>,
) {
    if gate.try_consume(payload).await {
        return;
    }

    let Some(&code) = payload.first() else {
        return;
    };

    let raw = mc_protocol::build(Direction::FromRadio, payload);

    if is_push(code) {
        push_buffer.push(raw.clone()).await;
        registry.broadcast(&raw).await;
        return;
    }

    match queue.in_flight_source().await {
        Some(client) => {
            if !client.send(raw) {
                warn!(client_id = client.id(), "command originator disconnected before reply delivery");
                registry.remove(client.id()).await;
            }
        }
        None => registry.broadcast(&raw).await,
    }

    if is_streaming(code) {
        queue.extend_timeout().await;
    } else {
        queue.resolve_terminal().await;
    }
}
