//! Single-slot command queue: the arbiter that guarantees at most one
//! outstanding command on the serial link at any instant, while client and
//! internal submitters enqueue freely.
//!
//! Modeled on the `run_session_loop`/broadcast-registry pattern in
//! `session.rs`/`local_fanout.rs`: one `Mutex`-guarded piece of state, a
//! generation counter so a stale timer never clobbers a command that
//! already resolved, and `tokio::spawn`ed timers rather than a manual
//! event loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::client::ClientHandle;

/// One outbound command: its wire payload and the client (if any) that
/// should receive the terminal reply.
#[derive(Debug, Clone)]
pub struct Command {
    pub payload: Vec<u8>,
    pub source: Option<ClientHandle>,
}

struct Inner {
    waiters: VecDeque<Command>,
    in_flight: Option<Command>,
    startup_complete: bool,
    serial_open: bool,
    generation: u64,
}

/// The command queue. Cheap to clone (it's an `Arc` internally via
/// [`CommandQueue::new`] returning `Arc<Self>`); share one instance across
/// every client acceptor and the weather producer.
pub struct CommandQueue {
    inner: Mutex<Inner>,
    serial_tx: mpsc::UnboundedSender<Vec<u8>>,
    timeout: Duration,
}

impl CommandQueue {
    #[must_use]
    pub fn new(serial_tx: mpsc::UnboundedSender<Vec<u8>>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                waiters: VecDeque::new(),
                in_flight: None,
                startup_complete: false,
                serial_open: false,
                generation: 0,
            }),
            serial_tx,
            timeout,
        })
    }

    /// Append a command and attempt to drain immediately.
    pub async fn enqueue(self: &Arc<Self>, payload: Vec<u8>, source: Option<ClientHandle>) {
        {
            let mut inner = self.inner.lock().await;
            inner.waiters.push_back(Command { payload, source });
        }
        self.drain().await;
    }

    /// If the gate is open and nothing is in flight, pop the next waiter
    /// and write it to serial.
    pub async fn drain(self: &Arc<Self>) {
        let dispatched = {
            let mut inner = self.inner.lock().await;
            if !inner.startup_complete || inner.in_flight.is_some() || !inner.serial_open {
                return;
            }
            let Some(cmd) = inner.waiters.pop_front() else {
                return;
            };
            let payload = cmd.payload.clone();
            inner.in_flight = Some(cmd);
            inner.generation += 1;
            Some((payload, inner.generation))
        };
        let Some((payload, generation)) = dispatched else {
            return;
        };
        let _ = self.serial_tx.send(payload);
        self.spawn_timeout(generation);
    }

    /// Called by the dispatcher when a streaming response code is seen:
    /// keep `in_flight`, restart the deadline.
    pub async fn extend_timeout(self: &Arc<Self>) {
        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight.is_none() {
                return;
            }
            inner.generation += 1;
            inner.generation
        };
        self.spawn_timeout(generation);
    }

    /// Called by the dispatcher on a non-streaming reply: clear `in_flight`
    /// and release the next waiter.
    pub async fn resolve_terminal(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            inner.in_flight = None;
            inner.generation += 1;
        }
        self.drain().await;
    }

    /// The source of the command currently in flight, if any and if it has
    /// an originating client (internal submitters pass `None`).
    pub async fn in_flight_source(&self) -> Option<ClientHandle> {
        self.inner
            .lock()
            .await
            .in_flight
            .as_ref()
            .and_then(|c| c.source.clone())
    }

    /// Mark the serial transport open. Does not by itself release waiters
    /// — the startup sequencer still must complete first.
    pub async fn mark_serial_open(&self) {
        self.inner.lock().await.serial_open = true;
    }

    /// Mark the startup handshake complete and release any commands that
    /// accumulated while it was running.
    pub async fn mark_startup_complete(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            inner.startup_complete = true;
        }
        self.drain().await;
    }

    /// Full reset on serial loss: drop in-flight command, clear waiters,
    /// re-lock the startup gate.
    pub async fn reset_state(&self) {
        let mut inner = self.inner.lock().await;
        inner.in_flight = None;
        inner.waiters.clear();
        inner.startup_complete = false;
        inner.serial_open = false;
        inner.generation += 1;
    }

    fn spawn_timeout(self: &Arc<Self>, generation: u64) {
        let queue = Arc::clone(self);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            queue.on_timeout(generation).await;
        });
    }

    async fn on_timeout(self: &Arc<Self>, generation: u64) {
        let expired = {
            let mut inner = self.inner.lock().await;
            if inner.in_flight.is_some() && inner.generation == generation {
                inner.in_flight = None;
                true
            } else {
                false
            }
        };
        if expired {
            warn!("command timed out, advancing queue");
            self.drain().await;
        }
    }
}
