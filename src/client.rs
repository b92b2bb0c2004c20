//! Client identity and registries for the WS and TCP acceptors.
//!
//! A [`ClientHandle`] is a thin, cloneable capability: an id for set
//! membership and an outbound channel. The acceptor that owns the real
//! socket drains that channel into the wire; the command queue and
//! dispatcher never touch sockets directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    Ws,
    Tcp,
}

#[derive(Clone)]
pub struct ClientHandle {
    id: u64,
    kind: ClientKind,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ClientHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    /// Best-effort send; `false` means the client's socket task is gone and
    /// the caller should drop this handle.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.tx.send(bytes).is_ok()
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ClientHandle {}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Tracks every connected WS and TCP client for broadcast fan-out, and
/// mints fresh ids on accept.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    next_id: Arc<AtomicU64>,
    inner: Arc<Mutex<HashMap<u64, ClientHandle>>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly-accepted client, returning its handle. `tx` is the
    /// sending half of a channel the acceptor reads from to write to the
    /// real socket.
    pub async fn register(&self, kind: ClientKind, tx: mpsc::UnboundedSender<Vec<u8>>) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = ClientHandle { id, kind, tx };
        self.inner.lock().await.insert(id, handle.clone());
        handle
    }

    pub async fn remove(&self, id: u64) {
        self.inner.lock().await.remove(&id);
    }

    /// Broadcast `bytes` to every currently-registered client, dropping any
    /// whose channel has closed.
    pub async fn broadcast(&self, bytes: &[u8]) {
        let mut dead = Vec::new();
        {
            let clients = self.inner.lock().await;
            for (id, client) in clients.iter() {
                if !client.send(bytes.to_vec()) {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            self.remove(id).await;
        }
    }

    pub async fn count(&self, kind: ClientKind) -> usize {
        self.inner
            .lock()
            .await
            .values()
            .filter(|c| c.kind() == kind)
            .count()
    }
}
