//! Bounded, persisted FIFO of push frames, replayed once to each newly
//! connected WebSocket client.
//!
//! Grounded on `replay.rs`'s epoch-grouped replay query for the general
//! shape of "replay what accumulated while you were away", and on
//! `db.rs`'s thiserror-based error enum, but the storage medium here is
//! a single JSON file rather than a SQL journal — this bridge keeps no
//! database.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mc_protocol::PushEntry;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("io error persisting push buffer: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize push buffer: {0}")]
    Serialize(#[from] serde_json::Error),
}

const DEBOUNCE: Duration = Duration::from_secs(5);

struct Inner {
    entries: VecDeque<PushEntry>,
    capacity: usize,
    path: PathBuf,
    dirty_since: Option<Instant>,
}

/// The push-replay buffer. `spawn_debounce_task` should be called once at
/// startup to persist changes 5s after the last mutation.
pub struct PushBuffer {
    inner: Mutex<Inner>,
}

impl PushBuffer {
    /// Load from `path`, tolerating a missing or corrupt file as empty.
    pub async fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let entries = load_entries(&path).await.unwrap_or_else(|e| {
            debug!(error = %e, "push buffer file missing or corrupt, starting empty");
            VecDeque::new()
        });
        Self {
            inner: Mutex::new(Inner {
                entries,
                capacity,
                path,
                dirty_since: None,
            }),
        }
    }

    /// Append one frame, evicting the oldest if over capacity.
    pub async fn push(&self, frame: Vec<u8>) {
        let mut inner = self.inner.lock().await;
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(PushEntry {
            frame,
            timestamp_ms: Utc::now().timestamp_millis(),
        });
        inner.dirty_since = Some(Instant::now());
    }

    /// Snapshot of every buffered entry, oldest first.
    pub async fn snapshot(&self) -> Vec<PushEntry> {
        self.inner.lock().await.entries.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Flush to disk immediately regardless of debounce state. Called on
    /// graceful shutdown.
    pub async fn flush(&self) -> Result<(), ReplayError> {
        let (path, entries) = {
            let mut inner = self.inner.lock().await;
            inner.dirty_since = None;
            (inner.path.clone(), inner.entries.iter().cloned().collect::<Vec<_>>())
        };
        write_entries(&path, &entries).await
    }

    /// Background task: wake periodically and flush if 5s have passed
    /// since the last mutation.
    pub async fn run_debounced_persistence(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            let due = {
                let inner = self.inner.lock().await;
                inner
                    .dirty_since
                    .is_some_and(|since| since.elapsed() >= DEBOUNCE)
            };
            if due {
                if let Err(e) = self.flush().await {
                    warn!(error = %e, "failed to persist push buffer");
                }
            }
        }
    }
}

async fn load_entries(path: &Path) -> Result<VecDeque<PushEntry>, ReplayError> {
    let bytes = tokio::fs::read(path).await?;
    let entries: Vec<PushEntry> = serde_json::from_slice(&bytes)?;
    Ok(entries.into())
}

async fn write_entries(path: &Path, entries: &[PushEntry]) -> Result<(), ReplayError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(entries)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
