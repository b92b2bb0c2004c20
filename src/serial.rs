//! Serial transport: open/reopen the radio device with a fixed backoff,
//! relay raw bytes in both directions.
//!
//! The open step is injected as a closure so production code drives a real
//! `tokio-serial` port while tests drive an in-memory duplex — the same
//! "abstract the transport behind something swappable" habit applied
//! at network seams elsewhere (e.g. `status_http.rs`'s `JournalAccess`
//! trait).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

const REOPEN_BACKOFF: Duration = Duration::from_secs(5);
const READ_BUF_SIZE: usize = 4096;

/// Emitted by [`run`] as the transport's session state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    Opened,
    BytesRead(Vec<u8>),
    Closed,
}

type BoxOpenFuture<S> = Pin<Box<dyn Future<Output = std::io::Result<S>> + Send>>;

/// Build an opener closure for a real serial device at `path`/`baud`,
/// suitable for passing to [`run`].
pub fn tokio_serial_opener(
    path: String,
    baud_rate: u32,
) -> impl FnMut() -> BoxOpenFuture<tokio_serial::SerialStream> {
    move || {
        let path = path.clone();
        Box::pin(async move {
            tokio_serial::new(&path, baud_rate)
                .open_native_async()
                .map_err(std::io::Error::other)
        })
    }
}

/// Drive the reconnect loop forever: open, relay bytes until the port
/// closes or errors, wait 5s, repeat. `open` is called again on every
/// attempt, including after a transport that opened successfully later
/// closes.
pub async fn run<Open, Fut, S>(
    mut open: Open,
    mut outgoing_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    event_tx: mpsc::UnboundedSender<SerialEvent>,
) where
    Open: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<S>>,
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match open().await {
            Ok(stream) => {
                info!("serial port opened");
                let _ = event_tx.send(SerialEvent::Opened);
                run_session(stream, &mut outgoing_rx, &event_tx).await;
                info!("serial port closed");
                let _ = event_tx.send(SerialEvent::Closed);
            }
            Err(e) => {
                warn!(error = %e, "failed to open serial port");
            }
        }
        tokio::time::sleep(REOPEN_BACKOFF).await;
    }
}

async fn run_session<S>(
    stream: S,
    outgoing_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    event_tx: &mpsc::UnboundedSender<SerialEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        if event_tx.send(SerialEvent::BytesRead(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                }
            }
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(bytes) => {
                        if writer.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}
