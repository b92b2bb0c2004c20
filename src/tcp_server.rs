//! Raw TCP acceptor. Unlike the WS endpoint, TCP is a byte stream: each
//! socket owns its own frame accumulator and reframes complete commands
//! before enqueueing them. TCP clients are never replayed the push buffer
//! — they're assumed to be always-on daemons processing the live stream.
//!
//! Grounded on `local_proxy.rs`'s accept loop and `watch`-channel shutdown.

use std::sync::Arc;

use mc_protocol::{Direction, FrameDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::{ClientKind, ClientRegistry};
use crate::queue::CommandQueue;

const READ_BUF_SIZE: usize = 4096;

/// Bind `addr` and accept TCP clients until `shutdown` fires.
pub async fn run(
    addr: std::net::SocketAddr,
    queue: Arc<CommandQueue>,
    registry: ClientRegistry,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "tcp acceptor bound");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if registry.count(ClientKind::Tcp).await > 0 {
                            warn!(%peer, "second TCP client connected; command responses will interleave at command granularity");
                        }
                        debug!(%peer, "tcp client connected");
                        let queue = Arc::clone(&queue);
                        let registry = registry.clone();
                        tokio::spawn(serve_client(stream, queue, registry));
                    }
                    Err(e) => warn!(error = %e, "tcp accept error"),
                }
            }
        }
    }
    Ok(())
}

async fn serve_client(stream: tokio::net::TcpStream, queue: Arc<CommandQueue>, registry: ClientRegistry) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let handle = registry.register(ClientKind::Tcp, tx).await;
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        tokio::select! {
            biased;
            outgoing = rx.recv() => {
                match outgoing {
                    Some(bytes) => {
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            read = read_half.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        decoder.feed(&buf[..n]);
                        for frame in decoder.poll() {
                            let rebuilt = mc_protocol::build(Direction::ToRadio, &frame.payload);
                            queue.enqueue(rebuilt, Some(handle.clone())).await;
                        }
                    }
                }
            }
        }
    }

    registry.remove(handle.id()).await;
}
