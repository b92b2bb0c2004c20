//! A fake radio endpoint for driving the bridge's serial transport in
//! integration tests without a real `tokio-serial` port. Pair one half of
//! `tokio::io::duplex` with the bridge's injected opener and hand the other
//! half to [`FakeDevice`].

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use mc_protocol::{Direction, Frame, FrameDecoder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const SELF_INFO_CODE: u8 = 5;
const NAME_OFFSET: usize = 58;

type BoxOpenFuture<S> = Pin<Box<dyn Future<Output = std::io::Result<S>> + Send>>;

/// Build an opener for [`meshcore_bridge::supervisor::run_with_opener`] that
/// yields each stream in `streams` once, in order, then pends forever. A
/// one-element vec models a device that never drops; more elements model
/// reconnect attempts after the transport closes.
pub fn sequential_opener<S>(streams: Vec<S>) -> impl FnMut() -> BoxOpenFuture<S>
where
    S: Send + 'static,
{
    let mut streams = streams.into_iter();
    move || {
        let next = streams.next();
        Box::pin(async move {
            match next {
                Some(s) => Ok(s),
                None => std::future::pending().await,
            }
        })
    }
}

/// Build a `SelfInfo` (response code 5) payload carrying `name`, matching the
/// wire layout `decode_self_info` expects.
#[must_use]
pub fn self_info_payload(name: &str) -> Vec<u8> {
    let mut payload = vec![SELF_INFO_CODE];
    payload.resize(NAME_OFFSET, 0);
    payload.extend_from_slice(name.as_bytes());
    payload
}

pub struct FakeDevice<S> {
    stream: S,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FakeDevice<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Read bytes off the duplex until a complete frame is available.
    pub async fn recv_frame(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return frame;
            }
            let mut buf = [0u8; 4096];
            let n = self
                .stream
                .read(&mut buf)
                .await
                .expect("fake device read failed");
            assert!(n > 0, "fake device saw EOF while waiting for a frame");
            self.decoder.feed(&buf[..n]);
            self.pending.extend(self.decoder.poll());
        }
    }

    /// Write a complete `FromRadio` frame back onto the duplex.
    pub async fn send_from_radio(&mut self, payload: &[u8]) {
        let wire = mc_protocol::build(Direction::FromRadio, payload);
        self.stream
            .write_all(&wire)
            .await
            .expect("fake device write failed");
    }

    /// Consume the `AppStart` handshake frame and reply with a `SelfInfo`
    /// frame carrying `name`.
    pub async fn complete_startup_handshake(&mut self, name: &str) {
        let app_start = self.recv_frame().await;
        assert_eq!(app_start.direction, Direction::ToRadio);
        assert_eq!(app_start.payload[0], 1, "expected AppStart command byte");
        self.send_from_radio(&self_info_payload(name)).await;
    }
}
