use mc_protocol::FrameDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A raw TCP client that speaks the companion serial protocol's own framing
/// directly over the socket, matching a real always-on TCP consumer.
pub struct MockTcpClient {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl MockTcpClient {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
        })
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Read from the socket until at least one complete frame has been
    /// decoded, returning it.
    pub async fn recv_frame(&mut self) -> std::io::Result<mc_protocol::Frame> {
        loop {
            let frames = self.decoder.poll();
            if let Some(frame) = frames.into_iter().next() {
                return Ok(frame);
            }
            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed",
                ));
            }
            self.decoder.feed(&buf[..n]);
        }
    }
}
