use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A minimal WebSocket client for exercising the bridge's WS endpoint in
/// integration tests: every send/recv is one raw binary frame.
pub struct MockWsClient {
    ws: WsStream,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.ws.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    /// Wait for the next binary message, skipping pings/pongs.
    pub async fn recv_binary(&mut self) -> anyhow::Result<Vec<u8>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(b))) => return Ok(b.to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    anyhow::bail!("unexpected message variant: {other:?}")
                }
                Some(Err(e)) => return Err(e.into()),
                None => anyhow::bail!("connection closed"),
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
