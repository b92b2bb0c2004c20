//! Minimal hand-rolled status HTTP surface: `/healthz`, `/readyz`,
//! `/status`. Grounded on `status_http.rs`'s raw-TCP request parsing —
//! three read-only routes don't need axum's routing machinery, the same
//! reasoning that keeps the forwarder's status endpoint hand-rolled while
//! its much larger control API reaches for axum.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mc_protocol::DeviceIdentity;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::{ClientKind, ClientRegistry};
use crate::replay::PushBuffer;

/// Holds the most recent [`DeviceIdentity`] obtained by the startup
/// sequencer, if any. Cleared on serial reset since identity is only valid
/// for the duration of one serial session.
#[derive(Clone, Default)]
pub struct IdentityCell {
    inner: Arc<Mutex<Option<DeviceIdentity>>>,
}

impl IdentityCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, identity: Option<DeviceIdentity>) {
        *self.inner.lock().await = identity;
    }

    pub async fn clear(&self) {
        *self.inner.lock().await = None;
    }

    pub async fn get(&self) -> Option<DeviceIdentity> {
        self.inner.lock().await.clone()
    }
}

/// Readiness reflects local wiring (the startup handshake attempt has
/// completed), not ongoing radio health.
#[derive(Clone, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl crate::weather::ReadinessCheck for Readiness {
    fn is_ready(&self) -> bool {
        self.is_ready()
    }
}

pub struct StatusServer {
    pub local_addr: std::net::SocketAddr,
}

pub struct StatusContext {
    pub readiness: Readiness,
    pub registry: ClientRegistry,
    pub push_buffer: Arc<PushBuffer>,
    pub weather_enabled: bool,
    pub identity: IdentityCell,
    pub weather_last_tick: crate::weather::LastTickCell,
}

impl StatusServer {
    pub async fn start(addr: std::net::SocketAddr, ctx: StatusContext) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "status http bound");
        let ctx = Arc::new(ctx);
        tokio::spawn(run_server(listener, ctx));
        Ok(Self { local_addr })
    }
}

async fn run_server(listener: TcpListener, ctx: Arc<StatusContext>) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(handle_connection(stream, ctx));
            }
            Err(e) => warn!(error = %e, "status http accept error"),
        }
    }
}

async fn handle_connection(mut stream: TcpStream, ctx: Arc<StatusContext>) {
    let mut buf = [0u8; 4096];
    let n = match stream.read(&mut buf).await {
        Ok(n) if n > 0 => n,
        _ => return,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let Some(request_line) = request.lines().next() else {
        return;
    };
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return;
    };

    let (status, content_type, body) = match (method, path) {
        ("GET", "/healthz") => ("200 OK", "text/plain", "ok".to_owned()),
        ("GET", "/readyz") => {
            if ctx.readiness.is_ready() {
                ("200 OK", "text/plain", "ready".to_owned())
            } else {
                ("503 Service Unavailable", "text/plain", "not ready".to_owned())
            }
        }
        ("GET", "/status") => {
            let ws_clients = ctx.registry.count(ClientKind::Ws).await;
            let tcp_clients = ctx.registry.count(ClientKind::Tcp).await;
            let push_buffer_len = ctx.push_buffer.len().await;
            let identity = ctx.identity.get().await.map(|id| {
                serde_json::json!({
                    "public_key": id.public_key_hex(),
                    "name": id.name,
                })
            });
            let weather_last_tick = ctx.weather_last_tick.get().await;
            let body = serde_json::json!({
                "startup_complete": ctx.readiness.is_ready(),
                "ws_clients": ws_clients,
                "tcp_clients": tcp_clients,
                "push_buffer_len": push_buffer_len,
                "weather_enabled": ctx.weather_enabled,
                "weather_last_tick": weather_last_tick,
                "device_identity": identity,
            })
            .to_string();
            ("200 OK", "application/json", body)
        }
        _ => ("404 Not Found", "text/plain", "not found".to_owned()),
    };

    let _ = send_response(&mut stream, status, content_type, &body).await;
}

async fn send_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await
}
