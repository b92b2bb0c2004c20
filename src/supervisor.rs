//! Wires every component together: owns the serial event loop, runs the
//! startup sequencer on each session, resets state on serial loss, and
//! handles graceful shutdown.
//!
//! Grounded on `control_api.rs`'s `AppState` — one struct holding every
//! `Arc`/channel the rest of the process needs — and its
//! `watch::Sender<bool>` shutdown broadcast.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use mc_protocol::FrameDecoder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::client::ClientRegistry;
use crate::config::BridgeConfig;
use crate::dispatch::dispatch_from_radio;
use crate::queue::CommandQueue;
use crate::replay::PushBuffer;
use crate::serial::{self, SerialEvent};
use crate::startup::{run_startup_sequence, StartupGate};
use crate::status_http::{IdentityCell, Readiness, StatusContext, StatusServer};
use crate::{tcp_server, weather, ws_server};

const APP_NAME: &str = "meshcore-bridge";

/// Build and run every component against the real serial device named in
/// `config`, until a shutdown signal arrives.
pub async fn run(config: BridgeConfig) -> std::io::Result<()> {
    let opener = serial::tokio_serial_opener(config.serial_port.clone(), config.serial_baud);
    run_with_opener(config, opener).await
}

/// Same as [`run`], but the serial transport is opened by `open` instead of
/// a real `tokio-serial` port. Lets tests drive the fully-wired bridge over
/// an in-memory duplex, the same substitution [`serial::run`] itself takes.
pub async fn run_with_opener<Open, Fut, S>(config: BridgeConfig, open: Open) -> std::io::Result<()>
where
    Open: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = std::io::Result<S>> + Send,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (serial_outgoing_tx, serial_outgoing_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let queue = CommandQueue::new(serial_outgoing_tx.clone(), config.command_timeout);
    let registry = ClientRegistry::new();
    let push_buffer = Arc::new(PushBuffer::load(&config.push_buffer_path, config.push_buffer_size).await);
    let gate = StartupGate::new();
    let readiness = Readiness::new();
    let identity = IdentityCell::new();
    let weather_last_tick = weather::LastTickCell::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(Arc::clone(&push_buffer).run_debounced_persistence());

    let (serial_event_tx, serial_event_rx) = mpsc::unbounded_channel();
    tokio::spawn(serial::run(open, serial_outgoing_rx, serial_event_tx));

    tokio::spawn(serial_event_loop(
        serial_event_rx,
        Arc::clone(&queue),
        gate.clone(),
        registry.clone(),
        Arc::clone(&push_buffer),
        serial_outgoing_tx.clone(),
        readiness.clone(),
        identity.clone(),
    ));

    let ws_state = ws_server::WsState {
        queue: Arc::clone(&queue),
        registry: registry.clone(),
        push_buffer: Arc::clone(&push_buffer),
    };
    let ws_addr = SocketAddr::from(([0, 0, 0, 0], config.ws_port));
    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await?;
    info!(addr = %ws_addr, "ws acceptor bound");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(ws_listener, ws_server::router(ws_state)).await {
            warn!(error = %e, "ws acceptor exited");
        }
    });

    let tcp_addr = SocketAddr::from(([0, 0, 0, 0], config.tcp_port));
    let tcp_queue = Arc::clone(&queue);
    let tcp_registry = registry.clone();
    let tcp_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = tcp_server::run(tcp_addr, tcp_queue, tcp_registry, tcp_shutdown).await {
            warn!(error = %e, "tcp acceptor exited");
        }
    });

    let status_ctx = StatusContext {
        readiness: readiness.clone(),
        registry: registry.clone(),
        push_buffer: Arc::clone(&push_buffer),
        weather_enabled: config.weather.enabled,
        identity: identity.clone(),
        weather_last_tick: weather_last_tick.clone(),
    };
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    StatusServer::start(http_addr, status_ctx).await?;

    if config.weather.enabled {
        let http_client = reqwest::Client::new();
        let weather_readiness: Arc<dyn weather::ReadinessCheck> = Arc::new(readiness.clone());
        tokio::spawn(weather::run(
            config.weather.clone(),
            Arc::clone(&queue),
            weather_readiness,
            http_client,
            weather_last_tick.clone(),
        ));
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, flushing state");
    let _ = shutdown_tx.send(true);
    if let Err(e) = push_buffer.flush().await {
        warn!(error = %e, "failed to flush push buffer on shutdown");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn serial_event_loop(
    mut events: mpsc::UnboundedReceiver<SerialEvent>,
    queue: Arc<CommandQueue>,
    gate: StartupGate,
    registry: ClientRegistry,
    push_buffer: Arc<PushBuffer>,
    serial_outgoing_tx: mpsc::UnboundedSender<Vec<u8>>,
    readiness: Readiness,
    identity: IdentityCell,
) {
    let mut decoder = FrameDecoder::new();
    while let Some(event) = events.recv().await {
        match event {
            SerialEvent::Opened => {
                queue.mark_serial_open().await;
                let queue = Arc::clone(&queue);
                let gate = gate.clone();
                let readiness = readiness.clone();
                let identity = identity.clone();
                let serial_outgoing_tx = serial_outgoing_tx.clone();
                tokio::spawn(async move {
                    let obtained =
                        run_startup_sequence(&serial_outgoing_tx, &gate, &queue, APP_NAME).await;
                    identity.set(obtained).await;
                    readiness.set_ready(true);
                });
            }
            SerialEvent::BytesRead(bytes) => {
                decoder.feed(&bytes);
                for frame in decoder.poll() {
                    dispatch_from_radio(&frame.payload, &gate, &queue, &registry, &push_buffer).await;
                }
            }
            SerialEvent::Closed => {
                decoder.reset();
                queue.reset_state().await;
                readiness.set_ready(false);
                identity.clear().await;
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
