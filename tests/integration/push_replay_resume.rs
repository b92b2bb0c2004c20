//! Verifies the push-replay buffer's client-facing contract: a push that
//! arrived before a WS client connected is replayed once, 3s after that
//! client's first message — and TCP clients never receive a replay at all.

use std::time::Duration;

use mc_protocol::{build, build_outgoing, Direction};
use mc_test_utils::{sequential_opener, FakeDevice, MockTcpClient, MockWsClient};
use meshcore_bridge::config::{BridgeConfig, WeatherConfig};
use meshcore_bridge::supervisor;
use tokio::net::TcpListener;

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    tokio::time::sleep(Duration::from_millis(10)).await;
    port
}

fn test_config(ws_port: u16, tcp_port: u16, http_port: u16, push_buffer_path: std::path::PathBuf) -> BridgeConfig {
    BridgeConfig {
        serial_port: "unused".to_owned(),
        serial_baud: 115_200,
        http_port,
        ws_port,
        tcp_port,
        push_buffer_size: 100,
        push_buffer_path,
        command_timeout: Duration::from_secs(5),
        debug: false,
        weather: WeatherConfig {
            enabled: false,
            base_url: None,
            token: None,
            poll_interval: Duration::from_secs(900),
            channel_idx: 0,
            sensors: std::collections::HashMap::new(),
        },
    }
}

async fn connect_ws_with_retry(url: &str) -> MockWsClient {
    for _ in 0..50 {
        if let Ok(client) = MockWsClient::connect(url).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("ws endpoint never came up at {url}");
}

async fn connect_tcp_with_retry(addr: &str) -> MockTcpClient {
    for _ in 0..50 {
        if let Ok(client) = MockTcpClient::connect(addr).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("tcp endpoint never came up at {addr}");
}

fn push_payload() -> Vec<u8> {
    let mut p = vec![0xAB; 33];
    p[0] = 0x80; // Advert
    p
}

#[tokio::test]
async fn ws_client_is_replayed_buffered_push_after_delay_tcp_client_is_not() {
    let dir = tempfile::tempdir().unwrap();
    let (device, bridge_side) = tokio::io::duplex(8192);

    let ws_port = free_port().await;
    let tcp_port = free_port().await;
    let http_port = free_port().await;
    let config = test_config(ws_port, tcp_port, http_port, dir.path().join("buf.json"));

    tokio::spawn(supervisor::run_with_opener(
        config,
        sequential_opener(vec![bridge_side]),
    ));

    let (handshake_done_tx, handshake_done_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let mut device = FakeDevice::new(device);
        device.complete_startup_handshake("replay-radio").await;
        device.send_from_radio(&push_payload()).await;
        let _ = handshake_done_tx.send(());
    });
    handshake_done_rx.await.unwrap();

    let mut ws_client = connect_ws_with_retry(&format!("ws://127.0.0.1:{ws_port}/")).await;
    let mut tcp_client = connect_tcp_with_retry(&format!("127.0.0.1:{tcp_port}")).await;

    // No replay before either client has sent its first message.
    assert!(
        tokio::time::timeout(Duration::from_millis(500), ws_client.recv_binary())
            .await
            .is_err(),
        "push must not be delivered before the client's first message"
    );

    ws_client
        .send_binary(build_outgoing(&[0xFE]))
        .await
        .unwrap();
    tcp_client.send_bytes(&build_outgoing(&[0xFE])).await.unwrap();

    let replayed = tokio::time::timeout(Duration::from_secs(5), ws_client.recv_binary())
        .await
        .expect("replay timed out")
        .unwrap();
    assert_eq!(replayed, build(Direction::FromRadio, &push_payload()));

    assert!(
        tokio::time::timeout(Duration::from_secs(4), tcp_client.recv_frame())
            .await
            .is_err(),
        "tcp clients must never receive a push-buffer replay"
    );
}
