//! Drives the fully-wired bridge over a raw TCP connection and a fake
//! radio: the TCP endpoint re-frames each decoded frame before enqueueing
//! it, so this exercises the `ToRadio` rebuild path `tcp_server.rs` owns.

use std::time::Duration;

use mc_protocol::{build_outgoing, Direction};
use mc_test_utils::{sequential_opener, FakeDevice, MockTcpClient};
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

async fn connect_with_retry(addr: &str) -> MockTcpClient {
    for _ in 0..50 {
        if let Ok(client) = MockTcpClient::connect(addr).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("tcp endpoint never came up at {addr}");
}

#[tokio::test]
async fn client_command_reaches_device_and_reply_is_unicast_back() {
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

    tokio::spawn(async move {
        let mut device = FakeDevice::new(device);
        device.complete_startup_handshake("tcp-radio").await;
        let command = device.recv_frame().await;
        assert_eq!(command.direction, Direction::ToRadio);
        assert_eq!(command.payload, vec![0x30, 0x40]);
        device.send_from_radio(&[0x01, 0xBB]).await;
    });

    let mut client = connect_with_retry(&format!("127.0.0.1:{tcp_port}")).await;
    client
        .send_bytes(&build_outgoing(&[0x30, 0x40]))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), client.recv_frame())
        .await
        .expect("reply timed out")
        .unwrap();
    assert_eq!(reply.direction, Direction::FromRadio);
    assert_eq!(reply.payload, vec![0x01, 0xBB]);
}
