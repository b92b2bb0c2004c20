//! Verifies that losing the serial transport resets queue state and that a
//! fresh device reconnecting re-runs the startup handshake before the
//! bridge accepts new commands again.

use std::time::Duration;

use mc_protocol::{build, build_outgoing, Direction};
use mc_test_utils::{sequential_opener, FakeDevice, MockWsClient};
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

async fn connect_with_retry(url: &str) -> MockWsClient {
    for _ in 0..50 {
        if let Ok(client) = MockWsClient::connect(url).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("ws endpoint never came up at {url}");
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: x\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn device_closing_resets_state_until_reconnect_completes_fresh_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let (device1, bridge_side1) = tokio::io::duplex(8192);
    let (device2, bridge_side2) = tokio::io::duplex(8192);

    let ws_port = free_port().await;
    let tcp_port = free_port().await;
    let http_port = free_port().await;
    let http_addr: std::net::SocketAddr = format!("127.0.0.1:{http_port}").parse().unwrap();
    let config = test_config(ws_port, tcp_port, http_port, dir.path().join("buf.json"));

    tokio::spawn(supervisor::run_with_opener(
        config,
        sequential_opener(vec![bridge_side1, bridge_side2]),
    ));

    let mut client = connect_with_retry(&format!("ws://127.0.0.1:{ws_port}/")).await;

    let mut d1 = FakeDevice::new(device1);
    d1.complete_startup_handshake("first-radio").await;

    for _ in 0..50 {
        if http_get(http_addr, "/readyz").await.contains("200") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        http_get(http_addr, "/readyz").await.contains("200"),
        "bridge should be ready after first handshake"
    );

    client
        .send_binary(build_outgoing(&[0x11]))
        .await
        .unwrap();
    let command = d1.recv_frame().await;
    assert_eq!(command.payload, vec![0x11]);
    d1.send_from_radio(&[0x00]).await;
    let reply = tokio::time::timeout(Duration::from_secs(5), client.recv_binary())
        .await
        .expect("reply timed out")
        .unwrap();
    assert_eq!(reply, build(Direction::FromRadio, &[0x00]));

    // Simulate the device vanishing: drop our half so the bridge sees EOF.
    drop(d1);

    for _ in 0..50 {
        if http_get(http_addr, "/readyz").await.contains("503") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        http_get(http_addr, "/readyz").await.contains("503"),
        "readiness must drop once the serial transport is lost"
    );

    // The reconnect loop backs off for a fixed interval before reopening.
    let mut d2 = FakeDevice::new(device2);
    d2.complete_startup_handshake("second-radio").await;

    for _ in 0..200 {
        if http_get(http_addr, "/readyz").await.contains("200") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(
        http_get(http_addr, "/readyz").await.contains("200"),
        "bridge should become ready again after the second handshake"
    );

    client
        .send_binary(build_outgoing(&[0x22]))
        .await
        .unwrap();
    let command = d2.recv_frame().await;
    assert_eq!(command.payload, vec![0x22]);
    d2.send_from_radio(&[0x01]).await;
    let reply = tokio::time::timeout(Duration::from_secs(5), client.recv_binary())
        .await
        .expect("reply timed out")
        .unwrap();
    assert_eq!(reply, build(Direction::FromRadio, &[0x01]));
}
