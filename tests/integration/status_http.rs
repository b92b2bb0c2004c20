//! Exercises the status HTTP surface through the fully-wired bridge rather
//! than in isolation: readiness before/after the handshake, and client
//! counts reflecting a real connected WS client.

use std::time::Duration;

use mc_test_utils::{sequential_opener, FakeDevice, MockWsClient};
use meshcore_bridge::config::{BridgeConfig, WeatherConfig};
use meshcore_bridge::supervisor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
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

async fn http_get(addr: std::net::SocketAddr, path: &str) -> (String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: x\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let text = String::from_utf8(response).unwrap();
    let mut parts = text.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap().to_owned();
    let body = parts.next().unwrap_or("").to_owned();
    (head, body)
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

async fn wait_for_http(addr: std::net::SocketAddr) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("status http never came up at {addr}");
}

#[tokio::test]
async fn healthz_is_immediate_readyz_follows_handshake_status_reports_client_count() {
    let dir = tempfile::tempdir().unwrap();
    let (device, bridge_side) = tokio::io::duplex(8192);

    let ws_port = free_port().await;
    let tcp_port = free_port().await;
    let http_port = free_port().await;
    let http_addr: std::net::SocketAddr = format!("127.0.0.1:{http_port}").parse().unwrap();
    let config = test_config(ws_port, tcp_port, http_port, dir.path().join("buf.json"));

    tokio::spawn(supervisor::run_with_opener(
        config,
        sequential_opener(vec![bridge_side]),
    ));

    wait_for_http(http_addr).await;

    let (head, body) = http_get(http_addr, "/healthz").await;
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, "ok");

    let (head, _) = http_get(http_addr, "/readyz").await;
    assert!(
        head.starts_with("HTTP/1.1 503"),
        "must not be ready before the startup handshake completes"
    );

    tokio::spawn(async move {
        let mut device = FakeDevice::new(device);
        device.complete_startup_handshake("status-radio").await;
    });

    let mut ready = false;
    for _ in 0..50 {
        let (head, _) = http_get(http_addr, "/readyz").await;
        if head.starts_with("HTTP/1.1 200") {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(ready, "bridge should become ready after the handshake");

    let _client = connect_with_retry(&format!("ws://127.0.0.1:{ws_port}/")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_, body) = http_get(http_addr, "/status").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ws_clients"], 1);
    assert_eq!(json["tcp_clients"], 0);
    assert_eq!(json["weather_enabled"], false);
    assert_eq!(json["startup_complete"], true);
}
