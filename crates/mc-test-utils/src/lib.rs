//! Shared test fixtures for the bridge's integration suite.
//!
//! Provides a raw-binary WebSocket test client and a raw TCP test client,
//! both speaking the companion serial protocol's own framing rather than
//! any JSON envelope — the bridge's client endpoints are binary pass-
//! throughs, not structured message protocols.

pub mod fake_device;
pub mod mock_tcp_client;
pub mod mock_ws_client;

pub use fake_device::{self_info_payload, sequential_opener, FakeDevice};
pub use mock_tcp_client::MockTcpClient;
pub use mock_ws_client::MockWsClient;
