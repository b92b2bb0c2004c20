//! A multiplexing bridge that exposes one locally-attached MeshCore
//! companion radio to several concurrent client interfaces: a browser
//! WebSocket endpoint, a raw TCP endpoint, and an internal periodic
//! weather-report producer.
//!
//! The radio link is a single physical serial device and the companion
//! protocol carries no request identifiers, so [`queue::CommandQueue`]
//! serializes access while [`dispatch`] fans unsolicited push frames out to
//! every attached client.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod queue;
pub mod replay;
pub mod serial;
pub mod startup;
pub mod status_http;
pub mod supervisor;
pub mod tcp_server;
pub mod weather;
pub mod ws_server;

pub use client::{ClientHandle, ClientKind, ClientRegistry};
pub use config::{BridgeConfig, ConfigError};
pub use queue::CommandQueue;
