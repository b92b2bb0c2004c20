use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use meshcore_bridge::BridgeConfig;

#[tokio::main]
async fn main() {
    let config = BridgeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("FATAL: invalid configuration: {e}");
        std::process::exit(1);
    });

    let default_level = if config.debug { "debug" } else { "info" };
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| default_level.to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    info!(serial_port = %config.serial_port, "meshcore-bridge starting");

    if let Err(e) = meshcore_bridge::supervisor::run(config).await {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}
