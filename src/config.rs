//! Environment-variable configuration, following the same
//! raw-then-validated staging the rest of this codebase family uses for its
//! TOML-backed configs, adapted to `std::env` as the source per this
//! bridge's deployment model.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

/// Fully validated bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub serial_port: String,
    pub serial_baud: u32,
    pub http_port: u16,
    pub ws_port: u16,
    pub tcp_port: u16,
    pub push_buffer_size: usize,
    pub push_buffer_path: PathBuf,
    pub command_timeout: Duration,
    pub debug: bool,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub channel_idx: u8,
    /// Logical sensor key (`temperature`, `humidity`, ...) -> external
    /// entity id, from `WEATHER_SENSOR_<KEY>`.
    pub sensors: HashMap<String, String>,
}

const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
const DEFAULT_SERIAL_BAUD: u32 = 115_200;
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_WS_PORT: u16 = 3000;
const DEFAULT_TCP_PORT: u16 = 5000;
const DEFAULT_PUSH_BUFFER_SIZE: usize = 1000;
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WEATHER_POLL_INTERVAL_MS: u64 = 900_000;
const DEFAULT_WEATHER_CHANNEL_IDX: u8 = 0;

pub const KNOWN_SENSOR_KEYS: [&str; 11] = [
    "temperature",
    "humidity",
    "wind_speed",
    "wind_gust",
    "wind_bearing",
    "pressure",
    "uv",
    "rain_rate",
    "rain_daily",
    "solar_radiation",
    "dew_point",
];

impl BridgeConfig {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(&std::env::vars().collect())
    }

    /// Testable entry point: load from an explicit key/value map instead of
    /// the real process environment.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let serial_port = vars
            .get("SERIAL_PORT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERIAL_PORT.to_owned());

        let serial_baud = parse_or_default(vars, "SERIAL_BAUD", DEFAULT_SERIAL_BAUD)?;
        let http_port = parse_or_default(vars, "HTTP_PORT", DEFAULT_HTTP_PORT)?;
        let ws_port = parse_or_default(vars, "WS_PORT", DEFAULT_WS_PORT)?;
        let tcp_port = parse_or_default(vars, "TCP_PORT", DEFAULT_TCP_PORT)?;
        let push_buffer_size =
            parse_or_default(vars, "PUSH_BUFFER_SIZE", DEFAULT_PUSH_BUFFER_SIZE)?;
        let command_timeout_ms =
            parse_or_default(vars, "COMMAND_TIMEOUT_MS", DEFAULT_COMMAND_TIMEOUT_MS)?;
        let debug = vars.contains_key("DEBUG");

        let push_buffer_path = vars
            .get("PUSH_BUFFER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_push_buffer_path);

        let weather = WeatherConfig::from_env_map(vars)?;

        Ok(Self {
            serial_port,
            serial_baud,
            http_port,
            ws_port,
            tcp_port,
            push_buffer_size,
            push_buffer_path,
            command_timeout: Duration::from_millis(command_timeout_ms),
            debug,
            weather,
        })
    }
}

impl WeatherConfig {
    /// Misconfiguration (enabled with no sensors) is logged and disables the
    /// producer rather than failing the whole bridge's config load.
    fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut enabled = vars
            .get("WEATHER_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let base_url = vars.get("WEATHER_BASE_URL").cloned();
        let token = vars.get("WEATHER_TOKEN").cloned();
        let poll_interval_ms = parse_or_default(
            vars,
            "WEATHER_POLL_INTERVAL_MS",
            DEFAULT_WEATHER_POLL_INTERVAL_MS,
        )?;
        let channel_idx = parse_or_default(
            vars,
            "WEATHER_CHANNEL_IDX",
            DEFAULT_WEATHER_CHANNEL_IDX,
        )?;

        let mut sensors = HashMap::new();
        for key in KNOWN_SENSOR_KEYS {
            let env_name = format!("WEATHER_SENSOR_{}", key.to_uppercase());
            if let Some(entity_id) = vars.get(&env_name) {
                sensors.insert(key.to_owned(), entity_id.clone());
            }
        }

        if enabled && sensors.is_empty() {
            warn!("WEATHER_ENABLED is set but no WEATHER_SENSOR_* variables were found; disabling weather producer");
            enabled = false;
        }

        Ok(Self {
            enabled,
            base_url,
            token,
            poll_interval: Duration::from_millis(poll_interval_ms),
            channel_idx,
            sensors,
        })
    }
}

fn default_push_buffer_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meshcore-bridge")
        .join("push-buffer.json")
}

fn parse_or_default<T>(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            field: key,
            value: raw.clone(),
        }),
    }
}
