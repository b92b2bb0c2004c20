//! Periodic weather-report producer: polls an external state source,
//! formats a fixed-order `WX: ...` line, and submits it to the command
//! queue as `SendChannelTxtMsg` with no originating client.
//!
//! Grounded on `uplink.rs`'s shared `reqwest::Client` + tick-loop idiom; the
//! enable/sensor-map configuration mirrors `config.rs`'s optional-subsystem
//! pattern (a subsystem is either fully configured or entirely disabled).

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use chrono::Utc;
use mc_protocol::bearing_to_compass;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::queue::CommandQueue;

/// Outcome of the most recent tick, surfaced on the `/status` HTTP route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    Sent,
    SkippedNotReady,
    SkippedNoReadings,
}

/// Shared cell the producer writes to after each tick and the status HTTP
/// route reads from. `None` until the first tick has run.
#[derive(Clone, Default)]
pub struct LastTickCell {
    inner: Arc<Mutex<Option<TickOutcome>>>,
}

impl LastTickCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, outcome: TickOutcome) {
        *self.inner.lock().await = Some(outcome);
    }

    pub async fn get(&self) -> Option<TickOutcome> {
        *self.inner.lock().await
    }
}

const SEND_CHANNEL_TXT_MSG_CMD: u8 = 2;
const TXT_TYPE_PLAIN: u8 = 0;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("http request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// One polled sensor reading: `state` is the raw value, `unit` (if any) is
/// appended verbatim when formatting.
#[derive(Debug, Clone)]
struct Reading {
    state: String,
    unit: String,
}

/// Readiness hook so the producer can skip a tick while the bridge isn't
/// ready to accept commands yet (startup incomplete or serial closed).
pub trait ReadinessCheck: Send + Sync {
    fn is_ready(&self) -> bool;
}

/// Run the weather producer loop forever. The first tick fires
/// immediately; subsequent ticks follow `config.poll_interval`.
pub async fn run(
    config: WeatherConfig,
    queue: Arc<CommandQueue>,
    readiness: Arc<dyn ReadinessCheck>,
    http: reqwest::Client,
    last_tick: LastTickCell,
) {
    if !config.enabled {
        return;
    }
    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        ticker.tick().await;
        if !readiness.is_ready() {
            debug!("weather tick skipped: bridge not ready");
            last_tick.set(TickOutcome::SkippedNotReady).await;
            continue;
        }
        match tick(&config, &http).await {
            Some(message) => {
                let payload = build_send_channel_txt_msg(config.channel_idx, &message);
                queue
                    .enqueue(mc_protocol::build_outgoing(&payload), None)
                    .await;
                last_tick.set(TickOutcome::Sent).await;
            }
            None => {
                debug!("weather tick produced no readings to send");
                last_tick.set(TickOutcome::SkippedNoReadings).await;
            }
        }
    }
}

async fn tick(config: &WeatherConfig, http: &reqwest::Client) -> Option<String> {
    let base_url = config.base_url.as_deref()?;
    let mut fetches = Vec::new();
    for (key, entity_id) in &config.sensors {
        fetches.push(fetch_reading(http, base_url, config.token.as_deref(), key.clone(), entity_id.clone()));
    }
    let results = futures_util::future::join_all(fetches).await;

    let mut readings = std::collections::HashMap::new();
    for result in results {
        if let Some((key, reading)) = result {
            readings.insert(key, reading);
        }
    }
    if readings.is_empty() {
        return None;
    }
    Some(format_report(&readings))
}

async fn fetch_reading(
    http: &reqwest::Client,
    base_url: &str,
    token: Option<&str>,
    key: String,
    entity_id: String,
) -> Option<(String, Reading)> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), entity_id);
    let mut req = http.get(&url).timeout(FETCH_TIMEOUT);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let response = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, entity_id, "weather sensor fetch failed");
            return None;
        }
    };
    let body: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, entity_id, "weather sensor response was not valid json");
            return None;
        }
    };
    let state = body.get("state")?.as_str()?.to_owned();
    if state.eq_ignore_ascii_case("unavailable") || state.eq_ignore_ascii_case("unknown") {
        return None;
    }
    let unit = body
        .get("attributes")
        .and_then(|a| a.get("unit_of_measurement"))
        .and_then(|u| u.as_str())
        .unwrap_or("")
        .to_owned();
    Some((key, Reading { state, unit }))
}

fn format_report(readings: &std::collections::HashMap<String, Reading>) -> String {
    let mut parts = Vec::new();

    if let Some(r) = readings.get("temperature") {
        parts.push(format!("{}{}", r.state, r.unit));
    }
    if let Some(r) = readings.get("humidity") {
        parts.push(format!("{}{}", r.state, r.unit));
    }
    if let Some(speed) = readings.get("wind_speed") {
        let bearing = readings
            .get("wind_bearing")
            .map(|r| bearing_to_compass(&r.state))
            .unwrap_or_default();
        let gust = readings
            .get("wind_gust")
            .map(|r| format!("G{}", r.state))
            .unwrap_or_default();
        parts.push(format!("{bearing}{}{gust}{}", speed.state, speed.unit));
    }
    if let Some(r) = readings.get("pressure") {
        parts.push(format!("{}{}", r.state, r.unit));
    }
    if let Some(r) = readings.get("uv") {
        parts.push(format!("UV{}", r.state));
    }
    if let Some(r) = readings.get("rain_rate") {
        parts.push(format!("{}{}", r.state, r.unit));
    }
    if let Some(r) = readings.get("rain_daily") {
        parts.push(format!("{}{}", r.state, r.unit));
    }
    if let Some(r) = readings.get("solar_radiation") {
        parts.push(format!("{}{}", r.state, r.unit));
    }
    if let Some(r) = readings.get("dew_point") {
        parts.push(format!("DP{}{}", r.state, r.unit));
    }

    format!("WX: {}", parts.join(" "))
}

fn build_send_channel_txt_msg(channel_idx: u8, text: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(7 + text.len());
    buf.put_u8(SEND_CHANNEL_TXT_MSG_CMD);
    buf.put_u8(TXT_TYPE_PLAIN);
    buf.put_u8(channel_idx);
    buf.put_u32_le(u32::try_from(Utc::now().timestamp()).unwrap_or(0));
    buf.put_slice(text.as_bytes());
    buf.to_vec()
}
