//! Monitor configuration, read from `ROBOFLEET_*` environment variables
//! (a `.env` file is loaded first by `main`).
//!
//! Unset variables take their default. Unparseable ones are logged and also
//! fall back to the default, so a typo never keeps the monitor from starting.

use robofleet_core::{DerivationConfig, PollSettings};
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SOURCE_URL: &str = "http://localhost:8000/api/robots";
pub const DEFAULT_MQTT_TOPIC: &str = "robofleet/robots/snapshot@v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Poll,
    Push,
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poll" | "http" => Ok(SourceMode::Poll),
            "push" | "mqtt" => Ok(SourceMode::Push),
            other => Err(format!("expected poll or push, got {other:?}")),
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Poll => f.write_str("poll"),
            SourceMode::Push => f.write_str("push"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: DEFAULT_MQTT_TOPIC.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub mode: SourceMode,
    pub source_url: String,
    pub poll: PollSettings,
    pub derivation: DerivationConfig,
    pub mqtt: MqttConf,
    pub bind: SocketAddr,
    /// Consecutive failed acquisitions before the data is reported stale.
    pub stale_after: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Poll,
            source_url: DEFAULT_SOURCE_URL.into(),
            poll: PollSettings::default(),
            derivation: DerivationConfig::default(),
            mqtt: MqttConf::default(),
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            stale_after: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{key}={value:?} ignored: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

fn parse_var<T, E>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = E>,
    E: fmt::Display,
{
    let Some(raw) = lookup(key) else { return Ok(None) };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn var_or<T, E>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> T
where
    T: FromStr<Err = E>,
    E: fmt::Display,
{
    match parse_var(lookup, key) {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            warn!("{e}, using default");
            default
        }
    }
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: Duration) -> Duration {
    match var_or::<u64, _>(lookup, key, default.as_millis() as u64) {
        0 => {
            warn!("{key}=0 ignored, using default");
            default
        }
        ms => Duration::from_millis(ms),
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let poll = PollSettings {
            interval: millis_or(&lookup, "ROBOFLEET_POLL_INTERVAL_MS", defaults.poll.interval),
            fetch_timeout: millis_or(&lookup, "ROBOFLEET_FETCH_TIMEOUT_MS", defaults.poll.fetch_timeout),
        };

        let derivation = DerivationConfig::default()
            .with_page_size(var_or(&lookup, "ROBOFLEET_PAGE_SIZE", defaults.derivation.page_size))
            .with_low_battery_threshold(var_or(
                &lookup,
                "ROBOFLEET_LOW_BATTERY_THRESHOLD",
                defaults.derivation.low_battery_threshold,
            ));

        let mqtt = MqttConf {
            host: lookup("ROBOFLEET_MQTT_HOST").unwrap_or(defaults.mqtt.host),
            port: var_or(&lookup, "ROBOFLEET_MQTT_PORT", defaults.mqtt.port),
            topic: lookup("ROBOFLEET_MQTT_TOPIC").unwrap_or(defaults.mqtt.topic),
        };

        Self {
            mode: var_or(&lookup, "ROBOFLEET_MODE", defaults.mode),
            source_url: lookup("ROBOFLEET_SOURCE_URL").unwrap_or(defaults.source_url),
            poll,
            derivation,
            mqtt,
            bind: var_or(&lookup, "ROBOFLEET_BIND", defaults.bind),
            stale_after: var_or(&lookup, "ROBOFLEET_STALE_AFTER", defaults.stale_after).max(1),
        }
    }
}
