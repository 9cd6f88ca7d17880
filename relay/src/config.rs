//! Process wide relay settings.
//!
//! The configuration is shared by the server and every connection through an `Arc`.  Values
//! can be changed at any time through `set()`; connections re-read them on each flush cycle so
//! a change applies from the next cycle on.  Changing the mode also bumps a mode epoch, which
//! is how one-shot modes like rewind are applied exactly once per request.

use crate::delay_buffer::{BufferLimits, BufferMode};
use crate::errors::ConfigError;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const ENV_PREFIX: &str = "DELAY_RELAY_";
const DEFAULT_MAX_BUFFER_BYTES: u64 = 1024 * 1024 * 1024;
const ESTIMATED_BYTES_PER_CHUNK: u64 = 6000;

/// Every key accepted by `RelayConfig::get()` and `RelayConfig::set()`
pub const CONFIG_KEYS: [&str; 9] = [
    "local_port",
    "delay_ms",
    "state",
    "remote_host",
    "remote_port",
    "latency_ms",
    "max_buffer_bytes",
    "max_buffer_chunks",
    "passthrough",
];

/// A point in time copy of every setting
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    pub local_port: u16,
    pub delay_ms: u64,
    pub state: BufferMode,
    pub state_epoch: u64,
    pub remote_host: String,
    pub remote_port: u16,
    pub latency_ms: u64,
    pub max_buffer_bytes: u64,
    pub max_buffer_chunks: u64,
    pub passthrough: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        ConfigSnapshot {
            local_port: 8888,
            delay_ms: 30_000,
            state: BufferMode::Realtime,
            state_epoch: 0,
            remote_host: "live.twitch.tv".to_string(),
            remote_port: 1935,
            latency_ms: 5,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            max_buffer_chunks: DEFAULT_MAX_BUFFER_BYTES / ESTIMATED_BYTES_PER_CHUNK,
            passthrough: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct RelayConfig {
    values: RwLock<ConfigSnapshot>,
    applied_mode_epoch: Mutex<Option<u64>>,
}

impl RelayConfig {
    pub fn new() -> RelayConfig {
        RelayConfig::default()
    }

    /// Defaults overlaid with any `DELAY_RELAY_<KEY>` environment variables
    pub fn from_env() -> Result<RelayConfig, ConfigError> {
        RelayConfig::from_vars(std::env::vars())
    }

    /// Defaults overlaid with the `DELAY_RELAY_<KEY>` entries of `vars`.  Other entries are
    /// ignored.
    pub fn from_vars<I>(vars: I) -> Result<RelayConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = RelayConfig::new();
        for (name, value) in vars {
            let key = match name.strip_prefix(ENV_PREFIX) {
                Some(key) => key.to_ascii_lowercase(),
                None => continue,
            };

            config.set(&key, &value)?;
        }

        Ok(config)
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let values = self.values.read();
        let value = match key {
            "local_port" => values.local_port.to_string(),
            "delay_ms" => values.delay_ms.to_string(),
            "state" => self.reported_state(&values).to_string(),
            "remote_host" => values.remote_host.clone(),
            "remote_port" => values.remote_port.to_string(),
            "latency_ms" => values.latency_ms.to_string(),
            "max_buffer_bytes" => values.max_buffer_bytes.to_string(),
            "max_buffer_chunks" => values.max_buffer_chunks.to_string(),
            "passthrough" => values.passthrough.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };

        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut values = self.values.write();
        match key {
            "local_port" => values.local_port = parse(key, value)?,
            "delay_ms" => values.delay_ms = parse(key, value)?,
            "state" => {
                values.state = BufferMode::from_str(value).map_err(|_| invalid(key, value))?;
                values.state_epoch += 1;
            }

            "remote_host" => {
                let host = value.trim();
                if host.is_empty() {
                    return Err(invalid(key, value));
                }

                values.remote_host = host.to_string();
            }

            "remote_port" => values.remote_port = parse(key, value)?,
            "latency_ms" => values.latency_ms = parse_non_zero(key, value)?,

            "max_buffer_bytes" => values.max_buffer_bytes = parse_non_zero(key, value)?,
            "max_buffer_chunks" => values.max_buffer_chunks = parse_non_zero(key, value)?,
            "passthrough" => values.passthrough = parse_bool(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        info!(key, value, "Configuration changed");
        Ok(())
    }

    /// Current settings.  A one-shot mode that a connection has already carried out is
    /// reported as the mode it settled into.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let values = self.values.read();
        let mut snapshot = values.clone();
        snapshot.state = self.reported_state(&values);
        snapshot
    }

    pub fn local_port(&self) -> u16 {
        self.values.read().local_port
    }

    pub fn remote(&self) -> (String, u16) {
        let values = self.values.read();
        (values.remote_host.clone(), values.remote_port)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.values.read().latency_ms)
    }

    pub fn passthrough(&self) -> bool {
        self.values.read().passthrough
    }

    /// The requested mode along with the epoch it was requested in.  Connections read this,
    /// so one-shot modes stay visible here until the next `state` change.
    pub fn mode(&self) -> (BufferMode, u64) {
        let values = self.values.read();
        (values.state, values.state_epoch)
    }

    /// The mode as reported by `get("state")` and `snapshot()`
    pub fn reported_mode(&self) -> BufferMode {
        self.reported_state(&self.values.read())
    }

    /// Marks the mode requested in `epoch` as carried out by a connection
    pub fn mode_applied(&self, epoch: u64) {
        let mut applied = self.applied_mode_epoch.lock();
        if applied.map_or(true, |x| x < epoch) {
            *applied = Some(epoch);
        }
    }

    fn reported_state(&self, values: &ConfigSnapshot) -> BufferMode {
        match *self.applied_mode_epoch.lock() {
            Some(epoch) if epoch == values.state_epoch => values.state.settled(),
            _ => values.state,
        }
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        let values = self.values.read();
        BufferLimits {
            delay_ms: values.delay_ms,
            max_chunks: values.max_buffer_chunks as usize,
            max_bytes: values.max_buffer_bytes,
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_non_zero(key: &str, value: &str) -> Result<u64, ConfigError> {
    match parse(key, value)? {
        0 => Err(invalid(key, value)),
        x => Ok(x),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
