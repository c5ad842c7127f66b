//! Configuration for the relay server.
//!
//! Defaults can be overridden via environment variables:
//!
//! - `RELAY_BIND_ADDR`           (default: "0.0.0.0")
//! - `RELAY_PORT`                (default: "6672")
//! - `RELAY_MAX_CLIENTS`         (default: "1024")
//! - `RELAY_QUEUE_CAPACITY`      (default: "0", unbounded)
//! - `RELAY_WRITE_TIMEOUT_MS`    (default: "10000")
//! - `RELAY_IDLE_TIMEOUT_SECS`   (default: "0", disabled)
//! - `RELAY_PROBE_ENABLED`       (default: "true")
//! - `RELAY_PROBE_URL`           (default: "http://www.example.com")
//! - `RELAY_PROBE_TIMEOUT_MS`    (default: "5000")
//! - `RELAY_PROBE_INTERVAL_SECS` (default: "0", membership changes only)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on. 0 picks a free port.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// Broadcast queue capacity; `None` means unbounded.
    pub queue_capacity: Option<usize>,

    /// Bound on each per-connection write.
    pub write_timeout: Duration,

    /// Drop a connection that sends nothing for this long.
    pub idle_timeout: Option<Duration>,

    pub probe_enabled: bool,
    pub probe_url: String,
    pub probe_timeout: Duration,

    /// Periodic probe reports, on top of the ones sent on connect/disconnect.
    pub probe_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 6672,
            max_clients: 1024,
            queue_capacity: None,
            write_timeout: Duration::from_secs(10),
            idle_timeout: None,
            probe_enabled: true,
            probe_url: "http://www.example.com".to_string(),
            probe_timeout: Duration::from_secs(5),
            probe_interval: None,
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_addr = lookup("RELAY_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_or_default(&lookup, "RELAY_PORT", defaults.port)?;
        let max_clients = read_or_default(&lookup, "RELAY_MAX_CLIENTS", defaults.max_clients)?;
        let queue_capacity = read_or_default(&lookup, "RELAY_QUEUE_CAPACITY", 0usize)?;
        let write_timeout_ms = read_or_default(&lookup, "RELAY_WRITE_TIMEOUT_MS", 10_000u64)?;
        let idle_timeout_secs = read_or_default(&lookup, "RELAY_IDLE_TIMEOUT_SECS", 0u64)?;
        let probe_enabled = read_or_default(&lookup, "RELAY_PROBE_ENABLED", defaults.probe_enabled)?;
        let probe_url = lookup("RELAY_PROBE_URL").unwrap_or(defaults.probe_url);
        let probe_timeout_ms = read_or_default(&lookup, "RELAY_PROBE_TIMEOUT_MS", 5_000u64)?;
        let probe_interval_secs = read_or_default(&lookup, "RELAY_PROBE_INTERVAL_SECS", 0u64)?;

        Ok(Config {
            bind_addr,
            port,
            max_clients,
            queue_capacity: non_zero(queue_capacity),
            write_timeout: Duration::from_millis(write_timeout_ms),
            idle_timeout: non_zero(idle_timeout_secs).map(Duration::from_secs),
            probe_enabled,
            probe_url,
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            probe_interval: non_zero(probe_interval_secs).map(Duration::from_secs),
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_or_default<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value {val:?} for {key}")),
        None => Ok(default),
    }
}

fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}
