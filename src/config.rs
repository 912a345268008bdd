// src/config.rs
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::addrman::PeerAddr;
use crate::error::{NodeError, Result};
use crate::logging::LogFormat;
use crate::p2p::ConnectionLimits;

/// Prefix for environment overrides, e.g. `DESO_NODE__PORT=17001`.
pub const ENV_PREFIX: &str = "DESO";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub node: NodeSettings,
    pub network: NetworkSettings,
    pub timeouts: TimeoutSettings,
    pub limits: LimitSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Listen host
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Host announced in `hello`; falls back to `host`
    pub advertise_host: Option<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 17000,
            advertise_host: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// First port tried during the subnet scan
    pub scan_port_start: u16,

    /// One past the last scanned port
    pub scan_port_end: u16,

    pub discovery_interval_secs: u64,
    pub liveness_interval_secs: u64,

    /// Concurrent connect attempts during the subnet scan
    pub scan_concurrency: usize,

    /// Concurrent `get_peers` exchanges and liveness pings
    pub exchange_concurrency: usize,

    /// Address used to learn the outbound-facing local IP
    pub route_addr: String,

    pub enable_discovery: bool,
    pub enable_liveness: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            scan_port_start: 17000,
            scan_port_end: 17010,
            discovery_interval_secs: 300,
            liveness_interval_secs: 60,
            scan_concurrency: 256,
            exchange_concurrency: 32,
            route_addr: "8.8.8.8:80".to_string(),
            enable_discovery: true,
            enable_liveness: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect_ms: u64,
    pub io_ms: u64,

    /// Connect bound for subnet scan attempts
    pub scan_connect_ms: u64,

    /// Inbound connections with no traffic for this long are closed
    pub idle_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_ms: 3000,
            io_ms: 5000,
            scan_connect_ms: 300,
            idle_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_line_length: usize,
    pub broadcast_concurrency: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_line_length: crate::p2p::codec::MAX_LINE_LENGTH,
            broadcast_concurrency: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            dir: None,
        }
    }
}

impl Settings {
    /// Load defaults, then the optional TOML file, then `DESO_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.scan_port_start >= self.network.scan_port_end {
            return Err(invalid(format!(
                "scan_port_start ({}) must be below scan_port_end ({})",
                self.network.scan_port_start, self.network.scan_port_end
            )));
        }
        if self.network.scan_concurrency == 0
            || self.network.exchange_concurrency == 0
            || self.limits.broadcast_concurrency == 0
        {
            return Err(invalid("concurrency limits must be non-zero".to_string()));
        }
        let t = &self.timeouts;
        if t.connect_ms == 0 || t.io_ms == 0 || t.scan_connect_ms == 0 || t.idle_secs == 0 {
            return Err(invalid("timeouts must be non-zero".to_string()));
        }
        if self.network.discovery_interval_secs == 0 || self.network.liveness_interval_secs == 0 {
            return Err(invalid("loop intervals must be non-zero".to_string()));
        }
        if self.limits.max_line_length == 0 {
            return Err(invalid("max_line_length must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| invalid(e.to_string()))
    }

    // Helper methods

    /// Host:port this node announces to others.
    pub fn advertised_addr(&self) -> PeerAddr {
        let host = self
            .node
            .advertise_host
            .clone()
            .unwrap_or_else(|| self.node.host.clone());
        PeerAddr::new(host, self.node.port)
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            connect_timeout: Duration::from_millis(self.timeouts.connect_ms),
            io_timeout: Duration::from_millis(self.timeouts.io_ms),
            max_line_length: self.limits.max_line_length,
        }
    }

    /// Limits for subnet scan attempts: only the connect bound differs.
    pub fn scan_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            connect_timeout: Duration::from_millis(self.timeouts.scan_connect_ms),
            ..self.connection_limits()
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.idle_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.network.discovery_interval_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.network.liveness_interval_secs)
    }

    pub fn scan_ports(&self) -> std::ops::Range<u16> {
        self.network.scan_port_start..self.network.scan_port_end
    }
}

fn invalid(msg: String) -> NodeError {
    NodeError::Config(::config::ConfigError::Message(msg))
}
