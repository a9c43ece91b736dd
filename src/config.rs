//! Configuration loading and validation.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};

/// Main configuration for the selective DNS resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Interface used to detect the current network. If None, every
    /// interface is considered in enumeration order.
    pub interface: Option<String>,

    /// Address the listener binds to.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Port the listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport the listener serves.
    #[serde(default)]
    pub protocol: Protocol,

    /// Upstream DNS server used for domains without an override.
    /// If None, the system resolver is used.
    #[serde(default, deserialize_with = "deserialize_socket_addr")]
    pub upstream_resolver: Option<SocketAddr>,

    /// Deadline for a single upstream lookup, in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    /// TTL stamped on every answer we produce.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Network contexts, evaluated in the order they appear.
    #[serde(default)]
    pub networks: Vec<NetworkSettings>,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport served by the listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => f.write_str("udp"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// One network context: an address range and the overrides that apply
/// while the host sits inside it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSettings {
    /// Address range in CIDR notation, e.g. "10.0.0.0/24".
    pub cidr: String,

    /// Domain to address overrides. Domains may omit the trailing dot.
    #[serde(default)]
    pub rules: HashMap<String, String>,
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Expose a Prometheus `/metrics` endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Address of the metrics HTTP listener.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    53
}

const fn default_upstream_timeout_ms() -> u64 {
    5000
}

const fn default_ttl() -> u32 {
    3600
}

const fn default_metrics_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9153)
}

fn deserialize_socket_addr<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SocketAddr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map(Some).map_err(serde::de::Error::custom)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address the listener binds to.
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// Range and address syntax is checked when the registry is built.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ConfigError::from(ValidationError::ZeroPort).into());
        }

        if self.upstream_timeout_ms == 0 {
            return Err(ConfigError::from(ValidationError::ZeroUpstreamTimeout).into());
        }

        if self.interface.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::from(ValidationError::EmptyInterface).into());
        }

        for (index, network) in self.networks.iter().enumerate() {
            if network.cidr.trim().is_empty() {
                return Err(ConfigError::from(ValidationError::EmptyCidr { index }).into());
            }
            if network.rules.keys().any(|domain| domain.trim().is_empty()) {
                return Err(ConfigError::from(ValidationError::EmptyRuleDomain {
                    cidr: network.cidr.clone(),
                })
                .into());
            }
        }

        Ok(())
    }
}
