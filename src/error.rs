//! Error types for the selective DNS resolver.
//!
//! Configuration errors are fatal at startup. Everything else is scoped to
//! the query that produced it.

use std::io;
use std::net::AddrParseError;
use std::time::Duration;

use hickory_proto::ProtoError;
use pnet::ipnetwork::IpNetworkError;
use thiserror::Error;

/// Main error type for resolver operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("DNS protocol error: {0}")]
    Protocol(#[from] ProtoError),

    #[error("upstream lookup failed: {0}")]
    Upstream(String),

    #[error("upstream lookup timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

impl Error {
    /// Whether this error must stop the process from serving.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Metrics(_))
    }

    /// Short label used when counting per-query failures.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Network(_) => "no_vantage_address",
            Self::Protocol(_) => "protocol",
            Self::Upstream(_) => "upstream",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::Io(_) => "io",
            Self::Metrics(_) => "metrics",
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid network range {cidr:?}: {source}")]
    InvalidCidr {
        cidr: String,
        #[source]
        source: IpNetworkError,
    },

    #[error("network range {cidr:?} is missing a prefix length")]
    MissingPrefix { cidr: String },

    #[error("invalid override address {address:?} for {domain:?}: {source}")]
    InvalidOverrideAddress {
        domain: String,
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("invalid override domain {domain:?}: {source}")]
    InvalidDomain {
        domain: String,
        #[source]
        source: ProtoError,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("port must be greater than 0")]
    ZeroPort,

    #[error("upstream_timeout_ms must be greater than 0")]
    ZeroUpstreamTimeout,

    #[error("network #{index} has an empty cidr")]
    EmptyCidr { index: usize },

    #[error("network {cidr:?} has an empty rule domain")]
    EmptyRuleDomain { cidr: String },

    #[error("interface name cannot be empty")]
    EmptyInterface,
}

/// Network-related errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no IPv4 address found on any network interface")]
    NoVantageAddress,

    #[error("no IPv4 address found on interface {interface:?}")]
    NoVantageAddressOn { interface: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
