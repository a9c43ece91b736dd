//! Selective DNS - a resolver that answers differently depending on which
//! network the host is attached to.
//!
//! Every address query is matched against an ordered list of network
//! contexts. The context is chosen by the host's own IPv4 address (its
//! *vantage address*), so a laptop gets the office answer for a name at
//! the office and the home answer at home, without any reconfiguration.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`network`]: Vantage address detection from local interfaces
//! - [`dns`]: Answer records, the network registry and upstream lookups
//! - [`cache`]: Per-network answer caching
//! - [`engine`]: Resolution of individual questions
//! - [`server`]: UDP/TCP listener
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The engine is generic over its locator, cache and upstream, so it can be
//! driven without touching the network:
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use std::str::FromStr;
//! use hickory_proto::rr::{Name, RecordType};
//! use selective_dns::dns::NetworkRegistry;
//!
//! let registry = NetworkRegistry::build_from([
//!     ("10.0.0.0/16", [("h", "1.1.1.1")]),
//!     ("10.0.0.0/24", [("h", "2.2.2.2")]),
//! ])
//! .unwrap();
//!
//! // The first configured network wins, not the narrowest one.
//! let (address, kind) = registry
//!     .find_override(Ipv4Addr::new(10, 0, 0, 5), &Name::from_str("h.").unwrap())
//!     .unwrap();
//! assert_eq!(address.to_string(), "1.1.1.1");
//! assert_eq!(kind, RecordType::A);
//! ```

pub mod cache;
pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod network;
pub mod server;

pub use config::Config;
pub use engine::{EngineOptions, ResolutionEngine};
pub use error::{Error, Result};
