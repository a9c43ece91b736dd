//! Ordered registry of network contexts and their overrides.
//!
//! Rules are evaluated in the order they were configured. The first rule
//! whose range contains the vantage address *and* which defines an override
//! for the queried domain wins, even when a later rule has a narrower range.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use hickory_proto::rr::{Name, RecordType};
use pnet::ipnetwork::IpNetwork;

use super::record::record_kind;
use crate::config::NetworkSettings;
use crate::error::{ConfigError, Result};

/// One configured network context.
#[derive(Debug, Clone)]
pub struct NetworkRule {
    range: IpNetwork,
    /// Keys are stored fully qualified.
    overrides: HashMap<Name, IpAddr>,
}

impl NetworkRule {
    /// Build a rule from a CIDR string and its domain overrides.
    pub fn new<I, K, V>(cidr: &str, overrides: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let range = parse_cidr(cidr)?;

        let overrides = overrides
            .into_iter()
            .map(|(domain, address)| -> Result<(Name, IpAddr)> {
                let domain = domain.as_ref();
                let address = address.as_ref();
                let ip = IpAddr::from_str(address.trim()).map_err(|source| {
                    ConfigError::InvalidOverrideAddress {
                        domain: domain.to_string(),
                        address: address.to_string(),
                        source,
                    }
                })?;
                Ok((fqdn(domain)?, ip))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { range, overrides })
    }

    #[inline]
    pub fn contains(&self, vantage: Ipv4Addr) -> bool {
        self.range.contains(IpAddr::V4(vantage))
    }

    #[inline]
    pub fn get(&self, domain: &Name) -> Option<IpAddr> {
        self.overrides.get(domain).copied()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Immutable, ordered list of network rules.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    rules: Vec<NetworkRule>,
}

impl NetworkRegistry {
    /// Build the registry from `(cidr, overrides)` pairs, keeping their order.
    ///
    /// Any malformed range, domain or address fails the whole build.
    pub fn build_from<I, C, R, K, V>(networks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, R)>,
        C: AsRef<str>,
        R: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let rules = networks
            .into_iter()
            .map(|(cidr, overrides)| NetworkRule::new(cidr.as_ref(), overrides))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Build the registry from the `[[networks]]` section of the config.
    pub fn from_settings(networks: &[NetworkSettings]) -> Result<Self> {
        Self::build_from(
            networks
                .iter()
                .map(|network| (network.cidr.as_str(), &network.rules)),
        )
    }

    /// Find the override for `domain` as seen from `vantage`.
    ///
    /// Returns the address and the record type it produces.
    pub fn find_override(&self, vantage: Ipv4Addr, domain: &Name) -> Option<(IpAddr, RecordType)> {
        self.rules
            .iter()
            .filter(|rule| rule.contains(vantage))
            .find_map(|rule| rule.get(domain))
            .map(|address| (address, record_kind(address)))
    }

    /// Returns the number of network rules.
    #[inline]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the total number of overrides across all networks.
    pub fn override_count(&self) -> usize {
        self.rules.iter().map(NetworkRule::len).sum()
    }
}

fn parse_cidr(cidr: &str) -> Result<IpNetwork> {
    let cidr = cidr.trim();
    if !cidr.contains('/') {
        return Err(ConfigError::MissingPrefix {
            cidr: cidr.to_string(),
        }
        .into());
    }

    cidr.parse::<IpNetwork>().map_err(|source| {
        ConfigError::InvalidCidr {
            cidr: cidr.to_string(),
            source,
        }
        .into()
    })
}

/// Parse a domain and force it into fully qualified form.
fn fqdn(domain: &str) -> Result<Name> {
    let mut name = Name::from_str(domain.trim()).map_err(|source| ConfigError::InvalidDomain {
        domain: domain.to_string(),
        source,
    })?;
    name.set_fqdn(true);
    Ok(name)
}
