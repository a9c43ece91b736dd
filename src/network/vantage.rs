//! Vantage point detection.
//!
//! The vantage address is the first IPv4 address assigned to an eligible
//! local interface. It stands in for "which network are we on" and is
//! recomputed for every query, since interfaces come and go.

use std::net::Ipv4Addr;

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;

use crate::error::{NetworkError, Result};

/// Trait for vantage address detection.
pub trait VantageLocator: Send + Sync + Clone + 'static {
    /// Detect the current vantage address.
    fn locate(&self) -> Result<Ipv4Addr>;
}

/// Production locator reading the interfaces reported by the OS.
#[derive(Clone, Debug, Default)]
pub struct InterfaceLocator {
    preferred: Option<String>,
}

impl InterfaceLocator {
    /// Create a locator, optionally restricted to a single interface name.
    pub const fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }
}

impl VantageLocator for InterfaceLocator {
    fn locate(&self) -> Result<Ipv4Addr> {
        locate_in(&datalink::interfaces(), self.preferred.as_deref())
    }
}

/// Pick the vantage address out of an interface list.
///
/// Interfaces are scanned in the given order. When `preferred` is set,
/// every interface with a different name is skipped.
pub fn locate_in(interfaces: &[NetworkInterface], preferred: Option<&str>) -> Result<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| preferred.is_none_or(|name| iface.name == name))
        .flat_map(|iface| iface.ips.iter())
        .find_map(|network| match network {
            IpNetwork::V4(v4) => Some(v4.ip()),
            IpNetwork::V6(_) => None,
        })
        .ok_or_else(|| match preferred {
            Some(name) => NetworkError::NoVantageAddressOn {
                interface: name.to_string(),
            }
            .into(),
            None => NetworkError::NoVantageAddress.into(),
        })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Locator returning a fixed, swappable address.
    #[derive(Clone, Default)]
    pub struct StaticLocator {
        pub address: Arc<Mutex<Option<Ipv4Addr>>>,
    }

    impl StaticLocator {
        pub fn new(address: Ipv4Addr) -> Self {
            Self {
                address: Arc::new(Mutex::new(Some(address))),
            }
        }

        /// A locator that never finds an address.
        pub fn detached() -> Self {
            Self::default()
        }

        /// Simulate moving to another network.
        pub fn move_to(&self, address: Option<Ipv4Addr>) {
            *self.address.lock() = address;
        }
    }

    impl VantageLocator for StaticLocator {
        fn locate(&self) -> Result<Ipv4Addr> {
            self.address
                .lock()
                .ok_or_else(|| NetworkError::NoVantageAddress.into())
        }
    }

    fn iface(name: &str, ips: &[&str]) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: String::new(),
            index: 0,
            mac: None,
            ips: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
            flags: 0,
        }
    }

    #[test]
    fn should_return_first_ipv4_in_enumeration_order() {
        let interfaces = [
            iface("lo", &["127.0.0.1/8"]),
            iface("en0", &["192.168.1.5/24"]),
        ];

        assert_eq!(
            locate_in(&interfaces, None).unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
    }

    #[test]
    fn should_skip_ipv6_addresses() {
        let interfaces = [iface("en0", &["fe80::1/64", "2001:db8::5/64", "10.0.0.5/24"])];

        assert_eq!(
            locate_in(&interfaces, None).unwrap(),
            Ipv4Addr::new(10, 0, 0, 5)
        );
    }

    #[test]
    fn should_only_consider_preferred_interface() {
        let interfaces = [
            iface("en0", &["192.168.1.5/24"]),
            iface("utun3", &["10.8.0.2/24"]),
        ];

        assert_eq!(
            locate_in(&interfaces, Some("utun3")).unwrap(),
            Ipv4Addr::new(10, 8, 0, 2)
        );
    }

    #[test]
    fn should_fail_when_preferred_interface_has_no_ipv4() {
        let interfaces = [
            iface("en0", &["192.168.1.5/24"]),
            iface("utun3", &["fd00::2/64"]),
        ];

        let err = locate_in(&interfaces, Some("utun3")).unwrap_err();
        assert!(matches!(
            err,
            Error::Network(NetworkError::NoVantageAddressOn { ref interface }) if interface == "utun3"
        ));
    }

    #[test]
    fn should_fail_without_any_ipv4() {
        let interfaces = [iface("en0", &[]), iface("en1", &["fe80::1/64"])];

        assert!(matches!(
            locate_in(&interfaces, None),
            Err(Error::Network(NetworkError::NoVantageAddress))
        ));
        assert!(locate_in(&[], None).is_err());
    }

    #[test]
    fn should_follow_static_locator_moves() {
        let locator = StaticLocator::new(Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(locator.locate().unwrap(), Ipv4Addr::new(10, 0, 0, 5));

        locator.move_to(None);
        assert!(locator.locate().is_err());
        assert!(StaticLocator::detached().locate().is_err());
    }
}
