//! Upstream address lookups for domains without an override.
//!
//! Provides abstraction over the fallback lookup to enable:
//! - Testing with mock upstreams
//! - Using either the system resolver or a specific DNS server

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{Error, Result};

/// Maximum DNS message size over UDP.
pub const MAX_UDP_DNS_SIZE: usize = 512;

/// Trait for fallback address lookups.
///
/// The caller is responsible for bounding the lookup with a deadline.
pub trait Upstream: Send + Sync + Clone + 'static {
    /// Look up every address of `name`, IPv4 and IPv6.
    fn lookup(&self, name: &Name) -> impl Future<Output = Result<Vec<IpAddr>>> + Send;
}

/// Lookup through the operating system resolver (getaddrinfo).
#[derive(Clone, Debug, Default)]
pub struct SystemUpstream;

impl SystemUpstream {
    pub const fn new() -> Self {
        Self
    }
}

impl Upstream for SystemUpstream {
    async fn lookup(&self, name: &Name) -> Result<Vec<IpAddr>> {
        let host = name.to_utf8();
        let host = host.trim_end_matches('.');

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| Error::Upstream(format!("{host}: {e}")))?;

        // getaddrinfo reports one entry per socket type
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }

        if ips.is_empty() {
            return Err(Error::Upstream(format!("{host}: no addresses returned")));
        }

        debug!(domain = %name, count = ips.len(), "system lookup complete");
        Ok(ips)
    }
}

/// Lookup by forwarding A and AAAA queries to a DNS server over UDP.
#[derive(Clone, Debug)]
pub struct ForwardingUpstream {
    upstream_addr: SocketAddr,
    next_id: Arc<AtomicU16>,
}

impl ForwardingUpstream {
    /// Create a new forwarding upstream.
    pub fn new(upstream_addr: SocketAddr) -> Self {
        Self {
            upstream_addr,
            next_id: Arc::new(AtomicU16::new(1)),
        }
    }

    async fn exchange(&self, name: &Name, record_type: RecordType) -> Result<Vec<IpAddr>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let query = build_query(id, name, record_type);

        let bind_addr: SocketAddr = if self.upstream_addr.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.upstream_addr).await?;
        socket.send(&query.to_vec()?).await?;

        let mut response_buf = [0u8; MAX_UDP_DNS_SIZE];
        let len = socket.recv(&mut response_buf).await?;
        let response = Message::from_vec(&response_buf[..len])?;

        if response.id() != id {
            return Err(Error::Upstream(format!(
                "{}: response id {} does not match query id {id}",
                self.upstream_addr,
                response.id()
            )));
        }

        extract_addresses(&response, record_type)
    }
}

impl Upstream for ForwardingUpstream {
    /// Fails only when neither family yields an address.
    async fn lookup(&self, name: &Name) -> Result<Vec<IpAddr>> {
        let (v4, v6) = tokio::join!(
            self.exchange(name, RecordType::A),
            self.exchange(name, RecordType::AAAA)
        );

        let mut ips = Vec::new();
        let mut first_error = None;
        for (kind, result) in [(RecordType::A, v4), (RecordType::AAAA, v6)] {
            match result {
                Ok(found) => ips.extend(found),
                Err(err) => {
                    debug!(domain = %name, %kind, error = %err, "forwarded exchange failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if ips.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                Error::Upstream(format!("{name}: no addresses returned"))
            }));
        }

        debug!(
            domain = %name,
            upstream = %self.upstream_addr,
            count = ips.len(),
            "forwarded lookup complete"
        );
        Ok(ips)
    }
}

fn build_query(id: u16, name: &Name, record_type: RecordType) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name.clone(), record_type));
    message
}

/// Collect the addresses of the requested type from an upstream response.
///
/// CNAME chains are flattened by the upstream server, so only the final
/// address records are kept.
fn extract_addresses(response: &Message, record_type: RecordType) -> Result<Vec<IpAddr>> {
    match response.response_code() {
        ResponseCode::NoError | ResponseCode::NXDomain => {}
        code => {
            return Err(Error::Upstream(format!("upstream answered {code}")));
        }
    }

    Ok(response
        .answers()
        .iter()
        .filter(|record| record.record_type() == record_type)
        .filter_map(|record| match record.data() {
            RData::A(a) => Some(IpAddr::V4(a.0)),
            RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect())
}
