//! DNS lookups used by the policy engine
//!
//! The engine only needs "does this name have an A record", so the
//! resolver is hidden behind the [`DnsResolver`] trait. Production code uses
//! [`SystemResolver`]; tests substitute a mock.

use crate::error::{InboundError, Result};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::config::{LookupIpStrategy, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Minimal resolver seam: A-record lookup for a fully qualified name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolve the IPv4 addresses of `name`.
    ///
    /// NXDOMAIN and every other failure are reported as `Err`.
    async fn resolve_a(&self, name: &str) -> Result<Vec<Ipv4Addr>>;
}

/// Resolver backed by the system DNS configuration
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    /// Build a resolver from `/etc/resolv.conf`, falling back to the
    /// library defaults when it cannot be read.
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|e| {
                warn!("Failed to load system DNS config ({}), using default resolver", e);
                (ResolverConfig::default(), ResolverOpts::default())
            });

        opts.ip_strategy = LookupIpStrategy::Ipv4Only;
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve_a(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        // Absolute name, so search domains are never appended
        let fqdn = if name.ends_with('.') {
            name.to_string()
        } else {
            format!("{}.", name)
        };

        let lookup = self
            .resolver
            .lookup_ip(fqdn.as_str())
            .await
            .map_err(|e| InboundError::DnsLookup(format!("{}: {}", name, e)))?;

        let addresses: Vec<Ipv4Addr> = lookup
            .iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();

        debug!("Resolved {} to {} address(es)", name, addresses.len());
        Ok(addresses)
    }
}

/// Reversed-octet form of an IPv4 address, as used by DNSBL queries
///
/// `10.0.0.5` becomes `5.0.0.10`.
pub fn reverse_ipv4(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{}.{}.{}.{}", d, c, b, a)
}

/// IPv4 view of an address, unwrapping IPv4-mapped IPv6 (`::ffff:a.b.c.d`)
pub fn as_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}
