//! DNS blocklist (DNSBL) reputation check
//!
//! For a client at `a.b.c.d` and a zone `zone`, the name `d.c.b.a.zone` is
//! looked up. Any A answer means the client is listed in that zone.
//!
//! Lookup failures and timeouts count as "not listed": the blocklist is a
//! supplementary signal, and the relay boundary is enforced elsewhere.
//! Only IPv4 clients (including IPv4-mapped IPv6) are checked; native IPv6
//! clients are exempt because DNSBL zones are IPv4-oriented.

use crate::settings::RblSettings;
use crate::utils::dns::{as_ipv4, reverse_ipv4, DnsResolver};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of a blocklist check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RblStatus {
    Clean,
    /// Listed in this zone (the first one that answered)
    Listed { zone: String },
    /// Not evaluated (disabled, no zones, or not an IPv4 client)
    Skipped,
}

pub struct RblChecker {
    resolver: Arc<dyn DnsResolver>,
}

impl RblChecker {
    pub fn new(resolver: Arc<dyn DnsResolver>) -> Self {
        Self { resolver }
    }

    /// Check `ip` against the configured zones, in order
    pub async fn check(&self, ip: IpAddr, settings: &RblSettings) -> RblStatus {
        if !settings.enabled || settings.zones.is_empty() {
            return RblStatus::Skipped;
        }

        let Some(v4) = as_ipv4(ip) else {
            debug!("Skipping DNSBL check for IPv6 client {}", ip);
            return RblStatus::Skipped;
        };

        let reversed = reverse_ipv4(v4);

        for zone in &settings.zones {
            let query = format!("{}.{}", reversed, zone);

            match timeout(settings.lookup_timeout, self.resolver.resolve_a(&query)).await {
                Ok(Ok(addresses)) if !addresses.is_empty() => {
                    warn!("RBL blocked {} (zone {}, answer {:?})", ip, zone, addresses);
                    return RblStatus::Listed { zone: zone.clone() };
                }
                Ok(Ok(_)) => {
                    debug!("{} returned no addresses", query);
                }
                Ok(Err(e)) => {
                    debug!("{} not listed: {}", query, e);
                }
                Err(_) => {
                    warn!(
                        "DNSBL lookup {} timed out after {:?}, treating as not listed",
                        query, settings.lookup_timeout
                    );
                }
            }
        }

        RblStatus::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InboundError;
    use crate::utils::dns::MockDnsResolver;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn settings(zones: &[&str]) -> RblSettings {
        RblSettings {
            enabled: true,
            zones: zones.iter().map(|z| z.to_string()).collect(),
            lookup_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_listed_in_zone() {
        let mut resolver = MockDnsResolver::new();
        resolver
            .expect_resolve_a()
            .withf(|name| name == "5.0.0.10.zen.example")
            .times(1)
            .returning(|_| Ok(vec![Ipv4Addr::new(127, 0, 0, 2)]));

        let checker = RblChecker::new(Arc::new(resolver));
        let status = checker
            .check("10.0.0.5".parse().unwrap(), &settings(&["zen.example"]))
            .await;

        assert_eq!(
            status,
            RblStatus::Listed {
                zone: "zen.example".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_first_listing_zone_wins() {
        let mut resolver = MockDnsResolver::new();
        resolver
            .expect_resolve_a()
            .withf(|name| name == "5.0.0.10.a.example")
            .times(1)
            .returning(|name| Err(InboundError::DnsLookup(format!("{}: NXDOMAIN", name))));
        resolver
            .expect_resolve_a()
            .withf(|name| name == "5.0.0.10.b.example")
            .times(1)
            .returning(|_| Ok(vec![Ipv4Addr::new(127, 0, 0, 4)]));

        let checker = RblChecker::new(Arc::new(resolver));
        let status = checker
            .check(
                "10.0.0.5".parse().unwrap(),
                &settings(&["a.example", "b.example", "c.example"]),
            )
            .await;

        assert_eq!(
            status,
            RblStatus::Listed {
                zone: "b.example".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_resolver_errors_are_not_listed() {
        let mut resolver = MockDnsResolver::new();
        resolver
            .expect_resolve_a()
            .times(2)
            .returning(|_| Err(InboundError::DnsLookup("SERVFAIL".to_string())));

        let checker = RblChecker::new(Arc::new(resolver));
        let status = checker
            .check("10.0.0.5".parse().unwrap(), &settings(&["a.example", "b.example"]))
            .await;

        assert_eq!(status, RblStatus::Clean);
    }

    #[tokio::test]
    async fn test_ipv6_is_exempt() {
        let mut resolver = MockDnsResolver::new();
        resolver.expect_resolve_a().never();

        let checker = RblChecker::new(Arc::new(resolver));
        let status = checker
            .check("2001:db8::1".parse().unwrap(), &settings(&["zen.example"]))
            .await;

        assert_eq!(status, RblStatus::Skipped);
    }

    #[tokio::test]
    async fn test_ipv4_mapped_is_checked() {
        let mut resolver = MockDnsResolver::new();
        resolver
            .expect_resolve_a()
            .withf(|name| name == "5.0.0.10.zen.example")
            .times(1)
            .returning(|_| Ok(vec![Ipv4Addr::new(127, 0, 0, 2)]));

        let checker = RblChecker::new(Arc::new(resolver));
        let status = checker
            .check("::ffff:10.0.0.5".parse().unwrap(), &settings(&["zen.example"]))
            .await;

        assert!(matches!(status, RblStatus::Listed { .. }));
    }

    #[tokio::test]
    async fn test_disabled_or_no_zones_skips() {
        let mut resolver = MockDnsResolver::new();
        resolver.expect_resolve_a().never();
        let checker = RblChecker::new(Arc::new(resolver));

        let mut disabled = settings(&["zen.example"]);
        disabled.enabled = false;
        assert_eq!(
            checker.check("10.0.0.5".parse().unwrap(), &disabled).await,
            RblStatus::Skipped
        );
        assert_eq!(
            checker.check("10.0.0.5".parse().unwrap(), &settings(&[])).await,
            RblStatus::Skipped
        );
    }
}
