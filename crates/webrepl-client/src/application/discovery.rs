//! Finding the board on the network.
//!
//! # Resolution order
//!
//! 1. The cached address, if any (and not the fallback).  A successful
//!    probe returns immediately without touching the rest of the network.
//! 2. The configured address, if any (and not the fallback or already tried).
//! 3. A scan of our own /24 for the WebREPL port, then a protocol probe of
//!    each open host in address order.  The first board that accepts the
//!    password wins.
//! 4. The fallback address, where the board answers in access-point mode.
//!
//! Nothing here returns an error.  A board that cannot be found is `None`.
//!
//! # Why a trait?
//!
//! [`NetworkProbe`] puts every network effect behind one seam, so the order
//! above can be tested without sockets.  [`crate::infrastructure::network::LanProbe`]
//! is the real implementation.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::infrastructure::network::subnet_hosts;
use crate::infrastructure::storage::IpCache;

/// Network effects used by discovery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// `true` when `host` speaks WebREPL and accepts the password.
    async fn probe(&self, host: &str) -> bool;

    /// Our own LAN address, if there is one.
    async fn local_ipv4(&self) -> Option<Ipv4Addr>;

    /// The subset of `hosts` with the WebREPL port open, in input order.
    async fn scan(&self, hosts: Vec<Ipv4Addr>) -> Vec<Ipv4Addr>;
}

pub struct DiscoveryResolver<P> {
    probe: P,
    fallback: String,
}

impl<P: NetworkProbe> DiscoveryResolver<P> {
    pub fn new(probe: P, fallback: impl Into<String>) -> Self {
        Self {
            probe,
            fallback: fallback.into(),
        }
    }

    /// Resolves the board's address.  See the module docs for the order.
    pub async fn resolve(&self, cached: Option<&str>, configured: Option<&str>) -> Option<String> {
        let mut tried: Vec<&str> = Vec::new();

        for (source, candidate) in [("cached", cached), ("configured", configured)] {
            let Some(host) = candidate.filter(|h| !h.is_empty()) else {
                continue;
            };
            if host == self.fallback || tried.contains(&host) {
                continue;
            }
            tried.push(host);
            debug!("probing {source} address {host}");
            if self.probe.probe(host).await {
                info!("device found at {source} address {host}");
                return Some(host.to_string());
            }
        }

        if let Some(found) = self.scan_subnet(&tried).await {
            return Some(found);
        }

        debug!("probing fallback address {}", self.fallback);
        if self.probe.probe(&self.fallback).await {
            info!("device found at fallback address {}", self.fallback);
            return Some(self.fallback.clone());
        }

        warn!("no WebREPL device found");
        None
    }

    async fn scan_subnet(&self, already_tried: &[&str]) -> Option<String> {
        let Some(local) = self.probe.local_ipv4().await else {
            debug!("no local IPv4 address; skipping subnet scan");
            return None;
        };

        info!("scanning the /24 around {local}");
        let open = self.probe.scan(subnet_hosts(local)).await;

        for ip in open {
            let host = ip.to_string();
            if host == self.fallback || already_tried.contains(&host.as_str()) {
                continue;
            }
            if self.probe.probe(&host).await {
                info!("device found by scan at {host}");
                return Some(host);
            }
        }
        None
    }
}

/// Resolves with the cached address for `key` and stores the winner back.
///
/// Cache read and write problems are logged and otherwise ignored.
pub async fn locate_device<P: NetworkProbe>(
    resolver: &DiscoveryResolver<P>,
    cache: &IpCache,
    key: &str,
    configured: Option<&str>,
) -> Option<String> {
    let cached = cache.get(key);
    let found = resolver.resolve(cached.as_deref(), configured).await?;

    // Rewritten even when unchanged so the entry's age restarts.
    if let Err(e) = cache.put(key, &found) {
        warn!("could not cache address for {key}: {e}");
    }
    Some(found)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    const FALLBACK: &str = "192.168.4.1";

    #[tokio::test]
    async fn test_cached_hit_short_circuits_scan() {
        // Arrange
        let mut probe = MockNetworkProbe::new();
        probe
            .expect_probe()
            .withf(|h| h == "192.168.1.50")
            .times(1)
            .returning(|_| true);
        probe.expect_local_ipv4().times(0);
        probe.expect_scan().times(0);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        // Act
        let found = resolver.resolve(Some("192.168.1.50"), None).await;

        // Assert
        assert_eq!(found.as_deref(), Some("192.168.1.50"));
    }

    #[tokio::test]
    async fn test_configured_address_used_when_cache_is_stale() {
        let mut probe = MockNetworkProbe::new();
        probe
            .expect_probe()
            .withf(|h| h == "10.0.0.9")
            .returning(|_| false);
        probe
            .expect_probe()
            .withf(|h| h == "10.0.0.7")
            .times(1)
            .returning(|_| true);
        probe.expect_scan().times(0);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        let found = resolver.resolve(Some("10.0.0.9"), Some("10.0.0.7")).await;

        assert_eq!(found.as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_scan_probes_open_hosts_in_address_order() {
        // Arrange: two open hosts, both accept; the lower address must win.
        let mut probe = MockNetworkProbe::new();
        probe
            .expect_local_ipv4()
            .returning(|| Some(Ipv4Addr::new(192, 168, 1, 10)));
        probe
            .expect_scan()
            .withf(|hosts| hosts.len() == 254)
            .times(1)
            .returning(|_| vec![Ipv4Addr::new(192, 168, 1, 23), Ipv4Addr::new(192, 168, 1, 77)]);
        probe
            .expect_probe()
            .with(eq("192.168.1.23"))
            .times(1)
            .returning(|_| true);
        probe.expect_probe().with(eq("192.168.1.77")).times(0);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        // Act
        let found = resolver.resolve(None, None).await;

        // Assert
        assert_eq!(found.as_deref(), Some("192.168.1.23"));
    }

    #[tokio::test]
    async fn test_falls_back_to_access_point_address() {
        let mut probe = MockNetworkProbe::new();
        probe.expect_local_ipv4().returning(|| None);
        probe.expect_scan().times(0);
        probe
            .expect_probe()
            .with(eq(FALLBACK))
            .times(1)
            .returning(|_| true);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        let found = resolver.resolve(None, None).await;

        assert_eq!(found.as_deref(), Some(FALLBACK));
    }

    #[tokio::test]
    async fn test_cached_fallback_address_is_not_probed_early() {
        // The fallback is probed once, at the end, never as a "cached" hit.
        let mut probe = MockNetworkProbe::new();
        probe
            .expect_local_ipv4()
            .returning(|| Some(Ipv4Addr::new(10, 1, 2, 3)));
        probe.expect_scan().returning(|_| Vec::new());
        probe
            .expect_probe()
            .with(eq(FALLBACK))
            .times(1)
            .returning(|_| false);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        let found = resolver.resolve(Some(FALLBACK), Some(FALLBACK)).await;

        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_nothing_found_is_none() {
        let mut probe = MockNetworkProbe::new();
        probe
            .expect_local_ipv4()
            .returning(|| Some(Ipv4Addr::new(10, 1, 2, 3)));
        probe
            .expect_scan()
            .returning(|_| vec![Ipv4Addr::new(10, 1, 2, 40)]);
        probe.expect_probe().returning(|_| false);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        assert_eq!(resolver.resolve(Some("10.1.2.99"), None).await, None);
    }

    #[tokio::test]
    async fn test_locate_device_writes_winner_to_cache() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let cache = IpCache::new(dir.path());
        let mut probe = MockNetworkProbe::new();
        probe.expect_local_ipv4().returning(|| None);
        probe.expect_probe().with(eq("10.0.0.7")).returning(|_| true);
        let resolver = DiscoveryResolver::new(probe, FALLBACK);

        // Act
        let found = locate_device(&resolver, &cache, "esp8266", Some("10.0.0.7")).await;

        // Assert
        assert_eq!(found.as_deref(), Some("10.0.0.7"));
        assert_eq!(cache.get("esp8266").as_deref(), Some("10.0.0.7"));
    }
}
