//! SSRF guard for supplier URLs
//!
//! A source URL is refused when its host is a loopback name or literal, or
//! when any address it resolves to sits in a private or reserved range.

use crate::url::source_host;
use crate::UrlError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::Url;

/// Host names refused without resolving them
const LOOPBACK_NAMES: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// Resolves host names to addresses for the SSRF guard
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Fixed host table, used where real DNS is unavailable or undesirable
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an address for `host`
    pub fn with(mut self, host: &str, ip: IpAddr) -> Self {
        self.hosts.entry(host.to_lowercase()).or_default().push(ip);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {}", host)))
    }
}

/// Checks that a URL's host is safe to fetch
///
/// # Returns
///
/// * `Ok(())` - The host is public
/// * `Err(UrlError::BlockedHost)` - Loopback, private or reserved target
/// * `Err(UrlError::Unresolved)` - The name did not resolve; nothing was checked,
///   so the URL must not be fetched either
pub async fn check_host(url: &Url, resolver: &dyn HostResolver) -> Result<(), UrlError> {
    let host = source_host(url).ok_or(UrlError::MissingHost)?;

    if is_blocked_host(&host) {
        return Err(UrlError::BlockedHost(host));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    match resolver.resolve(&host, port).await {
        Ok(addrs) if addrs.is_empty() => Err(UrlError::Unresolved(host)),
        Ok(addrs) => {
            if let Some(ip) = addrs.iter().find(|ip| is_blocked_ip(ip)) {
                tracing::warn!("Host {} resolves to blocked address {}", host, ip);
                return Err(UrlError::BlockedHost(format!("{} ({})", host, ip)));
            }
            Ok(())
        }
        Err(e) => {
            tracing::debug!("Could not resolve {}: {}", host, e);
            Err(UrlError::Unresolved(host))
        }
    }
}

/// Whether a host is refused from its text alone: loopback names and blocked
/// IP literals. `host` is lowercase and without IPv6 brackets.
pub fn is_blocked_host(host: &str) -> bool {
    if LOOPBACK_NAMES.contains(&host) || host.ends_with(".localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| is_blocked_ip(&ip))
        .unwrap_or(false)
}

/// Returns true for loopback, private, link-local and otherwise reserved addresses
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        // 0.0.0.0/8 "this network"
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b == 18 || b == 19))
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_blocked_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(&v4);
    }

    let first = ip.segments()[0];

    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_blocked_ipv4_ranges() {
        for addr in [
            "127.0.0.1",
            "127.8.8.8",
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "100.64.0.1",
            "198.18.0.1",
            "224.0.0.1",
            "255.255.255.255",
        ] {
            assert!(is_blocked_ip(&ip(addr)), "{} should be blocked", addr);
        }
    }

    #[test]
    fn test_public_ipv4_allowed() {
        for addr in ["93.184.216.34", "8.8.8.8", "172.32.0.1", "100.128.0.1"] {
            assert!(!is_blocked_ip(&ip(addr)), "{} should be allowed", addr);
        }
    }

    #[test]
    fn test_blocked_ipv6_ranges() {
        for addr in ["::1", "::", "fc00::1", "fd12:3456::1", "fe80::1", "::ffff:127.0.0.1"] {
            assert!(is_blocked_ip(&ip(addr)), "{} should be blocked", addr);
        }
        assert!(!is_blocked_ip(&ip("2606:2800:220:1::1")));
    }

    #[tokio::test]
    async fn test_loopback_literal_rejected_without_resolving() {
        let resolver = StaticResolver::new();
        let url = Url::parse("http://127.0.0.1/x").unwrap();
        assert!(matches!(
            check_host(&url, &resolver).await,
            Err(UrlError::BlockedHost(_))
        ));

        let url = Url::parse("http://localhost:8080/").unwrap();
        assert!(check_host(&url, &resolver).await.is_err());
    }

    #[tokio::test]
    async fn test_name_resolving_to_private_range_rejected() {
        let resolver = StaticResolver::new().with("intranet.example.com", ip("10.0.0.5"));
        let url = Url::parse("https://intranet.example.com/price").unwrap();
        assert!(matches!(
            check_host(&url, &resolver).await,
            Err(UrlError::BlockedHost(_))
        ));
    }

    #[tokio::test]
    async fn test_public_name_allowed() {
        let resolver = StaticResolver::new().with("shop.example.com", ip("93.184.216.34"));
        let url = Url::parse("https://shop.example.com/widget").unwrap();
        assert!(check_host(&url, &resolver).await.is_ok());
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_refused() {
        let resolver = StaticResolver::new();
        let url = Url::parse("https://nowhere.example.com/").unwrap();
        assert_eq!(
            check_host(&url, &resolver).await,
            Err(UrlError::Unresolved("nowhere.example.com".to_string()))
        );
    }

    #[test]
    fn test_blocked_host_text() {
        for host in ["localhost", "shop.localhost", "127.0.0.1", "169.254.169.254", "::1", "10.0.0.7"] {
            assert!(is_blocked_host(host), "{} should be blocked", host);
        }
        for host in ["supplier.example.com", "93.184.216.34", "2606:2800:220:1::1"] {
            assert!(!is_blocked_host(host), "{} should be allowed", host);
        }
    }
}
