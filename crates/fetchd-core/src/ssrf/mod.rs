//! Outbound destination validation (SSRF guard).
//!
//! Every fetch target and webhook callback passes through [`SsrfGuard::validate`]
//! before a socket is opened. Hostnames are resolved once and *every* returned
//! address must be acceptable; the validated set is handed to the fetcher so
//! it connects to exactly those addresses.

mod classify;
mod resolve;

pub use classify::{classify, AddressClass};
pub use resolve::{HostResolver, StaticResolver, SystemResolver};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

use crate::error::{ServiceError, ServiceResult};

/// A URL whose destination addresses have all been validated.
#[derive(Debug, Clone)]
pub struct ResolvedUrl {
    pub url: Url,
    pub host: String,
    pub port: u16,
    /// Every address the host resolved to; non-empty.
    pub addrs: Vec<IpAddr>,
}

impl ResolvedUrl {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Entries for libcurl's `CURLOPT_RESOLVE` (`host:port:addr[,addr]`), pinning
    /// the connection to the validated addresses. None for IP-literal hosts.
    pub fn pinned_resolve_entry(&self) -> Option<String> {
        if self.host.parse::<IpAddr>().is_ok() || self.host.starts_with('[') {
            return None;
        }
        let addrs: Vec<String> = self
            .addrs
            .iter()
            .map(|a| match a {
                IpAddr::V4(v4) => v4.to_string(),
                IpAddr::V6(v6) => format!("[{}]", v6),
            })
            .collect();
        Some(format!("{}:{}:{}", self.host, self.port, addrs.join(",")))
    }
}

/// Longest a single hostname lookup may take.
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Validates outbound URLs against private, loopback, and link-local ranges.
#[derive(Clone)]
pub struct SsrfGuard {
    resolver: Arc<dyn HostResolver>,
    allow_loopback: bool,
    dns_timeout: Duration,
}

impl std::fmt::Debug for SsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsrfGuard")
            .field("allow_loopback", &self.allow_loopback)
            .field("dns_timeout", &self.dns_timeout)
            .finish_non_exhaustive()
    }
}

impl SsrfGuard {
    pub fn new(allow_loopback: bool) -> Self {
        Self::with_resolver(Arc::new(SystemResolver), allow_loopback)
    }

    pub fn with_resolver(resolver: Arc<dyn HostResolver>, allow_loopback: bool) -> Self {
        Self {
            resolver,
            allow_loopback,
            dns_timeout: DEFAULT_DNS_TIMEOUT,
        }
    }

    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    pub fn allow_loopback(&self) -> bool {
        self.allow_loopback
    }

    pub fn dns_timeout(&self) -> Duration {
        self.dns_timeout
    }

    /// Syntax and scheme check only: must parse, be http/https, and have a host.
    pub fn parse(raw: &str) -> ServiceResult<Url> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ServiceError::InvalidUrl(format!(
                    "unsupported scheme '{}' (only http/https)",
                    other
                )))
            }
        }
        if url.host().is_none() {
            return Err(ServiceError::InvalidUrl(format!("{}: missing host", raw)));
        }
        Ok(url)
    }

    /// Validate with the guard's configured loopback policy.
    pub async fn validate(&self, raw: &str) -> ServiceResult<ResolvedUrl> {
        self.validate_with(raw, self.allow_loopback).await
    }

    pub async fn validate_with(&self, raw: &str, allow_loopback: bool) -> ServiceResult<ResolvedUrl> {
        let url = Self::parse(raw)?;
        self.validate_url(url, allow_loopback).await
    }

    /// Validate with the lookup further bounded by `budget` (the caller's
    /// request timeout).
    pub async fn validate_within(&self, raw: &str, budget: Duration) -> ServiceResult<ResolvedUrl> {
        let url = Self::parse(raw)?;
        self.check(url, self.allow_loopback, budget.min(self.dns_timeout))
            .await
    }

    /// Validate an already-parsed URL (used for redirect hops).
    pub async fn validate_url(&self, url: Url, allow_loopback: bool) -> ServiceResult<ResolvedUrl> {
        self.check(url, allow_loopback, self.dns_timeout).await
    }

    async fn resolve(&self, domain: &str, port: u16, bound: Duration) -> ServiceResult<Vec<IpAddr>> {
        let failed = |message: String| ServiceError::DnsResolutionFailed {
            host: domain.to_string(),
            message,
        };
        let addrs = match tokio::time::timeout(bound, self.resolver.lookup(domain, port)).await {
            Ok(res) => res.map_err(|e| failed(e.to_string()))?,
            Err(_) => {
                tracing::warn!(host = %domain, bound_ms = bound.as_millis() as u64, "dns lookup timed out");
                return Err(failed(format!("lookup timed out after {:?}", bound)));
            }
        };
        if addrs.is_empty() {
            return Err(failed("no addresses returned".to_string()));
        }
        Ok(addrs)
    }

    async fn check(&self, url: Url, allow_loopback: bool, dns_bound: Duration) -> ServiceResult<ResolvedUrl> {
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ServiceError::InvalidUrl(format!("{}: no port", url)))?;
        let (host, addrs) = match url.host() {
            Some(Host::Ipv4(v4)) => (v4.to_string(), vec![IpAddr::V4(v4)]),
            Some(Host::Ipv6(v6)) => (v6.to_string(), vec![IpAddr::V6(v6)]),
            Some(Host::Domain(domain)) => {
                let domain = domain.to_string();
                let addrs = self.resolve(&domain, port, dns_bound).await?;
                (domain, addrs)
            }
            None => return Err(ServiceError::InvalidUrl(format!("{}: missing host", url))),
        };

        if let Some(bad) = addrs
            .iter()
            .copied()
            .find(|a| !classify(*a).is_allowed(allow_loopback))
        {
            tracing::warn!(host = %host, addr = %bad, "blocked outbound destination");
            return Err(ServiceError::BlockedAddress { host, addr: bad });
        }

        Ok(ResolvedUrl {
            url,
            host,
            port,
            addrs,
        })
    }
}
