//! Resolver interface for turning hostnames into candidate addresses.
//!
//! The guard only depends on this trait, so tests can supply fixed answers
//! (for example a name that resolves to one public and one private address).

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Return every address `host` resolves to. An empty list is treated as a failure.
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system (getaddrinfo via tokio's blocking pool).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        let mut out: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !out.contains(&addr.ip()) {
                out.push(addr.ip());
            }
        }
        Ok(out)
    }
}

/// Fixed host table. Unknown names fail as NXDOMAIN would.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    table: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        let parsed = addrs.iter().filter_map(|a| a.parse().ok()).collect();
        self.table.insert(host.to_ascii_lowercase(), parsed);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn lookup(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.table
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }
}
