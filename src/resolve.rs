//! Host name resolution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of resolving a target's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ip: IpAddr,
    /// Every name and address the host answered to.
    pub aliases: Vec<String>,
}

#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Resolution>;
}

/// Resolves through the operating system, preferring IPv4 answers.
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Resolution> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Resolution {
                ip,
                aliases: vec![host.to_string()],
            });
        }

        let addrs: Vec<IpAddr> = lookup_host((host, 0))
            .await
            .map_err(|e| Error::Resolution {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .map(|addr| addr.ip())
            .collect();

        let ip = addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| Error::Resolution {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            })?;

        debug!(host, %ip, answers = addrs.len(), "resolved");

        let mut aliases = vec![host.to_string()];
        aliases.extend(addrs.iter().map(IpAddr::to_string));
        aliases.dedup();

        Ok(Resolution { ip, aliases })
    }
}

/// Fixed host → address table, optionally falling through to another
/// resolver for names it does not know. Backs the CLI's `--resolve` flag.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
    fallback: Option<Arc<dyn HostResolver>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, host: impl Into<String>, ip: IpAddr) -> Self {
        self.entries.insert(host.into().to_lowercase(), ip);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn HostResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Parses a `host=ip` override.
    pub fn parse_entry(entry: &str) -> std::result::Result<(String, IpAddr), String> {
        let (host, ip) = entry
            .split_once('=')
            .ok_or_else(|| format!("Invalid resolve entry '{}', expected host=ip", entry))?;
        let ip = ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| format!("Invalid address in resolve entry '{}'", entry))?;
        Ok((host.trim().to_lowercase(), ip))
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Resolution> {
        if let Some(ip) = self.entries.get(&host.to_lowercase()) {
            return Ok(Resolution {
                ip: *ip,
                aliases: vec![host.to_string()],
            });
        }

        match &self.fallback {
            Some(fallback) => fallback.resolve(host).await,
            None => Err(Error::Resolution {
                host: host.to_string(),
                reason: "no static entry".to_string(),
            }),
        }
    }
}
