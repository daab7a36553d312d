use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// A host or URL under assessment, together with what modules have
/// discovered about it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// The identifier as given by the user or scope provider.
    pub raw: String,
    /// Host component derived from `raw`.
    pub host: String,
    /// `None` until a resolution step has run.
    pub ip_address: Option<IpAddr>,
    pub hosts: BTreeSet<String>,
    pub ports: BTreeSet<u16>,
    pub protocols: BTreeSet<String>,
    pub links: BTreeSet<String>,
}

impl Target {
    /// Parses a URL, `host:port`, bare hostname or IP address.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into().trim().to_string();
        let host = parse_host(&raw).ok_or_else(|| Error::InvalidTarget(raw.clone()))?;

        Ok(Self {
            raw,
            host,
            ip_address: None,
            hosts: BTreeSet::new(),
            ports: BTreeSet::new(),
            protocols: BTreeSet::new(),
            links: BTreeSet::new(),
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.ip_address.is_some()
    }

    /// URL to fetch when the target is treated as a web application.
    pub fn url(&self) -> String {
        if self.raw.contains("://") {
            self.raw.clone()
        } else if self.ports.contains(&443) && !self.ports.contains(&80) {
            format!("https://{}/", self.raw)
        } else {
            format!("http://{}/", self.raw)
        }
    }

    /// `raw` reduced to characters that are safe in a file name. The scheme
    /// is kept so that `http://` and `https://` targets do not share files.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .raw
            .replacen("://", "_", 1)
            .trim_end_matches('/')
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() {
            "target".to_string()
        } else {
            stem
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn parse_host(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    if raw.contains("://") {
        let url = reqwest::Url::parse(raw).ok()?;
        let host = url.host_str()?;
        return Some(host.trim_start_matches('[').trim_end_matches(']').to_string());
    }

    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip.to_string());
    }

    let authority = raw.split('/').next().unwrap_or(raw);

    // [::1]:8080
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, _) = rest.split_once(']')?;
        return host.parse::<IpAddr>().ok().map(|ip| ip.to_string());
    }

    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        Some(_) => return None,
        None => authority,
    };

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        None
    } else {
        Some(host.to_lowercase())
    }
}
