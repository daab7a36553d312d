//! Sources of authorized targets.
//!
//! A [`ScopeProvider`] answers which targets may be assessed at all. Its
//! failure stops the run before anything is scheduled.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[async_trait]
pub trait ScopeProvider: Send + Sync {
    async fn fetch_authorized_targets(&self) -> Result<Vec<String>>;
}

/// A fixed list of targets, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticScope {
    targets: Vec<String>,
}

impl StaticScope {
    pub fn new(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ScopeProvider for StaticScope {
    async fn fetch_authorized_targets(&self) -> Result<Vec<String>> {
        Ok(self.targets.clone())
    }
}

/// Reads the program list of a bug-bounty platform and returns the domains
/// of every program that pays bounties.
pub struct HttpScopeProvider {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl HttpScopeProvider {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ScopeProvider for HttpScopeProvider {
    async fn fetch_authorized_targets(&self) -> Result<Vec<String>> {
        debug!(url = %self.api_url, "fetching program list");

        let response = self
            .client
            .get(&self.api_url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Scope(format!(
                "{} returned HTTP {}",
                self.api_url, status
            )));
        }

        let body = response.text().await?;
        let domains = parse_programs(&body)?;
        info!(domains = domains.len(), "authorized targets fetched");
        Ok(domains)
    }
}

#[derive(Deserialize)]
struct ProgramList {
    data: Vec<Program>,
}

#[derive(Deserialize)]
struct Program {
    attributes: ProgramAttributes,
}

#[derive(Deserialize)]
struct ProgramAttributes {
    #[serde(default)]
    bug_bounty_enabled: bool,
    #[serde(default)]
    domains: Vec<String>,
}

/// Domains of bounty-enabled programs, deduplicated, in first-seen order.
pub fn parse_programs(body: &str) -> Result<Vec<String>> {
    let list: ProgramList =
        serde_json::from_str(body).map_err(|e| Error::Scope(format!("unexpected program list: {}", e)))?;

    let mut seen = BTreeSet::new();
    Ok(list
        .data
        .into_iter()
        .filter(|p| p.attributes.bug_bounty_enabled)
        .flat_map(|p| p.attributes.domains)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty() && seen.insert(d.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PROGRAMS: &str = r#"{
        "data": [
            {"id": "1", "attributes": {"bug_bounty_enabled": true, "domains": ["a.example.com", "b.example.com"]}},
            {"id": "2", "attributes": {"bug_bounty_enabled": false, "domains": ["vdp.example.org"]}},
            {"id": "3", "attributes": {"bug_bounty_enabled": true, "domains": ["b.example.com", " c.example.net "]}},
            {"id": "4", "attributes": {"bug_bounty_enabled": true}}
        ]
    }"#;

    #[test]
    fn test_parse_keeps_bounty_programs_only() {
        let domains = parse_programs(PROGRAMS).unwrap();
        assert_eq!(domains, vec!["a.example.com", "b.example.com", "c.example.net"]);
    }

    #[test]
    fn test_parse_rejects_unexpected_shape() {
        assert!(matches!(parse_programs(r#"{"programs": []}"#), Err(Error::Scope(_))));
    }

    #[tokio::test]
    async fn test_static_scope() {
        let scope = StaticScope::new(["example.com", "10.0.0.1"]);
        assert_eq!(
            scope.fetch_authorized_targets().await.unwrap(),
            vec!["example.com", "10.0.0.1"]
        );
    }

    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_lowercase();
            assert!(request.contains("authorization: bearer secret-token"));
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        format!("http://{}/v1/hackers/programs", addr)
    }

    #[tokio::test]
    async fn test_http_provider_sends_token() {
        let url = serve_once("200 OK", PROGRAMS).await;
        let provider = HttpScopeProvider::new(url, "secret-token");

        let domains = provider.fetch_authorized_targets().await.unwrap();

        assert_eq!(domains.len(), 3);
    }

    #[tokio::test]
    async fn test_http_provider_error_status() {
        let url = serve_once("401 Unauthorized", "{}").await;
        let provider = HttpScopeProvider::new(url, "secret-token");

        let err = provider.fetch_authorized_targets().await.unwrap_err();

        assert!(matches!(err, Error::Scope(_)));
    }
}
