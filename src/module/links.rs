use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::{AssessmentModule, ModuleDescriptor};
use crate::config::ScanConfiguration;
use crate::error::Result;
use crate::model::{Scan, Target};

/// Fetches the target's landing page and stores same-host links in
/// `target.links`.
pub struct LinkDiscovery {
    descriptor: ModuleDescriptor,
}

impl LinkDiscovery {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(
                "Link Discovery",
                "Collects same-host links from the target's landing page.",
            ),
        }
    }
}

impl Default for LinkDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client honoring the scan's user agent, proxies, TLS flag and timeout.
pub(crate) fn http_client(config: &ScanConfiguration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .danger_accept_invalid_certs(!config.verify_ssl);

    if let Some(proxies) = &config.proxies {
        for (scheme, url) in proxies {
            let proxy = match scheme.as_str() {
                "http" => reqwest::Proxy::http(url)?,
                "https" => reqwest::Proxy::https(url)?,
                _ => reqwest::Proxy::all(url)?,
            };
            builder = builder.proxy(proxy);
        }
    }

    Ok(builder.build()?)
}

/// Extracts `href` values of `<a>` and `<link>` elements that point at the
/// same host as `base`.
///
/// Relative links are resolved against `base` and fragments are dropped.
pub fn extract_links(base: &Url, body: &str) -> BTreeSet<String> {
    let mut links = BTreeSet::new();
    let Ok(selector) = Selector::parse("a[href], link[href]") else {
        return links;
    };

    let document = Html::parse_document(body);
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        if let Ok(mut url) = base.join(href) {
            if !matches!(url.scheme(), "http" | "https") || url.host_str() != base.host_str() {
                continue;
            }
            url.set_fragment(None);
            links.insert(url.to_string());
        }
    }

    links
}

#[async_trait]
impl AssessmentModule for LinkDiscovery {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()> {
        let base = match Url::parse(&target.url()) {
            Ok(url) => url,
            Err(e) => {
                warn!(target = %target.raw, error = %e, "target is not a fetchable URL");
                return Ok(());
            }
        };

        let client = http_client(&scan.configuration)?;
        let body = match fetch(&client, &base).await {
            Ok(body) => body,
            Err(e) => {
                warn!(target = %target.raw, url = %base, error = %e, "link discovery fetch failed");
                return Ok(());
            }
        };

        let links = extract_links(&base, &body);
        debug!(target = %target.raw, links = links.len(), "links discovered");
        target.links.extend(links);
        Ok(())
    }
}

async fn fetch(client: &reqwest::Client, url: &Url) -> std::result::Result<String, reqwest::Error> {
    client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = r##"<html><body>
        <a href="/login">Login</a>
        <a HREF='about.html#team'>About</a>
        <a href=/plain>Plain</a>
        <a href="#top">Top</a>
        <a href="https://other.example.org/">Elsewhere</a>
        <a href="mailto:security@example.com">Mail</a>
        <link rel="stylesheet" href="/static/site.css">
    </body></html>"##;

    #[test]
    fn test_extract_same_host_links() {
        let base = Url::parse("http://example.com/docs/").unwrap();
        let links = extract_links(&base, PAGE);

        assert_eq!(
            links.into_iter().collect::<Vec<_>>(),
            vec![
                "http://example.com/docs/about.html",
                "http://example.com/login",
                "http://example.com/plain",
                "http://example.com/static/site.css",
            ]
        );
    }

    #[test]
    fn test_extract_ignores_unterminated_attribute() {
        let base = Url::parse("http://example.com/").unwrap();
        assert!(extract_links(&base, "<a href=").is_empty());
        assert!(extract_links(&base, "no links here").is_empty());
    }

    #[test]
    fn test_extract_only_reads_link_elements() {
        let base = Url::parse("http://example.com/").unwrap();
        let page = r#"<html><body>
            <a href="/real">Real</a>
            <!-- <a href="/commented-out">old</a> -->
            <div data-href="/not-a-link">card</div>
            <p>Set href=/from-text to configure it.</p>
            <script>document.write('<a href="/in-script">x</a>');</script>
        </body></html>"#;

        assert_eq!(
            extract_links(&base, page).into_iter().collect::<Vec<_>>(),
            vec!["http://example.com/real"]
        );
    }

    #[test]
    fn test_http_client_accepts_proxy_map() {
        let mut config = ScanConfiguration::default();
        config.verify_ssl = false;
        config.proxies = Some(
            [
                ("http".to_string(), "http://127.0.0.1:8080".to_string()),
                ("https".to_string(), "http://127.0.0.1:8443".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        assert!(http_client(&config).is_ok());
    }

    async fn serve_once(body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        port
    }

    #[tokio::test]
    async fn test_run_populates_target_links() {
        let port = serve_once(PAGE).await;
        let mut target = Target::new(format!("http://127.0.0.1:{}/", port)).unwrap();
        let mut scan = Scan::new(ScanId(1), target.clone(), "web", ScanConfiguration::default());

        LinkDiscovery::new().run(&mut target, &mut scan).await.unwrap();

        assert!(target.links.contains(&format!("http://127.0.0.1:{}/login", port)));
        assert_eq!(target.links.len(), 4);
        assert!(scan.vulnerabilities().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_leaves_links_empty() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut target = Target::new(format!("http://127.0.0.1:{}/", port)).unwrap();
        let mut scan = Scan::new(ScanId(1), target.clone(), "web", ScanConfiguration::default());

        LinkDiscovery::new().run(&mut target, &mut scan).await.unwrap();

        assert!(target.links.is_empty());
    }
}
