//! Testing utilities including mock fetchers.
//!
//! These let applications and integration tests drive the whole scraper
//! against canned sites without touching the network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{FetchedPage, PageFetcher, Renderer};
use crate::types::content::FetchPath;

/// A canned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// 200 with this body
    Html(String),
    /// Non-success status (403 maps to `FetchError::Blocked`)
    Status(u16),
    Timeout,
    NetworkError,
}

impl MockResponse {
    fn into_result(self, url: &Url, path: FetchPath) -> FetchResult<FetchedPage> {
        match self {
            MockResponse::Html(html) => Ok(FetchedPage::ok(url.clone(), html).with_path(path)),
            MockResponse::Status(403) => Err(FetchError::Blocked {
                url: url.to_string(),
                status: 403,
            }),
            MockResponse::Status(status) => Err(FetchError::Http {
                url: url.to_string(),
                status,
            }),
            MockResponse::Timeout => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
            MockResponse::NetworkError => Err(FetchError::Network {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
            }),
        }
    }
}

/// Record of a request made to a mock.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: Url,
    pub at: Instant,
}

/// Scripted responses keyed by URL, with a call log.
///
/// Each URL has a response script; call `n` gets entry `n`, and the last
/// entry repeats. Unknown URLs answer 404.
///
/// # Example
///
/// ```rust
/// use practice_scraper::testing::{MockFetcher, MockResponse};
///
/// let fetcher = MockFetcher::new()
///     .with_page("https://example.com/", "<html><body>Home</body></html>")
///     .with_script(
///         "https://example.com/team",
///         vec![MockResponse::Status(503), MockResponse::Html("<p>Team</p>".into())],
///     );
/// ```
#[derive(Default, Clone)]
pub struct MockFetcher {
    scripts: Arc<RwLock<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<RwLock<Vec<MockCall>>>,
    latency: Duration,
}

/// Canonical key so `https://a.com` and `https://a.com/` match.
fn key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer this URL with the given HTML.
    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.with_script(url, vec![MockResponse::Html(html.into())])
    }

    /// Always answer this URL with the given status.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_script(url, vec![MockResponse::Status(status)])
    }

    /// Answer successive calls from the script; the last entry repeats.
    pub fn with_script(self, url: &str, script: Vec<MockResponse>) -> Self {
        self.scripts.write().unwrap().insert(key(url), script);
        self
    }

    /// Delay every response (uses tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Calls made to one URL.
    pub fn calls_to(&self, url: &str) -> usize {
        let key = key(url);
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.url.as_str() == key)
            .count()
    }

    /// Request start times, in order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.read().unwrap().iter().map(|c| c.at).collect()
    }

    /// URLs requested, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .map(|c| c.url.to_string())
            .collect()
    }

    fn respond(&self, url: &Url) -> MockResponse {
        let key = url.as_str().to_string();
        let previous = self
            .calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.url.as_str() == key)
            .count();

        self.calls.write().unwrap().push(MockCall {
            url: url.clone(),
            at: Instant::now(),
        });

        let scripts = self.scripts.read().unwrap();
        match scripts.get(&key) {
            Some(script) if !script.is_empty() => {
                script[previous.min(script.len() - 1)].clone()
            }
            _ => MockResponse::Status(404),
        }
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedPage> {
        let response = self.respond(url);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        response.into_result(url, FetchPath::Http)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Render path stub: canned rendered HTML per URL, failure otherwise.
#[derive(Default, Clone)]
pub struct StubRenderer {
    pages: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<RwLock<Vec<Url>>>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(key(url), html.into());
        self
    }

    pub fn calls(&self) -> Vec<Url> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, url: &Url) -> FetchResult<FetchedPage> {
        self.calls.write().unwrap().push(url.clone());
        let html = self.pages.read().unwrap().get(url.as_str()).cloned();
        match html {
            Some(html) => MockResponse::Html(html).into_result(url, FetchPath::Rendered),
            None => Err(FetchError::Render {
                url: url.to_string(),
                reason: "no rendered page".to_string(),
            }),
        }
    }
}

/// Minimal HTML page with a title and raw body markup.
pub fn html_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{}</title></head><body>{}</body></html>",
        title, body
    )
}

/// A paragraph of filler prose about `topic`, long enough to pass the
/// content-length thresholds.
pub fn prose(topic: &str) -> String {
    format!(
        "<p>{topic} is at the heart of our work. We offer a warm, collaborative space \
         where clients explore {topic} at their own pace, build practical skills, and \
         leave each session with something concrete to practice during the week.</p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_mock_fetcher_scripts() {
        let fetcher = MockFetcher::new()
            .with_page("https://example.com", "<p>Home</p>")
            .with_script(
                "https://example.com/team",
                vec![MockResponse::Status(503), MockResponse::Html("<p>Team</p>".into())],
            );

        let home = fetcher.fetch(&url("https://example.com/")).await.unwrap();
        assert_eq!(home.html, "<p>Home</p>");

        let team = url("https://example.com/team");
        assert!(matches!(
            fetcher.fetch(&team).await,
            Err(FetchError::Http { status: 503, .. })
        ));
        assert!(fetcher.fetch(&team).await.is_ok());
        assert!(fetcher.fetch(&team).await.is_ok());

        assert!(matches!(
            fetcher.fetch(&url("https://example.com/missing")).await,
            Err(FetchError::Http { status: 404, .. })
        ));

        assert_eq!(fetcher.call_count(), 5);
        assert_eq!(fetcher.calls_to("https://example.com/team"), 3);
    }

    #[tokio::test]
    async fn test_mock_fetcher_403_is_blocked() {
        let fetcher = MockFetcher::new().with_status("https://example.com/", 403);
        assert!(matches!(
            fetcher.fetch(&url("https://example.com/")).await,
            Err(FetchError::Blocked { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_stub_renderer() {
        let renderer = StubRenderer::new().with_page("https://example.com/team", "<p>JS</p>");
        let page = renderer.render(&url("https://example.com/team")).await.unwrap();
        assert_eq!(page.path, FetchPath::Rendered);
        assert!(renderer.render(&url("https://example.com/other")).await.is_err());
        assert_eq!(renderer.calls().len(), 2);
    }
}
