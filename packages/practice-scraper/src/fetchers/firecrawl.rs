//! Firecrawl-backed render path.
//!
//! Uses the Firecrawl `/scrape` endpoint to execute a page's scripts and
//! return the rendered HTML. Only consulted when the plain HTTP response is
//! too sparse to extract from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult, ScrapeError};
use crate::security::RenderCredentials;
use crate::traits::fetcher::{FetchedPage, Renderer};
use crate::types::content::FetchPath;

/// [`Renderer`] calling the Firecrawl API.
///
/// # Example
///
/// ```rust,ignore
/// use practice_scraper::fetchers::FirecrawlRenderer;
/// use practice_scraper::security::RenderCredentials;
///
/// let renderer = RenderCredentials::from_env()
///     .map(FirecrawlRenderer::new)
///     .transpose()?;
/// ```
pub struct FirecrawlRenderer {
    client: Client,
    credentials: RenderCredentials,
}

#[derive(Serialize)]
struct ScrapeBody<'a> {
    url: &'a str,
    formats: [&'a str; 1],
    #[serde(rename = "onlyMainContent")]
    only_main_content: bool,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    html: Option<String>,
    metadata: Option<ScrapeMetadata>,
}

#[derive(Deserialize)]
struct ScrapeMetadata {
    #[serde(rename = "statusCode")]
    status_code: Option<u16>,
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
}

impl FirecrawlRenderer {
    /// Create a renderer with a 60 second request timeout.
    pub fn new(credentials: RenderCredentials) -> Result<Self, ScrapeError> {
        Self::with_timeout(credentials, Duration::from_secs(60))
    }

    pub fn with_timeout(credentials: RenderCredentials, timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Client(Box::new(e)))?;

        Ok(Self {
            client,
            credentials,
        })
    }

    fn render_error(url: &Url, reason: impl Into<String>) -> FetchError {
        FetchError::Render {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Renderer for FirecrawlRenderer {
    async fn render(&self, url: &Url) -> FetchResult<FetchedPage> {
        debug!(url = %url, "Rendering via Firecrawl");

        let endpoint = format!("{}/scrape", self.credentials.base_url);
        let body = ScrapeBody {
            url: url.as_str(),
            formats: ["html"],
            only_main_content: false,
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(self.credentials.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    Self::render_error(url, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Firecrawl API error");
            return Err(Self::render_error(
                url,
                format!("Firecrawl API error: {} - {}", status, text.trim()),
            ));
        }

        let parsed: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| Self::render_error(url, format!("invalid response: {}", e)))?;

        if !parsed.success {
            return Err(Self::render_error(
                url,
                parsed.error.unwrap_or_else(|| "scrape unsuccessful".to_string()),
            ));
        }

        let data = parsed
            .data
            .ok_or_else(|| Self::render_error(url, "response has no data"))?;
        let html = data
            .html
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Self::render_error(url, "response has no html"))?;

        let metadata = data.metadata;
        let status = metadata.as_ref().and_then(|m| m.status_code).unwrap_or(200);
        let final_url = metadata
            .and_then(|m| m.source_url)
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        Ok(FetchedPage {
            url: url.clone(),
            final_url,
            status,
            html,
            path: FetchPath::Rendered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_json(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}/v1", addr)
    }

    fn renderer(base: String) -> FirecrawlRenderer {
        FirecrawlRenderer::new(RenderCredentials::new("fc-test").with_base_url(base)).unwrap()
    }

    fn target() -> Url {
        Url::parse("https://example.com/team").unwrap()
    }

    #[tokio::test]
    async fn test_render_success() {
        let base = serve_json(
            "200 OK",
            r#"{"success":true,"data":{"html":"<html><body><p>Rendered</p></body></html>","metadata":{"statusCode":200,"sourceURL":"https://example.com/team/"}}}"#,
        )
        .await;

        let page = renderer(base).render(&target()).await.unwrap();
        assert_eq!(page.path, FetchPath::Rendered);
        assert!(page.html.contains("Rendered"));
        assert_eq!(page.final_url.as_str(), "https://example.com/team/");
    }

    #[tokio::test]
    async fn test_render_api_error() {
        let base = serve_json("402 Payment Required", r#"{"error":"out of credits"}"#).await;
        let err = renderer(base).render(&target()).await.unwrap_err();
        assert!(matches!(err, FetchError::Render { .. }));
        assert!(err.to_string().contains("402"));
    }

    #[tokio::test]
    async fn test_render_unsuccessful_payload() {
        let base = serve_json("200 OK", r#"{"success":false,"error":"blocked"}"#).await;
        let err = renderer(base).render(&target()).await.unwrap_err();
        assert!(matches!(err, FetchError::Render { reason, .. } if reason == "blocked"));
    }
}
