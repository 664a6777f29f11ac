//! Plain HTTP fetcher.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult, ScrapeError};
use crate::traits::fetcher::{FetchedPage, PageFetcher};
use crate::types::config::FetchConfig;
use crate::types::content::FetchPath;

/// `reqwest`-backed [`PageFetcher`].
///
/// Sends an identifying user agent, follows a bounded number of redirects,
/// times out every request and truncates oversized bodies. It neither paces
/// nor retries.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher from config.
    pub fn new(config: &FetchConfig) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ScrapeError::Client(Box::new(e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Use a pre-built client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_body_bytes: FetchConfig::default().max_body_bytes,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.8")
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            warn!(url = %url, "Site refused request (403)");
            return Err(FetchError::Blocked {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Non-success status");
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Capture final URL after redirects
        let final_url = response.url().clone();

        let html = read_capped(url, response, self.max_body_bytes)
            .await
            .map_err(|e| transport_error(url, e))?;

        debug!(url = %url, bytes = html.len(), "HTTP fetch complete");

        Ok(FetchedPage {
            url: url.clone(),
            final_url,
            status: status.as_u16(),
            html,
            path: FetchPath::Http,
        })
    }
}

/// Read the body chunk by chunk, keeping at most `limit` bytes.
async fn read_capped(
    url: &Url,
    mut response: reqwest::Response,
    limit: usize,
) -> Result<String, reqwest::Error> {
    let content_length = response.content_length();
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let room = limit.saturating_sub(body.len());
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            warn!(url = %url, ?content_length, limit, "Response body over cap, truncated");
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn transport_error(url: &Url, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            source: Box::new(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response per connection on a local port.
    async fn serve(status_line: &'static str, body: &'static str, delay: Duration) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Url::parse(&format!("http://{}/team", addr)).unwrap()
    }

    fn fetcher(timeout_ms: u64) -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            timeout_ms,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = serve("200 OK", "<html><body>Hi</body></html>", Duration::ZERO).await;
        let page = fetcher(5_000).fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.path, FetchPath::Http);
        assert!(page.html.contains("Hi"));
    }

    #[tokio::test]
    async fn test_403_is_blocked() {
        let url = serve("403 Forbidden", "no", Duration::ZERO).await;
        let err = fetcher(5_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked { status: 403, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_status_errors() {
        let url = serve("503 Service Unavailable", "down", Duration::ZERO).await;
        let err = fetcher(5_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 503, .. }));
        assert!(err.is_transient());

        let url = serve("404 Not Found", "gone", Duration::ZERO).await;
        let err = fetcher(5_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let url = serve("200 OK", "slow", Duration::from_secs(5)).await;
        let err = fetcher(100).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_oversized_body_is_truncated() {
        let body = "<html><body><p>Jane Doe works with anxiety and trauma.</p></body></html>";
        let url = serve("200 OK", body, Duration::ZERO).await;
        let capped = HttpFetcher::new(&FetchConfig {
            max_body_bytes: 24,
            ..FetchConfig::default()
        })
        .unwrap();

        let page = capped.fetch(&url).await.unwrap();
        assert_eq!(page.html, &body[..24]);

        let page = fetcher(5_000).fetch(&url).await.unwrap();
        assert_eq!(page.html, body);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{}/", addr)).unwrap();
        let err = fetcher(2_000).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }
}
