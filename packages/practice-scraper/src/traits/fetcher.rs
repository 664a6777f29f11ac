//! Fetch seams.
//!
//! [`PageFetcher`] is the plain HTTP GET path; [`Renderer`] is the headless
//! render path used when a page's static HTML is too sparse. Both return the
//! same [`FetchedPage`], so extraction does not care which produced it.

use async_trait::async_trait;
use url::Url;

use crate::error::FetchResult;
use crate::types::content::FetchPath;

/// A successfully fetched HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: Url,

    /// URL after redirects
    pub final_url: Url,

    pub status: u16,
    pub html: String,
    pub path: FetchPath,
}

impl FetchedPage {
    /// A 200 response from the HTTP path, with no redirect.
    pub fn ok(url: Url, html: impl Into<String>) -> Self {
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            html: html.into(),
            path: FetchPath::Http,
        }
    }

    pub fn with_path(mut self, path: FetchPath) -> Self {
        self.path = path;
        self
    }

    pub fn with_final_url(mut self, url: Url) -> Self {
        self.final_url = url;
        self
    }
}

/// Plain HTTP GET.
///
/// Implementations map transport failures onto [`FetchError`](crate::error::FetchError):
/// a timeout becomes `Timeout`, 403 becomes `Blocked`, other non-success
/// statuses become `Http`. They do not retry or pace; that is the job of
/// [`ScheduledFetcher`](crate::fetchers::ScheduledFetcher).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a single URL.
    async fn fetch(&self, url: &Url) -> FetchResult<FetchedPage>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "http"
    }
}

/// Headless render path for script-built pages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render a URL and return the resulting HTML.
    async fn render(&self, url: &Url) -> FetchResult<FetchedPage>;
}
