//! Paced, retried fetching.
//!
//! [`ScheduledFetcher`] is the only way the pipeline touches the network:
//! every attempt (HTTP or render) first waits for the domain's slot in the
//! shared [`RequestScheduler`], and failures go through the [`RetryPolicy`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::fetchers::retry::{RetryOutcome, RetryPolicy};
use crate::fetchers::scheduler::RequestScheduler;
use crate::traits::fetcher::{FetchedPage, PageFetcher, Renderer};

/// Fetcher + optional renderer behind one scheduler and retry policy.
#[derive(Clone)]
pub struct ScheduledFetcher {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    scheduler: Arc<RequestScheduler>,
    retry: RetryPolicy,
}

impl ScheduledFetcher {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        scheduler: Arc<RequestScheduler>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            renderer: None,
            scheduler,
            retry,
        }
    }

    /// Enable the render path.
    pub fn with_renderer(mut self, renderer: Option<Arc<dyn Renderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// GET a page under pacing and retry.
    pub async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> RetryOutcome<FetchedPage> {
        let fetcher = &self.fetcher;
        let scheduler = &self.scheduler;

        self.retry
            .run(url, cancel, |attempt| async move {
                scheduler.acquire(url, cancel).await?;
                debug!(url = %url, attempt = attempt, fetcher = fetcher.name(), "Fetching");
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    result = fetcher.fetch(url) => result,
                }
            })
            .await
    }

    /// Render a page under pacing and retry.
    ///
    /// Render requests are paced under the target site's domain.
    pub async fn render(&self, url: &Url, cancel: &CancellationToken) -> RetryOutcome<FetchedPage> {
        let Some(renderer) = self.renderer.as_ref() else {
            return RetryOutcome {
                result: Err(FetchError::RenderUnavailable),
                attempts: Vec::new(),
            };
        };
        let scheduler = &self.scheduler;

        self.retry
            .run(url, cancel, |attempt| async move {
                scheduler.acquire(url, cancel).await?;
                debug!(url = %url, attempt = attempt, "Rendering");
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    result = renderer.render(url) => result,
                }
            })
            .await
    }
}
