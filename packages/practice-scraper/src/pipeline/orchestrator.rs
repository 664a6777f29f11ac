//! Scrape orchestration.
//!
//! [`Scraper::run`] drives one site through validation, robots.txt,
//! discovery and extraction, all sharing one request scheduler and one
//! cancellation token. Only an invalid root URL fails the run; everything
//! else ends up as a diagnostic next to whatever was extracted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{FetchError, ScrapeError};
use crate::fetchers::firecrawl::FirecrawlRenderer;
use crate::fetchers::http::HttpFetcher;
use crate::fetchers::retry::RetryPolicy;
use crate::fetchers::robots::{robots_url, RobotsTxt};
use crate::fetchers::scheduled::ScheduledFetcher;
use crate::fetchers::scheduler::RequestScheduler;
use crate::fetchers::sitemap::slug_text;
use crate::pipeline::extractor::ContentExtractor;
use crate::pipeline::finder::{FinderOutput, PageFinder};
use crate::pipeline::scoring::{assign_specialties, clean_anchor, dedupe_pages, NameTokens};
use crate::security::RenderCredentials;
use crate::traits::fetcher::{PageFetcher, Renderer};
use crate::types::config::ScrapeConfig;
use crate::types::content::{ExtractedContent, PageExtraction};
use crate::types::page::{DiscoveredPage, LinkSource, PageKind, ScrapeRequest};
use crate::types::result::{Diagnostic, DiagnosticKind, SiteScrapeResult, Stage};
use crate::validator::{dedupe, dedupe_key, normalize, normalize_input, UrlValidator};

/// Scrapes therapy-practice sites.
///
/// # Example
///
/// ```rust,ignore
/// use practice_scraper::{ScrapeConfig, ScrapeRequest, Scraper, SiteTarget};
/// use tokio_util::sync::CancellationToken;
///
/// let scraper = Scraper::http(ScrapeConfig::from_env()?, None)?;
/// let request = ScrapeRequest::new(SiteTarget::new("calmwaters.com").with_therapist("Jane Doe"))
///     .with_specialties(["Anxiety", "EMDR"]);
/// let result = scraper.run(&request, &CancellationToken::new()).await?;
/// ```
pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    config: ScrapeConfig,
    validator: UrlValidator,
}

impl Scraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: ScrapeConfig) -> Self {
        Self {
            fetcher,
            renderer: None,
            config,
            validator: UrlValidator::new(),
        }
    }

    /// Real HTTP fetcher, plus the Firecrawl render path when credentials are given.
    pub fn http(
        config: ScrapeConfig,
        credentials: Option<RenderCredentials>,
    ) -> Result<Self, ScrapeError> {
        let fetcher = HttpFetcher::new(&config.fetch)?;
        let renderer = match credentials {
            Some(credentials) => {
                Some(Arc::new(FirecrawlRenderer::new(credentials)?) as Arc<dyn Renderer>)
            }
            None => None,
        };
        Ok(Self::new(Arc::new(fetcher), config).with_renderer(renderer))
    }

    pub fn with_renderer(mut self, renderer: Option<Arc<dyn Renderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the SSRF guard (e.g. to allow a local fixture host).
    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Scrape one site for one therapist.
    ///
    /// Returns `Err` only when the root URL is invalid, before any request is
    /// made. Cancelling `cancel` (or exhausting the configured budget) stops
    /// outstanding work; items not attempted are reported as `Cancelled` (or
    /// `BudgetExhausted`) diagnostics.
    pub async fn run(
        &self,
        request: &ScrapeRequest,
        cancel: &CancellationToken,
    ) -> Result<SiteScrapeResult, ScrapeError> {
        let started_at = Utc::now();
        let run_id = Uuid::now_v7();
        let root = self.validator.validate_root(&request.target.root_url)?;

        info!(
            run_id = %run_id,
            url = %root,
            therapist = request.target.therapist_name.as_deref().unwrap_or("-"),
            specialties = request.specialties.len(),
            "Starting scrape"
        );

        let mut result = SiteScrapeResult {
            run_id,
            root_url: root.clone(),
            therapist_name: request.target.therapist_name.clone(),
            therapist: None,
            specialties: IndexMap::new(),
            pages: Vec::new(),
            diagnostics: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        if cancel.is_cancelled() {
            result.diagnostics.push(Diagnostic::warning(
                Stage::Orchestration,
                DiagnosticKind::Cancelled,
                "cancelled before start",
            ));
            result.finished_at = Utc::now();
            return Ok(result);
        }

        let token = cancel.child_token();
        let budget_hit = Arc::new(AtomicBool::new(false));
        let watcher = {
            let token = token.clone();
            let budget_hit = budget_hit.clone();
            let budget = self.config.budget();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(budget) => {
                        budget_hit.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                }
            })
        };

        self.execute(request, &root, &token, &mut result).await;
        watcher.abort();

        if budget_hit.load(Ordering::SeqCst) {
            warn!(run_id = %run_id, budget_ms = self.config.budget_ms, "Scrape budget exhausted");
            for diagnostic in result
                .diagnostics
                .iter_mut()
                .filter(|d| d.kind == DiagnosticKind::Cancelled)
            {
                diagnostic.kind = DiagnosticKind::BudgetExhausted;
                diagnostic.message = format!("time budget exhausted: {}", diagnostic.message);
            }
        }

        result.finished_at = Utc::now();
        info!(
            run_id = %run_id,
            url = %root,
            therapist_found = result.therapist.is_some(),
            specialties = result.specialties.len(),
            diagnostics = result.diagnostics.len(),
            elapsed_ms = (result.finished_at - result.started_at).num_milliseconds(),
            "Scrape finished"
        );

        Ok(result)
    }

    async fn execute(
        &self,
        request: &ScrapeRequest,
        root: &Url,
        token: &CancellationToken,
        result: &mut SiteScrapeResult,
    ) {
        let scheduler = Arc::new(RequestScheduler::new(self.config.pacing.min_interval()));
        let fetcher = ScheduledFetcher::new(
            self.fetcher.clone(),
            scheduler.clone(),
            RetryPolicy::from_config(&self.config.retry),
        )
        .with_renderer(self.renderer.clone());

        let robots = if self.config.pacing.respect_robots {
            self.load_robots(root, &fetcher, token, &mut result.diagnostics)
                .await
        } else {
            RobotsTxt::allow_all()
        };

        let manual_therapists = self.manual_pages(
            &request.manual_therapist_urls,
            PageKind::TherapistPage,
            &mut result.diagnostics,
        );
        let manual_specialties = self.manual_pages(
            &request.manual_specialty_urls,
            PageKind::SpecialtyPage,
            &mut result.diagnostics,
        );

        let finder = PageFinder::new(fetcher.clone(), &self.config).with_robots(Arc::new(robots));
        let found = finder
            .find(
                root,
                request.target.therapist_name.as_deref(),
                &request.specialties,
                token,
            )
            .await;

        result
            .diagnostics
            .extend(found.diagnostics.iter().cloned().filter(|d| {
                !(d.kind == DiagnosticKind::NoTherapistsFound && !manual_therapists.is_empty())
                    && !(d.kind == DiagnosticKind::NoSpecialtiesFound
                        && !manual_specialties.is_empty())
            }));

        let therapist_page = manual_therapists
            .first()
            .cloned()
            .or_else(|| found.therapist.clone());

        let candidates = dedupe_pages(
            manual_specialties
                .iter()
                .cloned()
                .chain(found.specialties.iter().cloned())
                .collect(),
        );
        let (mut assigned, unmatched) = assign_specialties(&request.specialties, &candidates);
        result.diagnostics.extend(unmatched);

        // Manual pages are always scraped, even when no requested name matched them
        for page in &manual_specialties {
            let used = assigned
                .values()
                .any(|p| dedupe_key(&p.url) == dedupe_key(&page.url));
            if !used {
                assigned
                    .entry(clean_anchor(page))
                    .or_insert_with(|| page.clone());
            }
        }

        result.pages = dedupe_pages(
            therapist_page
                .iter()
                .cloned()
                .chain(found.pages())
                .chain(manual_specialties.iter().cloned())
                .collect(),
        );

        let bios = self.existing_bios(request, root);
        let extractor = ContentExtractor::new(fetcher, &self.config);
        let person = request
            .target
            .therapist_name
            .as_deref()
            .and_then(|name| NameTokens::parse(name, &self.config.scoring));

        if let Some(page) = &therapist_page {
            let (extraction, diagnostics) = extract_page(
                &extractor,
                page,
                &found,
                person.as_ref(),
                &bios,
                token,
            )
            .await;
            result.therapist = Some(extraction);
            result.diagnostics.extend(diagnostics);
        }

        self.extract_specialties(&extractor, assigned, &found, &bios, token, result)
            .await;
    }

    /// Extract every assigned specialty on the worker pool.
    ///
    /// Each distinct URL is fetched once; results are keyed back in request order.
    async fn extract_specialties(
        &self,
        extractor: &ContentExtractor,
        assigned: IndexMap<String, DiscoveredPage>,
        found: &FinderOutput,
        bios: &HashMap<String, String>,
        token: &CancellationToken,
        result: &mut SiteScrapeResult,
    ) {
        let mut unique: IndexMap<String, &DiscoveredPage> = IndexMap::new();
        for page in assigned.values() {
            unique.entry(dedupe_key(&page.url)).or_insert(page);
        }

        let workers = self.config.workers.max(1);
        debug!(pages = unique.len(), workers = workers, "Extracting specialty pages");

        let outcomes: HashMap<String, (PageExtraction, Vec<Diagnostic>)> =
            stream::iter(unique.into_iter().map(|(key, page)| async move {
                let outcome = extract_page(extractor, page, found, None, bios, token).await;
                (key, outcome)
            }))
            .buffer_unordered(workers)
            .collect()
            .await;

        for (name, page) in &assigned {
            let Some((extraction, diagnostics)) = outcomes.get(&dedupe_key(&page.url)) else {
                continue;
            };
            result.diagnostics.extend(
                diagnostics
                    .iter()
                    .cloned()
                    .map(|d| d.with_specialty(name.clone())),
            );
            result.specialties.insert(name.clone(), extraction.clone());
        }
    }

    /// Fetch and apply robots.txt; any failure means "allow everything".
    async fn load_robots(
        &self,
        root: &Url,
        fetcher: &ScheduledFetcher,
        token: &CancellationToken,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> RobotsTxt {
        let Some(url) = robots_url(root) else {
            return RobotsTxt::allow_all();
        };

        let page = match fetcher.fetch(&url, token).await.result {
            Ok(page) => page,
            Err(FetchError::Http {
                status: 404 | 410, ..
            }) => {
                debug!(url = %url, "No robots.txt");
                return RobotsTxt::allow_all();
            }
            Err(FetchError::Cancelled) => return RobotsTxt::allow_all(),
            Err(error) => {
                warn!(url = %url, error = %error, "robots.txt unavailable, assuming allow-all");
                diagnostics.push(
                    Diagnostic::warning(Stage::Robots, DiagnosticKind::from(&error), error.to_string())
                        .with_url(&url),
                );
                return RobotsTxt::allow_all();
            }
        };

        let robots = RobotsTxt::parse(&page.html);
        let agent = &self.config.fetch.user_agent;

        if let Some(delay) = robots.crawl_delay(agent) {
            let cap = self.config.pacing.max_crawl_delay();
            if delay > cap {
                warn!(
                    url = %root,
                    crawl_delay_ms = delay.as_millis() as u64,
                    cap_ms = cap.as_millis() as u64,
                    "Crawl-delay above cap, using cap"
                );
            }
            if delay > fetcher.scheduler().default_interval() {
                fetcher.scheduler().set_interval(root, delay.min(cap)).await;
            }
        }

        if robots.disallows_all(agent) {
            warn!(url = %root, "robots.txt disallows all crawling");
        }

        robots
    }

    /// Validate caller-supplied URLs; bad ones become `InvalidManualUrl` warnings.
    fn manual_pages(
        &self,
        raw: &[String],
        kind: PageKind,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<DiscoveredPage> {
        let mut urls = Vec::new();

        for value in raw.iter().filter(|v| !v.trim().is_empty()) {
            let checked = normalize_input(value)
                .and_then(|url| self.validator.guard(&url).map(|()| url));
            match checked {
                Ok(url) => urls.push(url),
                Err(error) => diagnostics.push(Diagnostic::warning(
                    Stage::Validation,
                    DiagnosticKind::InvalidManualUrl,
                    format!("ignoring manual URL {:?}: {}", value, error),
                )),
            }
        }

        dedupe(&urls)
            .into_iter()
            .map(|url| {
                let anchor = slug_text(&url);
                DiscoveredPage::new(url, kind, 1.0, anchor, LinkSource::Manual)
            })
            .collect()
    }

    /// Caller-supplied bios keyed by dedupe key. Keys may be absolute or site-relative.
    fn existing_bios(&self, request: &ScrapeRequest, root: &Url) -> HashMap<String, String> {
        request
            .existing_bios
            .iter()
            .filter_map(|(key, bio)| {
                let url = if key.trim_start().starts_with('/') {
                    normalize(key, root)
                } else {
                    normalize_input(key)
                };
                url.ok().map(|url| (dedupe_key(&url), bio.clone()))
            })
            .collect()
    }
}

/// Extract one page, reusing a page fetched during discovery when possible.
async fn extract_page(
    extractor: &ContentExtractor,
    page: &DiscoveredPage,
    found: &FinderOutput,
    person: Option<&NameTokens>,
    bios: &HashMap<String, String>,
    token: &CancellationToken,
) -> (PageExtraction, Vec<Diagnostic>) {
    let existing_bio = bios
        .get(&dedupe_key(&page.url))
        .map(|bio| ExtractedContent::existing_bio(page.url.clone(), bio));

    if token.is_cancelled() {
        let diagnostic = Diagnostic::warning(
            Stage::Orchestration,
            DiagnosticKind::Cancelled,
            format!("not attempted: {}", page.url),
        )
        .with_url(&page.url);
        let extraction = PageExtraction::new(ExtractedContent::empty(page.url.clone()))
            .with_existing_bio(existing_bio);
        return (extraction, vec![diagnostic]);
    }

    let outcome = extractor
        .extract(&page.url, found.fetched(&page.url).cloned(), person, token)
        .await;

    (
        PageExtraction::new(outcome.content).with_existing_bio(existing_bio),
        outcome.diagnostics,
    )
}
