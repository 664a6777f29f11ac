//! Page discovery.
//!
//! Starting from the root page, the finder gathers same-site links from the
//! root, from the practice's team page (linked or probed), and optionally
//! from sitemaps, then scores them as therapist and specialty candidates.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::map::Entry;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::dom::Document;
use crate::error::{FetchError, FetchResult};
use crate::fetchers::robots::RobotsTxt;
use crate::fetchers::scheduled::ScheduledFetcher;
use crate::fetchers::sitemap::{parse_sitemap, slug_text, Sitemap, DEFAULT_SITEMAP_PATHS};
use crate::pipeline::links::{extract_links, CandidateLink};
use crate::pipeline::scoring::{
    is_home_path, rank, specialty_score, therapist_score, NameTokens, RequestedSpecialty, Score,
};
use crate::traits::fetcher::FetchedPage;
use crate::types::config::{DiscoveryConfig, ScoringConfig, ScrapeConfig};
use crate::types::page::{DiscoveredPage, LinkSource, PageKind};
use crate::types::result::{Diagnostic, DiagnosticKind, Stage};
use crate::validator::{dedupe, dedupe_key, is_same_site, is_skip_path, normalize};

/// Child sitemaps followed from one sitemap index.
const MAX_CHILD_SITEMAPS: usize = 5;

/// What discovery produced.
#[derive(Debug, Default)]
pub struct FinderOutput {
    /// Best therapist page above threshold
    pub therapist: Option<DiscoveredPage>,

    /// Specialty pages above threshold, best first
    pub specialties: Vec<DiscoveredPage>,

    pub diagnostics: Vec<Diagnostic>,

    /// Root URL plus its post-redirect URL
    pub site_roots: Vec<Url>,

    /// Pages fetched during discovery, keyed by dedupe key
    fetched: HashMap<String, FetchedPage>,
}

impl FinderOutput {
    /// Classified pages, therapist first.
    pub fn pages(&self) -> Vec<DiscoveredPage> {
        self.therapist
            .iter()
            .chain(self.specialties.iter())
            .cloned()
            .collect()
    }

    /// A page already fetched during discovery.
    pub fn fetched(&self, url: &Url) -> Option<&FetchedPage> {
        self.fetched.get(&dedupe_key(url))
    }

    fn remember(&mut self, page: FetchedPage) {
        self.fetched.insert(dedupe_key(&page.url), page);
    }

    fn report_missing(&mut self) {
        if self.therapist.is_none() {
            self.diagnostics.push(Diagnostic::warning(
                Stage::Discovery,
                DiagnosticKind::NoTherapistsFound,
                "no therapist page scored above threshold",
            ));
        }
        if self.specialties.is_empty() {
            self.diagnostics.push(Diagnostic::warning(
                Stage::Discovery,
                DiagnosticKind::NoSpecialtiesFound,
                "no specialty page scored above threshold",
            ));
        }
    }
}

/// Discovers the therapist page and specialty pages of one site.
pub struct PageFinder {
    fetcher: ScheduledFetcher,
    robots: Arc<RobotsTxt>,
    discovery: DiscoveryConfig,
    scoring: ScoringConfig,
    user_agent: String,
}

impl PageFinder {
    pub fn new(fetcher: ScheduledFetcher, config: &ScrapeConfig) -> Self {
        Self {
            fetcher,
            robots: Arc::new(RobotsTxt::allow_all()),
            discovery: config.discovery.clone(),
            scoring: config.scoring.clone(),
            user_agent: config.fetch.user_agent.clone(),
        }
    }

    /// Rules used to skip disallowed candidates and find sitemap hints.
    pub fn with_robots(mut self, robots: Arc<RobotsTxt>) -> Self {
        self.robots = robots;
        self
    }

    /// Run discovery for one site.
    ///
    /// Never fails: fetch problems and empty results come back as diagnostics.
    pub async fn find(
        &self,
        root: &Url,
        therapist_name: Option<&str>,
        requested: &[String],
        cancel: &CancellationToken,
    ) -> FinderOutput {
        let mut output = FinderOutput {
            site_roots: vec![root.clone()],
            ..Default::default()
        };

        if !self.allowed(root) {
            output.diagnostics.push(disallowed(root));
            output.report_missing();
            return output;
        }

        let root_page = match self.fetch_page(root, cancel).await {
            Ok(page) => page,
            Err(error) => {
                output
                    .diagnostics
                    .push(Diagnostic::from_fetch_error(Stage::Fetch, &error).with_url(root));
                if !matches!(error, FetchError::Cancelled) {
                    output.report_missing();
                }
                return output;
            }
        };

        output.site_roots = dedupe(&[root.clone(), root_page.final_url.clone()]);
        let root_doc = Document::parse(&root_page.html);
        let mut links = extract_links(
            &root_doc,
            &root_page.final_url,
            &output.site_roots,
            LinkSource::Root,
        );
        debug!(url = %root, links = links.len(), "Collected root links");
        output.remember(root_page);

        let team = self
            .locate_team_page(root, &links, cancel, &mut output.diagnostics)
            .await;
        if let Some((team_page, probed)) = team {
            let doc = Document::parse(&team_page.html);
            if probed {
                let anchor = doc
                    .first_heading()
                    .or_else(|| doc.title())
                    .unwrap_or_else(|| slug_text(&team_page.url));
                links.push(CandidateLink::bare(
                    team_page.url.clone(),
                    anchor,
                    LinkSource::TeamPage,
                ));
            }
            let team_links = extract_links(
                &doc,
                &team_page.final_url,
                &output.site_roots,
                LinkSource::TeamPage,
            );
            debug!(url = %team_page.url, links = team_links.len(), "Collected team page links");
            links.extend(team_links);
            output.remember(team_page);
        }

        if self.discovery.use_sitemap && !cancel.is_cancelled() {
            let sitemap_links = self.sitemap_links(root, &output.site_roots, cancel).await;
            debug!(url = %root, links = sitemap_links.len(), "Collected sitemap links");
            links.extend(sitemap_links);
        }

        let links = merge_links(links);
        self.classify(&links, therapist_name, requested, &mut output);

        info!(
            url = %root,
            candidates = links.len(),
            therapist = output.therapist.as_ref().map(|p| p.url.as_str()).unwrap_or("-"),
            specialties = output.specialties.len(),
            "Discovery complete"
        );

        output
    }

    fn allowed(&self, url: &Url) -> bool {
        self.robots.is_url_allowed(&self.user_agent, url)
    }

    async fn fetch_page(&self, url: &Url, cancel: &CancellationToken) -> FetchResult<FetchedPage> {
        self.fetcher.fetch(url, cancel).await.result
    }

    /// The team page and whether it was probed rather than linked.
    ///
    /// A root link to a candidate path wins (earliest candidate first);
    /// otherwise the first few candidate paths are probed in order.
    async fn locate_team_page(
        &self,
        root: &Url,
        links: &[CandidateLink],
        cancel: &CancellationToken,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<(FetchedPage, bool)> {
        let linked = self
            .discovery
            .candidate_paths
            .iter()
            .find_map(|path| links.iter().find(|link| has_path(&link.url, path)));

        if let Some(link) = linked {
            if !self.allowed(&link.url) {
                diagnostics.push(disallowed(&link.url));
                return None;
            }
            return match self.fetch_page(&link.url, cancel).await {
                Ok(page) => Some((page, false)),
                Err(FetchError::Cancelled) => None,
                Err(error) => {
                    diagnostics.push(
                        Diagnostic::from_fetch_error(Stage::Discovery, &error).with_url(&link.url),
                    );
                    None
                }
            };
        }

        for path in self
            .discovery
            .candidate_paths
            .iter()
            .take(self.discovery.max_probe_paths)
        {
            if cancel.is_cancelled() {
                return None;
            }
            let Ok(url) = root.join(path) else {
                continue;
            };
            if !self.allowed(&url) {
                debug!(url = %url, "Skipping disallowed probe");
                continue;
            }
            match self.fetch_page(&url, cancel).await {
                Ok(page) => {
                    debug!(url = %url, "Probed team page");
                    return Some((page, true));
                }
                Err(error) => debug!(url = %url, error = %error, "Team page probe failed"),
            }
        }

        None
    }

    /// Page URLs listed in the site's sitemaps, as bare candidate links.
    ///
    /// Robots.txt hints are tried first, then the conventional paths; the
    /// first location yielding entries wins. One level of sitemap index is
    /// followed.
    async fn sitemap_links(
        &self,
        root: &Url,
        site_roots: &[Url],
        cancel: &CancellationToken,
    ) -> Vec<CandidateLink> {
        let hinted = self
            .robots
            .sitemaps()
            .iter()
            .filter_map(|s| normalize(s, root).ok())
            .filter(|u| on_site(u, site_roots));
        let conventional = DEFAULT_SITEMAP_PATHS.iter().filter_map(|p| root.join(p).ok());
        let locations = dedupe(&hinted.chain(conventional).collect::<Vec<_>>());

        let limit = self.discovery.max_sitemap_urls;
        let mut entries = Vec::new();

        for location in locations {
            if cancel.is_cancelled() {
                break;
            }
            let Some(sitemap) = self.fetch_sitemap(&location, cancel).await else {
                continue;
            };
            entries.extend(sitemap.pages);

            for child in sitemap.children.iter().take(MAX_CHILD_SITEMAPS) {
                if entries.len() >= limit || cancel.is_cancelled() {
                    break;
                }
                let Ok(child_url) = normalize(child, root) else {
                    continue;
                };
                if !on_site(&child_url, site_roots) {
                    continue;
                }
                // Nested indexes are not followed
                if let Some(child_map) = self.fetch_sitemap(&child_url, cancel).await {
                    entries.extend(child_map.pages);
                }
            }

            if !entries.is_empty() {
                break;
            }
        }

        entries
            .iter()
            .filter_map(|loc| normalize(loc, root).ok())
            .filter(|u| on_site(u, site_roots) && !is_skip_path(u.path()) && !is_home_path(u))
            .take(limit)
            .map(|url| {
                let anchor = slug_text(&url);
                CandidateLink::bare(url, anchor, LinkSource::Sitemap)
            })
            .collect()
    }

    async fn fetch_sitemap(&self, url: &Url, cancel: &CancellationToken) -> Option<Sitemap> {
        match self.fetch_page(url, cancel).await {
            Ok(page) => match parse_sitemap(&page.html) {
                Ok(sitemap) => Some(sitemap),
                Err(error) => {
                    debug!(url = %url, error = %error, "Unparseable sitemap");
                    None
                }
            },
            Err(error) => {
                debug!(url = %url, error = %error, "Sitemap unavailable");
                None
            }
        }
    }

    fn classify(
        &self,
        links: &[CandidateLink],
        therapist_name: Option<&str>,
        requested: &[String],
        output: &mut FinderOutput,
    ) {
        let name = therapist_name.and_then(|n| NameTokens::parse(n, &self.scoring));
        let wanted: Vec<RequestedSpecialty> =
            requested.iter().map(|r| RequestedSpecialty::new(r)).collect();

        let therapists = ranked(links, self.scoring.therapist.threshold, |link| {
            therapist_score(link, name.as_ref(), self.discovery.roster_min_links, &self.scoring)
        });
        for (link, score) in therapists {
            if !self.allowed(&link.url) {
                output.diagnostics.push(disallowed(&link.url));
                continue;
            }
            output.therapist = Some(page(link, PageKind::TherapistPage, score));
            break;
        }

        let therapist_key = output.therapist.as_ref().map(|p| dedupe_key(&p.url));
        let candidates: Vec<CandidateLink> = links
            .iter()
            .filter(|link| Some(dedupe_key(&link.url)) != therapist_key)
            .cloned()
            .collect();
        let specialties = ranked(&candidates, self.scoring.specialty.threshold, |link| {
            specialty_score(link, &wanted, &self.scoring)
        });
        for (link, score) in specialties {
            if output.specialties.len() >= self.discovery.max_specialty_pages {
                break;
            }
            if !self.allowed(&link.url) {
                output.diagnostics.push(disallowed(&link.url));
                continue;
            }
            output
                .specialties
                .push(page(link, PageKind::SpecialtyPage, score));
        }

        output.report_missing();
    }
}

/// Links whose reported confidence is at or above `threshold`, best first.
fn ranked<F>(links: &[CandidateLink], threshold: f64, score: F) -> Vec<(&CandidateLink, Score)>
where
    F: Fn(&CandidateLink) -> Score,
{
    let mut scored: Vec<(&CandidateLink, Score)> = links
        .iter()
        .map(|link| (link, score(link)))
        .filter(|(_, s)| s.confidence >= threshold)
        .collect();
    scored.sort_by(|(a, sa), (b, sb)| rank(sa.raw, &a.url, sb.raw, &b.url));
    scored
}

fn page(link: &CandidateLink, kind: PageKind, score: Score) -> DiscoveredPage {
    DiscoveredPage::new(
        link.url.clone(),
        kind,
        score.confidence,
        link.anchor_text.clone(),
        link.source,
    )
}

fn disallowed(url: &Url) -> Diagnostic {
    Diagnostic::warning(
        Stage::Robots,
        DiagnosticKind::RobotsDisallowed,
        format!("robots.txt disallows {}", url),
    )
    .with_url(url)
}

fn on_site(url: &Url, site_roots: &[Url]) -> bool {
    site_roots.iter().any(|root| is_same_site(url, root))
}

fn has_path(url: &Url, path: &str) -> bool {
    url.path()
        .trim_end_matches('/')
        .eq_ignore_ascii_case(path.trim_end_matches('/'))
}

/// Combine links from several sources, keeping the first of each URL.
///
/// Later duplicates fill in a missing anchor or heading and can raise the
/// roster size (a bio link seen both in the nav and in a team grid).
fn merge_links(links: Vec<CandidateLink>) -> Vec<CandidateLink> {
    let mut merged: IndexMap<String, CandidateLink> = IndexMap::new();

    for link in links {
        match merged.entry(dedupe_key(&link.url)) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.anchor_text.is_empty() {
                    existing.anchor_text = link.anchor_text;
                }
                if existing.context_heading.is_none() {
                    existing.context_heading = link.context_heading;
                }
                existing.roster_size = existing.roster_size.max(link.roster_size);
            }
            Entry::Vacant(entry) => {
                entry.insert(link);
            }
        }
    }

    merged.into_values().collect()
}
