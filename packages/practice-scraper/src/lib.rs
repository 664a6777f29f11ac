//! Therapy-Practice Site Scraper
//!
//! Finds, within an arbitrary therapy-practice website, the page describing a
//! named therapist and the pages describing their specialties, and extracts
//! the prose needed to ground downstream bio writing.
//!
//! # Design
//!
//! - Discovery is heuristic and table-driven: links are scored with weights
//!   and vocabularies from [`ScoringConfig`], never hard-coded per site
//! - Politeness is enforced in one place: every request goes through a shared
//!   per-domain scheduler and a retry policy
//! - Partial success is normal: only an invalid root URL fails a run, all
//!   other problems come back as [`Diagnostic`]s
//!
//! # Usage
//!
//! ```rust,ignore
//! use practice_scraper::{ScrapeConfig, ScrapeRequest, Scraper, SiteTarget};
//! use tokio_util::sync::CancellationToken;
//!
//! let scraper = Scraper::http(ScrapeConfig::from_env()?, None)?;
//! let request = ScrapeRequest::new(
//!     SiteTarget::new("calmwaters.com").with_therapist("Dr. Jane Doe, LCSW"),
//! )
//! .with_specialties(["Anxiety", "EMDR"]);
//!
//! let result = scraper.run(&request, &CancellationToken::new()).await?;
//! for (name, extraction) in &result.specialties {
//!     println!("{}: {} blocks", name, extraction.content.blocks.len());
//! }
//! ```
//!
//! # Modules
//!
//! - [`validator`] - URL normalization, same-site checks and the SSRF guard
//! - [`dom`] - Typed document tree built from parsed HTML
//! - [`fetchers`] - HTTP and render fetchers, pacing, retry, robots.txt, sitemaps
//! - [`pipeline`] - Link extraction, scoring, discovery, extraction, orchestration
//! - [`types`] - Configuration, requests, pages, content and results
//! - [`security`] - Credential handling
//! - [`testing`] - Mock fetchers for tests

pub mod dom;
pub mod error;
pub mod fetchers;
pub mod pipeline;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;
pub mod validator;

// Re-export core types at crate root
pub use error::{ConfigError, FetchError, ScrapeError, UrlError};
pub use traits::{FetchedPage, PageFetcher, Renderer};
pub use types::{
    config::{
        DiscoveryConfig, ExtractionConfig, FetchConfig, PacingConfig, RetryConfig, ScoringConfig,
        ScrapeConfig,
    },
    content::{ExtractedContent, ExtractionMethod, FetchPath, PageExtraction},
    page::{DiscoveredPage, LinkSource, PageKind, ScrapeRequest, SiteTarget},
    result::{Diagnostic, DiagnosticKind, Severity, SiteScrapeResult, Stage},
};

pub use pipeline::Scraper;

// Re-export fetchers
pub use fetchers::{FirecrawlRenderer, HttpFetcher, RequestScheduler, RetryPolicy, RobotsTxt};

pub use security::RenderCredentials;
pub use validator::UrlValidator;
