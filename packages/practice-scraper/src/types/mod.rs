//! Core data types.

pub mod config;
pub mod content;
pub mod page;
pub mod result;

pub use config::{
    DiscoveryConfig, ExtractionConfig, FetchConfig, PacingConfig, RetryConfig, ScoringConfig,
    ScrapeConfig, SpecialtyWeights, TherapistWeights,
};
pub use content::{ExtractedContent, ExtractionMethod, FetchPath, PageExtraction};
pub use page::{DiscoveredPage, LinkSource, PageKind, ScrapeRequest, SiteTarget};
pub use result::{Diagnostic, DiagnosticKind, Severity, SiteScrapeResult, Stage};
