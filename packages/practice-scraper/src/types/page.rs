//! Scrape inputs and discovered pages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// The site to scrape and, optionally, whose page to look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTarget {
    /// Raw root URL as supplied; validated before any fetch
    pub root_url: String,

    /// Therapist display name, possibly with honorifics/credentials
    pub therapist_name: Option<String>,
}

impl SiteTarget {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            therapist_name: None,
        }
    }

    pub fn with_therapist(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.therapist_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self
    }
}

/// Everything a caller hands to [`Scraper::run`](crate::pipeline::orchestrator::Scraper::run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeRequest {
    pub target: SiteTarget,

    /// Requested specialty names, in the order results should be keyed
    pub specialties: Vec<String>,

    /// Therapist pages supplied by the caller; the first valid one wins
    pub manual_therapist_urls: Vec<String>,

    /// Specialty pages supplied by the caller
    pub manual_specialty_urls: Vec<String>,

    /// Bio text the caller already has, keyed by page URL
    pub existing_bios: HashMap<String, String>,
}

impl Default for SiteTarget {
    fn default() -> Self {
        Self::new("")
    }
}

impl ScrapeRequest {
    pub fn new(target: SiteTarget) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    /// Set the requested specialties.
    pub fn with_specialties(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.specialties = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .collect();
        self
    }

    /// Add a manual therapist URL.
    pub fn with_manual_therapist_url(mut self, url: impl Into<String>) -> Self {
        self.manual_therapist_urls.push(url.into());
        self
    }

    /// Add a manual specialty URL.
    pub fn with_manual_specialty_url(mut self, url: impl Into<String>) -> Self {
        self.manual_specialty_urls.push(url.into());
        self
    }

    /// Attach an existing bio for a page.
    pub fn with_existing_bio(mut self, url: impl Into<String>, bio: impl Into<String>) -> Self {
        self.existing_bios.insert(url.into(), bio.into());
        self
    }
}

/// What a discovered page is believed to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    TherapistPage,
    SpecialtyPage,
    Unknown,
}

/// Where a candidate link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Root,
    TeamPage,
    Sitemap,
    Manual,
}

/// A classified page. Built once by the finder (or from manual input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPage {
    pub url: Url,
    pub kind: PageKind,

    /// In [0, 1]
    pub confidence: f64,

    /// Anchor text of the link that led here
    pub anchor_text: String,

    pub source: LinkSource,
}

impl DiscoveredPage {
    /// Build a page; confidence is clamped to [0, 1].
    pub fn new(
        url: Url,
        kind: PageKind,
        confidence: f64,
        anchor_text: impl Into<String>,
        source: LinkSource,
    ) -> Self {
        Self {
            url,
            kind,
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            anchor_text: anchor_text.into(),
            source,
        }
    }
}
