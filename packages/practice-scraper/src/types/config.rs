//! Configuration types for fetching, discovery and extraction.
//!
//! Every struct is serde-deserializable with `#[serde(default)]`, so a JSON
//! config file only needs the fields it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for one scrape run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub fetch: FetchConfig,
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    pub extraction: ExtractionConfig,
    pub discovery: DiscoveryConfig,
    pub scoring: ScoringConfig,

    /// Specialty extractions in flight at once.
    ///
    /// Default: 3.
    pub workers: usize,

    /// Wall-clock budget for the whole run (milliseconds).
    ///
    /// Default: 120000.
    pub budget_ms: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
            extraction: ExtractionConfig::default(),
            discovery: DiscoveryConfig::default(),
            scoring: ScoringConfig::default(),
            workers: 3,
            budget_ms: 120_000,
        }
    }
}

impl ScrapeConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables, reading `.env` if present.
    ///
    /// Recognized variables (all optional):
    /// `PRACTICE_SCRAPER_MIN_INTERVAL_MS`, `PRACTICE_SCRAPER_TIMEOUT_MS`,
    /// `PRACTICE_SCRAPER_MAX_ATTEMPTS`, `PRACTICE_SCRAPER_WORKERS`,
    /// `PRACTICE_SCRAPER_BUDGET_MS`, `PRACTICE_SCRAPER_USER_AGENT`,
    /// `PRACTICE_SCRAPER_RESPECT_ROBOTS`, `PRACTICE_SCRAPER_USE_SITEMAP`.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `PRACTICE_SCRAPER_*` overrides from an arbitrary lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_MIN_INTERVAL_MS")? {
            self.pacing.min_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_TIMEOUT_MS")? {
            self.fetch.timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_MAX_BODY_BYTES")? {
            self.fetch.max_body_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_MAX_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_WORKERS")? {
            self.workers = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_BUDGET_MS")? {
            self.budget_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_RESPECT_ROBOTS")? {
            self.pacing.respect_robots = v;
        }
        if let Some(v) = parse_var(&lookup, "PRACTICE_SCRAPER_USE_SITEMAP")? {
            self.discovery.use_sitemap = v;
        }
        if let Some(agent) = lookup("PRACTICE_SCRAPER_USER_AGENT").filter(|s| !s.trim().is_empty()) {
            self.fetch.user_agent = agent;
        }
        Ok(self)
    }

    /// Set the minimum per-domain request interval.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.pacing.min_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the retry ceiling.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Set the specialty worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the wall-clock budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget_ms = budget.as_millis() as u64;
        self
    }

    /// Enable or disable robots.txt handling.
    pub fn with_respect_robots(mut self, respect: bool) -> Self {
        self.pacing.respect_robots = respect;
        self
    }

    /// Enable or disable sitemap discovery.
    pub fn with_sitemap(mut self, enabled: bool) -> Self {
        self.discovery.use_sitemap = enabled;
        self
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout (milliseconds). Default: 15000.
    pub timeout_ms: u64,

    /// Identifying user agent sent with every request.
    pub user_agent: String,

    /// Redirects followed before giving up. Default: 5.
    pub max_redirects: usize,

    /// Response bodies are truncated past this many bytes. Default: 5 MiB.
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            user_agent: default_user_agent(),
            max_redirects: 5,
            max_body_bytes: 5 * 1024 * 1024,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `practice-scraper/<crate version>`.
pub fn default_user_agent() -> String {
    format!("practice-scraper/{}", env!("CARGO_PKG_VERSION"))
}

/// Per-domain politeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Minimum delay between requests to the same domain (milliseconds).
    ///
    /// Default: 1500.
    pub min_interval_ms: u64,

    /// Honor robots.txt disallow rules and crawl-delay. Default: true.
    pub respect_robots: bool,

    /// Upper bound applied to a robots.txt crawl-delay (milliseconds).
    ///
    /// Default: 10000.
    pub max_crawl_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_500,
            respect_robots: true,
            max_crawl_delay_ms: 10_000,
        }
    }
}

impl PacingConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.max_crawl_delay_ms)
    }
}

/// Retry ceiling and exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first. Default: 3.
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds). Default: 500.
    pub base_delay_ms: u64,

    /// Cap on any single backoff delay (milliseconds). Default: 8000.
    pub max_delay_ms: u64,

    /// Growth factor per attempt. Default: 2.0.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
        }
    }
}

/// Content isolation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Below this many visible characters the page is re-fetched through
    /// the render path. Default: 200.
    pub min_body_text_len: usize,

    /// Share of the body's prose a candidate region must hold to be
    /// accepted as main content. Default: 0.4.
    pub dominance_ratio: f64,

    /// Extracted text shorter than this counts as empty. Default: 100.
    pub min_content_len: usize,

    /// Card-like containers needed before a region is treated as a
    /// roster of several people. Default: 2.
    pub roster_min_cards: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_body_text_len: 200,
            dominance_ratio: 0.4,
            min_content_len: 100,
            roster_min_cards: 2,
        }
    }
}

/// Link discovery bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Conventional team/about paths, probed in order.
    pub candidate_paths: Vec<String>,

    /// Candidate paths probed when the root links to none. Default: 3.
    pub max_probe_paths: usize,

    /// Cap on returned specialty pages. Default: 20.
    pub max_specialty_pages: usize,

    /// Read sitemaps for extra links. Default: true.
    pub use_sitemap: bool,

    /// Cap on URLs taken from sitemaps. Default: 500.
    pub max_sitemap_urls: usize,

    /// Similar links in one container needed for the roster bonus. Default: 3.
    pub roster_min_links: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            candidate_paths: strings(&[
                "/about",
                "/team",
                "/our-team",
                "/therapists",
                "/meet-the-team",
                "/staff",
                "/clinicians",
                "/providers",
                "/about-us",
                "/our-therapists",
            ]),
            max_probe_paths: 3,
            max_specialty_pages: 20,
            use_sitemap: true,
            max_sitemap_urls: 500,
            roster_min_links: 3,
        }
    }
}

/// Scoring weights, thresholds and vocabularies for page classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub therapist: TherapistWeights,
    pub specialty: SpecialtyWeights,

    /// Words that mark team/bio navigation.
    pub team_keywords: Vec<String>,

    /// Specialty terms; multi-word entries match as phrases.
    pub specialty_vocabulary: Vec<String>,

    /// Slug suffixes typical of specialty pages.
    pub specialty_suffixes: Vec<String>,

    /// Words marking service listings in a path or container heading.
    pub service_keywords: Vec<String>,

    /// Words marking pages that are never therapist or specialty pages.
    pub excluded_keywords: Vec<String>,

    /// Words that disqualify a page as a specialty page only.
    pub non_specialty_keywords: Vec<String>,

    /// Name prefixes stripped before matching.
    pub honorifics: Vec<String>,

    /// Professional credentials stripped from names and reported on pages.
    pub credentials: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            therapist: TherapistWeights::default(),
            specialty: SpecialtyWeights::default(),
            team_keywords: strings(&[
                "team",
                "about",
                "therapist",
                "therapists",
                "clinician",
                "clinicians",
                "staff",
                "provider",
                "providers",
                "meet",
                "bio",
                "counselor",
                "counselors",
            ]),
            specialty_vocabulary: strings(&[
                "anxiety",
                "depression",
                "trauma",
                "ptsd",
                "emdr",
                "couples",
                "family",
                "individual",
                "grief",
                "addiction",
                "ocd",
                "adhd",
                "eating disorders",
                "eating disorder",
                "child",
                "children",
                "adolescent",
                "teen",
                "teens",
                "relationship",
                "marriage",
                "stress",
                "bipolar",
                "substance",
                "lgbtq",
                "postpartum",
                "perinatal",
                "anger",
                "self esteem",
                "life transitions",
                "dbt",
                "cbt",
                "mindfulness",
                "play therapy",
                "art therapy",
                "group therapy",
                "therapy",
                "counseling",
                "treatment",
            ]),
            specialty_suffixes: strings(&["-therapy", "-counseling", "-treatment"]),
            service_keywords: strings(&[
                "services",
                "service",
                "specialties",
                "specialities",
                "specialty",
                "treat",
                "issues",
                "conditions",
                "approaches",
                "focus",
                "offer",
            ]),
            excluded_keywords: strings(&[
                "contact",
                "blog",
                "privacy",
                "terms",
                "faq",
                "faqs",
                "insurance",
                "fees",
                "rates",
                "location",
                "locations",
                "directions",
                "schedule",
                "careers",
                "jobs",
                "news",
                "events",
                "forms",
                "payment",
                "login",
            ]),
            non_specialty_keywords: strings(&[
                "about", "team", "staff", "meet", "bio", "therapists", "clinicians", "providers",
            ]),
            honorifics: strings(&["dr", "mr", "mrs", "ms", "mx", "miss", "prof"]),
            credentials: strings(&[
                "LCSW", "LMFT", "LMHC", "PHD", "PSYD", "MD", "LCSW-C", "LPC", "LPCC", "LCPC",
                "MSW", "MA", "MS", "CADC", "NCC", "LICSW", "LISW", "LCMHC", "LCAT", "ATR", "RN",
                "PMHNP", "CST", "ACS", "ACSW", "LCADC", "CAADC", "CSAC", "LMHP",
            ]),
        }
    }
}

/// Therapist page weights. Scores are clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TherapistWeights {
    pub name_exact: f64,
    /// Multiplied by the fraction of name tokens found.
    pub name_partial: f64,
    pub team_keyword_anchor: f64,
    pub team_keyword_path: f64,
    pub roster: f64,
    pub excluded_penalty: f64,
    pub threshold: f64,
}

impl Default for TherapistWeights {
    fn default() -> Self {
        Self {
            name_exact: 0.7,
            name_partial: 0.45,
            team_keyword_anchor: 0.3,
            team_keyword_path: 0.25,
            roster: 0.25,
            excluded_penalty: 0.4,
            threshold: 0.5,
        }
    }
}

/// Specialty page weights. Scores are clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialtyWeights {
    pub vocab_anchor: f64,
    pub vocab_path: f64,
    pub requested_match: f64,
    pub suffix: f64,
    pub service_path: f64,
    pub context_heading: f64,
    pub excluded_penalty: f64,
    pub threshold: f64,
}

impl Default for SpecialtyWeights {
    fn default() -> Self {
        Self {
            vocab_anchor: 0.45,
            vocab_path: 0.3,
            requested_match: 0.35,
            suffix: 0.15,
            service_path: 0.1,
            context_heading: 0.1,
            excluded_penalty: 0.5,
            threshold: 0.4,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.pacing.min_interval(), Duration::from_millis(1500));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.workers, 3);
        assert!(config.fetch.user_agent.starts_with("practice-scraper/"));
        assert_eq!(config.discovery.candidate_paths[0], "/about");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScrapeConfig =
            serde_json::from_str(r#"{"workers": 5, "pacing": {"min_interval_ms": 2000}}"#).unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.pacing.min_interval_ms, 2000);
        assert!(config.pacing.respect_robots);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PRACTICE_SCRAPER_MIN_INTERVAL_MS", "2500"),
            ("PRACTICE_SCRAPER_RESPECT_ROBOTS", "false"),
            ("PRACTICE_SCRAPER_USER_AGENT", "test-agent/1.0"),
        ]
        .into_iter()
        .collect();

        let config = ScrapeConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.pacing.min_interval_ms, 2500);
        assert!(!config.pacing.respect_robots);
        assert_eq!(config.fetch.user_agent, "test-agent/1.0");
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let result = ScrapeConfig::default().with_overrides(|key| {
            (key == "PRACTICE_SCRAPER_WORKERS").then(|| "many".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { key, .. }) if key == "PRACTICE_SCRAPER_WORKERS"
        ));
    }

    #[test]
    fn test_builders() {
        let config = ScrapeConfig::new()
            .with_min_interval(Duration::from_secs(2))
            .with_max_attempts(5)
            .with_workers(1)
            .with_budget(Duration::from_secs(30))
            .with_sitemap(false);
        assert_eq!(config.pacing.min_interval_ms, 2000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.workers, 1);
        assert_eq!(config.budget(), Duration::from_secs(30));
        assert!(!config.discovery.use_sitemap);
    }
}
