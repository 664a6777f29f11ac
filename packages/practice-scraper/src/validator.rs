//! URL normalization, same-site classification and SSRF protection.
//!
//! The free functions are pure: they never touch the network and never
//! panic. Callers skip links that fail validation; only the root URL of a
//! run is allowed to abort it.

use std::collections::HashSet;
use std::net::IpAddr;

use url::{Host, Url};

use crate::error::{UrlError, UrlResult};

/// Resolve `raw` against `base` and normalize it.
///
/// Lowercases scheme and host (the `url` crate does this for http(s)),
/// strips the fragment and rejects anything that is not http(s) or lacks a
/// host. `normalize(normalize(u).as_str(), base) == normalize(u, base)`.
pub fn normalize(raw: &str, base: &Url) -> UrlResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url = base.join(trimmed).map_err(|source| UrlError::Parse {
        url: trimmed.to_string(),
        source,
    })?;

    finish(url)
}

/// Normalize user input that may lack a scheme (`example.com` → `https://example.com/`).
pub fn normalize_input(raw: &str) -> UrlResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|source| UrlError::Parse {
        url: trimmed.to_string(),
        source,
    })?;

    finish(url)
}

fn finish(mut url: Url) -> UrlResult<Url> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::DisallowedScheme(other.to_string())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::NoHost),
    }

    url.set_fragment(None);
    Ok(url)
}

/// Host with a leading `www.` removed; the key used for pacing and same-site checks.
pub fn site_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// True iff both URLs belong to the same site, ignoring a `www.` prefix.
pub fn is_same_site(url: &Url, root: &Url) -> bool {
    let key = site_key(url);
    !key.is_empty() && key == site_key(root)
}

/// Identity used for de-duplication: site key, path without trailing slash, query.
pub fn dedupe_key(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    match url.query() {
        Some(query) => format!("{}{}?{}", site_key(url), path, query),
        None => format!("{}{}", site_key(url), path),
    }
}

/// Remove duplicates, keeping the first occurrence of each.
pub fn dedupe(urls: &[Url]) -> Vec<Url> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|url| seen.insert(dedupe_key(url)))
        .cloned()
        .collect()
}

/// Number of non-empty path segments (`/` is 0, `/team/jane` is 2).
pub fn path_depth(url: &Url) -> usize {
    url.path().split('/').filter(|s| !s.is_empty()).count()
}

/// Last non-empty path segment, if any.
pub fn last_segment(url: &Url) -> Option<&str> {
    url.path().split('/').filter(|s| !s.is_empty()).last()
}

/// Paths that never hold practitioner or specialty prose.
///
/// Markers match whole path segments (`/feed` but not `/feeding-disorders`),
/// extensions match the end of the last segment.
pub fn is_skip_path(path: &str) -> bool {
    const SKIP_SEGMENTS: &[&str] = &[
        "wp-admin", "wp-login", "wp-json", "login", "logout", "signin", "cart", "checkout",
        "cdn-cgi", "feed", "rss", "tag", "category",
    ];
    const SKIP_PREFIXES: &[&[&str]] = &[&["wp-content", "uploads"]];
    const SKIP_EXTENSIONS: &[&str] = &[
        ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".css", ".js", ".json", ".zip",
        ".mp3", ".mp4",
    ];

    let path_lower = path.to_lowercase();
    let segments: Vec<&str> = path_lower.split('/').filter(|s| !s.is_empty()).collect();

    // `wp-login.php` and `feed.xml` count as their marker
    let marker_hit = segments.iter().any(|segment| {
        let stem = segment.split('.').next().unwrap_or(*segment);
        SKIP_SEGMENTS.contains(&stem)
    });
    let prefix_hit = SKIP_PREFIXES
        .iter()
        .any(|prefix| segments.windows(prefix.len()).any(|w| w == *prefix));
    let extension_hit = segments
        .last()
        .is_some_and(|last| SKIP_EXTENSIONS.iter().any(|ext| last.ends_with(ext)));

    marker_hit || prefix_hit || extension_hit
}

/// SSRF guard applied to the root URL of a run.
///
/// Rejects:
/// - internal services (localhost, 127.0.0.1)
/// - private IP ranges (10.x, 172.16.x, 192.168.x)
/// - cloud metadata services (169.254.x, metadata.google.internal)
#[derive(Debug, Clone)]
pub struct UrlValidator {
    /// Blocked hostnames
    blocked_hosts: HashSet<String>,

    /// Blocked CIDR ranges
    blocked_cidrs: Vec<ipnet::IpNet>,

    /// Hosts that bypass the guard (local fixtures, tests)
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a validator with the default block lists.
    pub fn new() -> Self {
        let blocked_cidrs = [
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16", // Link-local / cloud metadata
            "127.0.0.0/8",
            "0.0.0.0/8",
            "::1/128",
            "fc00::/7",
            "fe80::/10",
        ]
        .iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect();

        Self {
            blocked_hosts: [
                "localhost",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs,
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses the guard).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    /// Normalize raw root input and check it against the block lists.
    pub fn validate_root(&self, raw: &str) -> UrlResult<Url> {
        let url = normalize_input(raw)?;
        self.guard(&url)?;
        Ok(url)
    }

    /// Check an already-normalized URL against the block lists.
    pub fn guard(&self, url: &Url) -> UrlResult<()> {
        let host_str = url.host_str().ok_or(UrlError::NoHost)?;

        if self.allowed_hosts.contains(host_str) {
            return Ok(());
        }

        let ip = match url.host() {
            Some(Host::Ipv4(ip)) => Some(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => Some(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => {
                if self.blocked_hosts.contains(domain) {
                    return Err(UrlError::BlockedHost(domain.to_string()));
                }
                None
            }
            None => return Err(UrlError::NoHost),
        };

        if let Some(ip) = ip {
            if self.blocked_cidrs.iter().any(|cidr| cidr.contains(&ip)) {
                return Err(UrlError::BlockedCidr(ip.to_string()));
            }
        }

        Ok(())
    }
}
