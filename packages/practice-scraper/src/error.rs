//! Typed errors for the scraper library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Only [`ScrapeError`]
//! ever escapes a scrape run; everything else is converted into a
//! [`Diagnostic`](crate::types::result::Diagnostic) at the component boundary.

use thiserror::Error;

/// Errors that abort a scrape run before any network activity.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The root site URL could not be validated
    #[error("invalid root URL: {0}")]
    InvalidUrl(#[from] UrlError),

    /// The HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// URL validation failures (the `InvalidURLError` of the taxonomy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    /// Input was blank
    #[error("empty URL")]
    Empty,

    /// URL parsing failed
    #[error("cannot parse {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// URL scheme not allowed (e.g., file://, mailto:)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// Host is blocked (e.g., localhost, metadata services)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),
}

/// Per-attempt network failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded the bounded timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    /// Server refused us (403, or 429 that never cleared)
    #[error("blocked by {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    /// Connection-level failure (DNS, reset, TLS, body read)
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Headless render path failed
    #[error("render failed for {url}: {reason}")]
    Render { url: String, reason: String },

    /// No render path is configured
    #[error("no renderer configured")]
    RenderUnavailable,

    /// Run was cancelled or its budget ran out
    #[error("operation cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether the failure is worth another attempt.
    ///
    /// Timeouts, connection errors, 5xx and 429 are transient. Every other
    /// 4xx, including 403, is final.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::Blocked { .. }
            | FetchError::Render { .. }
            | FetchError::RenderUnavailable
            | FetchError::Cancelled => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } | FetchError::Blocked { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable present but unparsable
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    /// Config file could not be read
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `ScrapeConfig`
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Malformed sitemap XML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sitemap parse error at byte {position}: {message}")]
pub struct SitemapError {
    pub position: u64,
    pub message: String,
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for URL validation.
pub type UrlResult<T> = std::result::Result<T, UrlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let url = "https://example.com".to_string();
        assert!(FetchError::Timeout { url: url.clone() }.is_transient());
        assert!(FetchError::Http { url: url.clone(), status: 503 }.is_transient());
        assert!(FetchError::Http { url: url.clone(), status: 429 }.is_transient());
        assert!(!FetchError::Http { url: url.clone(), status: 404 }.is_transient());
        assert!(!FetchError::Blocked { url, status: 403 }.is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn test_status() {
        let err = FetchError::Http {
            url: "https://example.com".into(),
            status: 500,
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(FetchError::RenderUnavailable.status(), None);
    }
}
