//! API credentials for the render path.
//!
//! Keys live in a `secrecy` box and print as `[REDACTED]`, so they can sit in
//! structs that get logged with `{:?}`.

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};

/// A string that never appears in `Debug` or `Display` output.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// The raw value. Only call this when building the outgoing request.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Firecrawl endpoint and key.
#[derive(Clone)]
pub struct RenderCredentials {
    pub api_key: SecretString,

    /// API root, e.g. `https://api.firecrawl.dev/v1`
    pub base_url: String,
}

impl RenderCredentials {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.firecrawl.dev/v1";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Read `FIRECRAWL_API_KEY` (and optional `FIRECRAWL_API_URL`).
    ///
    /// Returns `None` when no non-blank key is set; the render path is then
    /// disabled.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup("FIRECRAWL_API_KEY").filter(|k| !k.trim().is_empty())?;
        let credentials = Self::new(key);
        Some(match lookup("FIRECRAWL_API_URL").filter(|u| !u.trim().is_empty()) {
            Some(url) => credentials.with_base_url(url),
            None => credentials,
        })
    }
}

impl fmt::Debug for RenderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCredentials")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacted() {
        let secret = SecretString::new("fc-live-123");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose(), "fc-live-123");
    }

    #[test]
    fn test_credentials_debug_hides_key() {
        let creds = RenderCredentials::new("fc-live-123").with_base_url("http://localhost:3002/v1/");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("fc-live"));
        assert!(debug.contains("localhost:3002/v1"));
        assert_eq!(creds.base_url, "http://localhost:3002/v1");
    }

    #[test]
    fn test_from_lookup() {
        assert!(RenderCredentials::from_lookup(|_| None).is_none());
        assert!(RenderCredentials::from_lookup(|_| Some("  ".to_string())).is_none());

        let creds = RenderCredentials::from_lookup(|key| match key {
            "FIRECRAWL_API_KEY" => Some("fc-key".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.base_url, RenderCredentials::DEFAULT_BASE_URL);
        assert_eq!(creds.api_key.expose(), "fc-key");
    }
}
