//! Extracted page content.

use serde::{Deserialize, Serialize};
use url::Url;

/// How the text was isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Explicit main container, or the dominant paragraph container
    MainContentHeuristic,
    /// Caller-supplied bio text
    ExistingBioHeuristic,
    /// Body text minus boilerplate
    Fallback,
}

/// Which network path produced the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPath {
    Http,
    Rendered,
}

/// Prose isolated from one page. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub page: Url,

    /// Ordered, whitespace-collapsed paragraphs
    pub blocks: Vec<String>,

    pub method: ExtractionMethod,

    /// True when nothing usable was isolated
    pub empty: bool,

    pub title: Option<String>,

    /// Professional credentials found in the text (LCSW, PhD, ...)
    pub credentials: Vec<String>,

    /// `None` when the page could not be fetched at all
    pub fetch_path: Option<FetchPath>,
}

impl ExtractedContent {
    /// Content for a page that yielded nothing.
    pub fn empty(page: Url) -> Self {
        Self {
            page,
            blocks: Vec::new(),
            method: ExtractionMethod::Fallback,
            empty: true,
            title: None,
            credentials: Vec::new(),
            fetch_path: None,
        }
    }

    /// Content from isolated blocks; empty when the text is shorter than `min_len`.
    pub fn from_blocks(page: Url, method: ExtractionMethod, blocks: Vec<String>, min_len: usize) -> Self {
        let chars: usize = blocks.iter().map(|b| b.chars().count()).sum();
        Self {
            page,
            empty: blocks.is_empty() || chars < min_len,
            blocks,
            method,
            title: None,
            credentials: Vec::new(),
            fetch_path: None,
        }
    }

    /// A caller-supplied bio, kept apart from the fetched page's text.
    pub fn existing_bio(page: Url, bio: &str) -> Self {
        let blocks: Vec<String> = bio
            .split("\n\n")
            .map(crate::dom::collapse_whitespace)
            .filter(|b| !b.is_empty())
            .collect();
        Self {
            page,
            empty: blocks.is_empty(),
            blocks,
            method: ExtractionMethod::ExistingBioHeuristic,
            title: None,
            credentials: Vec::new(),
            fetch_path: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_credentials(mut self, credentials: Vec<String>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_fetch_path(mut self, path: FetchPath) -> Self {
        self.fetch_path = Some(path);
        self
    }

    /// Blocks joined by blank lines.
    pub fn text(&self) -> String {
        self.blocks.join("\n\n")
    }
}

/// Result of extracting one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageExtraction {
    /// Text isolated from the fetched page
    pub content: ExtractedContent,

    /// Caller-supplied bio for the same page, never merged into `content`
    pub existing_bio: Option<ExtractedContent>,
}

impl PageExtraction {
    pub fn new(content: ExtractedContent) -> Self {
        Self {
            content,
            existing_bio: None,
        }
    }

    pub fn with_existing_bio(mut self, bio: Option<ExtractedContent>) -> Self {
        self.existing_bio = bio;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.empty && self.existing_bio.as_ref().map_or(true, |b| b.empty)
    }
}
