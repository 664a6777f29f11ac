//! Sitemap XML parsing.
//!
//! Handles both `<urlset>` documents and `<sitemapindex>` documents. Nested
//! indexes are followed one level deep by the finder; this module only parses.

use quick_xml::events::Event;
use quick_xml::Reader;
use url::Url;

use crate::error::SitemapError;
use crate::validator::last_segment;

/// Paths tried when robots.txt lists no sitemap.
pub const DEFAULT_SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// What a sitemap document contained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sitemap {
    /// Page URLs from `<urlset><url><loc>`
    pub pages: Vec<String>,

    /// Child sitemaps from `<sitemapindex><sitemap><loc>`
    pub children: Vec<String>,
}

impl Sitemap {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.children.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Parent {
    None,
    Url,
    Sitemap,
}

/// Parse a sitemap or sitemap index.
///
/// Namespace prefixes are ignored. HTML or other non-sitemap XML parses to
/// an empty [`Sitemap`] rather than an error.
pub fn parse_sitemap(xml: &str) -> Result<Sitemap, SitemapError> {
    let mut reader = Reader::from_str(xml);
    let mut sitemap = Sitemap::default();
    let mut parent = Parent::None;
    let mut in_loc = false;
    let mut loc = String::new();

    loop {
        let event = reader.read_event().map_err(|e| SitemapError {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"url" => parent = Parent::Url,
                b"sitemap" => parent = Parent::Sitemap,
                b"loc" if parent != Parent::None => {
                    in_loc = true;
                    loc.clear();
                }
                _ => {}
            },
            Event::Text(e) if in_loc => {
                let text = e.unescape().map_err(|e| SitemapError {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })?;
                loc.push_str(&text);
            }
            Event::CData(e) if in_loc => {
                loc.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"loc" if in_loc => {
                    in_loc = false;
                    let value = loc.trim();
                    if !value.is_empty() {
                        match parent {
                            Parent::Url => sitemap.pages.push(value.to_string()),
                            Parent::Sitemap => sitemap.children.push(value.to_string()),
                            Parent::None => {}
                        }
                    }
                }
                b"url" | b"sitemap" => parent = Parent::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sitemap)
}

/// Anchor-like text for a URL found without an anchor (`/anxiety-therapy/` → `anxiety therapy`).
pub fn slug_text(url: &Url) -> String {
    let slug = last_segment(url).unwrap_or("");
    let slug = match slug.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext, "html" | "htm" | "php" | "aspx") => stem,
        _ => slug,
    };

    slug.split(|c: char| c == '-' || c == '_' || c == '+')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
