//! Candidate link extraction.
//!
//! Walks a document and records every same-site link with the context the
//! scorers need: anchor text, the nearest grouping container, a heading that
//! labels the link's section or menu, and how many similarly shaped links
//! share that container.

use std::collections::HashMap;

use indexmap::IndexMap;
use url::Url;

use crate::dom::{collapse_whitespace, Document, Node, Walk};
use crate::types::page::LinkSource;
use crate::validator::{dedupe_key, is_same_site, is_skip_path, normalize, path_depth};

/// Elements that group related links.
const CONTAINER_TAGS: &[&str] = &[
    "ul", "ol", "nav", "section", "article", "main", "aside", "header", "footer", "table",
];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// A same-site link plus the context it appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLink {
    pub url: Url,
    pub anchor_text: String,
    pub source: LinkSource,

    /// Opaque identity of the nearest grouping container
    pub container: Option<usize>,

    /// Section heading or parent menu label
    pub context_heading: Option<String>,

    /// Links in the same container sharing parent path and depth (including this one)
    pub roster_size: usize,

    /// Inside nav/header/footer
    pub in_nav: bool,
}

impl CandidateLink {
    /// A link without page context (sitemap entries, probed paths).
    pub fn bare(url: Url, anchor_text: impl Into<String>, source: LinkSource) -> Self {
        Self {
            url,
            anchor_text: anchor_text.into(),
            source,
            container: None,
            context_heading: None,
            roster_size: 1,
            in_nav: false,
        }
    }
}

/// Extract same-site links from a page.
///
/// Links are resolved against `page_url`; only those on the same site as one
/// of `site_roots` survive. Invalid, off-site and non-content links are
/// skipped. Duplicates keep the first occurrence, picking up anchor text from
/// a later one if the first had none.
pub fn extract_links(
    doc: &Document,
    page_url: &Url,
    site_roots: &[Url],
    source: LinkSource,
) -> Vec<CandidateLink> {
    let mut found: IndexMap<String, CandidateLink> = IndexMap::new();

    doc.body().walk(&mut |node, ancestors| {
        if node.is_non_content() {
            return Walk::SkipChildren;
        }
        if !node.is_tag("a") {
            return Walk::Continue;
        }

        let Some(href) = node.attr("href") else {
            return Walk::SkipChildren;
        };
        let Ok(url) = normalize(href, page_url) else {
            return Walk::SkipChildren;
        };
        if !site_roots.iter().any(|root| is_same_site(&url, root)) || is_skip_path(url.path()) {
            return Walk::SkipChildren;
        }

        let link = CandidateLink {
            anchor_text: anchor_text(node),
            source,
            container: nearest_container(ancestors),
            context_heading: context_heading(node, ancestors),
            roster_size: 1,
            in_nav: in_nav(ancestors),
            url,
        };

        match found.get_mut(&dedupe_key(&link.url)) {
            Some(existing) => {
                if existing.anchor_text.is_empty() && !link.anchor_text.is_empty() {
                    existing.anchor_text = link.anchor_text;
                }
            }
            None => {
                found.insert(dedupe_key(&link.url), link);
            }
        }

        Walk::SkipChildren
    });

    let mut links: Vec<CandidateLink> = found.into_values().collect();
    assign_roster_sizes(&mut links);
    links
}

/// Visible text of an anchor, falling back to title, aria-label or image alt.
pub fn anchor_text(anchor: &Node) -> String {
    let text = anchor.text_content();
    if !text.is_empty() {
        return text;
    }

    anchor
        .attr("title")
        .or_else(|| anchor.attr("aria-label"))
        .or_else(|| {
            anchor
                .find(|n| n.is_tag("img"))
                .and_then(|img| img.attr("alt"))
        })
        .map(collapse_whitespace)
        .unwrap_or_default()
}

fn nearest_container(ancestors: &[&Node]) -> Option<usize> {
    ancestors
        .iter()
        .rev()
        .find(|n| n.tag().map_or(false, |t| CONTAINER_TAGS.contains(&t)))
        .map(|n| *n as *const Node as usize)
}

fn in_nav(ancestors: &[&Node]) -> bool {
    ancestors.iter().any(|n| {
        matches!(n.tag(), Some("nav" | "header" | "footer"))
            || n.attr("role") == Some("navigation")
    })
}

fn is_heading(node: &Node) -> bool {
    node.tag().map_or(false, |t| HEADING_TAGS.contains(&t))
}

fn contains(haystack: &Node, needle: &Node) -> bool {
    haystack.descendants().any(|n| std::ptr::eq(n, needle))
}

/// Label for the link's menu or section.
///
/// A link in a nested menu (`li > ul > li > a`) takes the parent item's own
/// label. Otherwise the nearest ancestor with a heading that does not itself
/// contain the link supplies it. The search stops below `<body>`.
fn context_heading(anchor: &Node, ancestors: &[&Node]) -> Option<String> {
    let mut seen_own_item = false;

    for ancestor in ancestors.iter().rev().take(6) {
        if matches!(ancestor.tag(), Some("body" | "html")) {
            break;
        }
        if ancestor.is_tag("li") {
            if !seen_own_item {
                seen_own_item = true;
                continue;
            }
            // Parent menu item: label is its first child that is not the submenu
            let label = ancestor
                .children
                .iter()
                .find(|c| matches!(c.tag(), Some("a" | "span" | "button" | "strong")))
                .map(Node::text_content)
                .filter(|t| !t.is_empty());
            if label.is_some() {
                return label;
            }
            continue;
        }

        let heading = ancestor
            .descendants()
            .filter(|n| is_heading(n))
            .find(|h| !contains(h, anchor))
            .map(Node::text_content)
            .filter(|t| !t.is_empty());
        if heading.is_some() {
            return heading;
        }
    }

    None
}

/// Parent path of a URL (`/team/jane` → `/team`).
fn parent_path(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

fn assign_roster_sizes(links: &mut [CandidateLink]) {
    let mut counts: HashMap<(usize, String, usize), usize> = HashMap::new();
    for link in links.iter() {
        if let Some(container) = link.container {
            *counts
                .entry((container, parent_path(&link.url), path_depth(&link.url)))
                .or_default() += 1;
        }
    }

    for link in links.iter_mut() {
        if let Some(container) = link.container {
            link.roster_size = counts
                .get(&(container, parent_path(&link.url), path_depth(&link.url)))
                .copied()
                .unwrap_or(1);
        }
    }
}
