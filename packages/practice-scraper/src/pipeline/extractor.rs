//! Content extraction.
//!
//! Isolates the prose of a page: an explicit main container if it holds
//! enough of the text, else the container densest in paragraphs, else the
//! whole body minus boilerplate. On roster pages the region is narrowed to
//! the card of the therapist being scraped.

use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::dom::{Document, Node, Walk};
use crate::error::FetchError;
use crate::fetchers::scheduled::ScheduledFetcher;
use crate::pipeline::scoring::{tokenize, NameMatch, NameTokens};
use crate::traits::fetcher::FetchedPage;
use crate::types::config::{ExtractionConfig, ScrapeConfig};
use crate::types::content::{ExtractedContent, ExtractionMethod};
use crate::types::result::{Diagnostic, DiagnosticKind, Stage};

/// Explicit main-content containers, in order of preference.
const MAIN_SELECTORS: &[MainSelector] = &[
    MainSelector::Tag("main"),
    MainSelector::Tag("article"),
    MainSelector::Role("main"),
    MainSelector::Id("content"),
    MainSelector::Id("main"),
    MainSelector::Class("content"),
    MainSelector::Class("main"),
    MainSelector::Class("post-content"),
    MainSelector::Class("entry-content"),
    MainSelector::Class("page-content"),
];

const BOILERPLATE_TAGS: &[&str] = &["nav", "aside"];

/// Page chrome unless nested in a content section, where it holds a card's
/// or article's own heading.
const SCOPED_BOILERPLATE_TAGS: &[&str] = &["header", "footer"];

const CONTENT_SCOPES: &[&str] = &["main", "article", "section"];

const BOILERPLATE_CLASSES: &[&str] = &[
    "nav",
    "navbar",
    "header",
    "footer",
    "sidebar",
    "menu",
    "advertisement",
    "ads",
];

const BOILERPLATE_IDS: &[&str] = &["nav", "header", "footer", "sidebar"];

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Blocks scanned for credentials after the title.
const CREDENTIAL_SCAN_BLOCKS: usize = 5;

static CREDENTIAL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z.\-]*").unwrap());

#[derive(Debug, Clone, Copy)]
enum MainSelector {
    Tag(&'static str),
    Role(&'static str),
    Id(&'static str),
    Class(&'static str),
}

impl MainSelector {
    fn matches(self, node: &Node) -> bool {
        match self {
            MainSelector::Tag(tag) => node.is_tag(tag),
            MainSelector::Role(role) => node.attr("role") == Some(role),
            MainSelector::Id(id) => node.id().map_or(false, |v| v.eq_ignore_ascii_case(id)),
            MainSelector::Class(class) => node.has_class(class),
        }
    }
}

/// Navigation, page headers and footers, sidebars and ads.
///
/// `ancestors` runs from the outermost known ancestor down to the parent.
pub fn is_boilerplate(node: &Node, ancestors: &[&Node]) -> bool {
    let Some(tag) = node.tag() else {
        return false;
    };

    if SCOPED_BOILERPLATE_TAGS.contains(&tag) {
        return !ancestors
            .iter()
            .any(|a| CONTENT_SCOPES.iter().any(|scope| a.is_tag(scope)));
    }

    BOILERPLATE_TAGS.contains(&tag)
        || node.attr("role") == Some("navigation")
        || BOILERPLATE_CLASSES.iter().any(|c| node.has_class(c))
        || node
            .id()
            .map_or(false, |id| BOILERPLATE_IDS.iter().any(|b| id.eq_ignore_ascii_case(b)))
}

/// Characters of prose under `node`, boilerplate excluded.
fn content_len(node: &Node) -> usize {
    node.blocks(&is_boilerplate)
        .iter()
        .map(|b| b.chars().count())
        .sum()
}

fn is_heading(node: &Node) -> bool {
    node.tag().map_or(false, |t| HEADING_TAGS.contains(&t))
}

/// First node outside boilerplate (excluding `root` itself) matching `pred`.
fn find_outside_boilerplate<'a, P>(root: &'a Node, pred: P) -> Option<&'a Node>
where
    P: Fn(&Node) -> bool,
{
    let mut found = None;
    root.walk(&mut |node, ancestors| {
        if found.is_some() || is_boilerplate(node, ancestors) || node.is_non_content() {
            return Walk::SkipChildren;
        }
        if !std::ptr::eq(node, root) && pred(node) {
            found = Some(node);
            return Walk::SkipChildren;
        }
        Walk::Continue
    });
    found
}

/// Element (below `root`, outside boilerplate) with the most text in direct `<p>` children.
fn densest_container(root: &Node) -> Option<&Node> {
    let mut best: Option<(&Node, usize)> = None;

    root.walk(&mut |node, ancestors| {
        if is_boilerplate(node, ancestors) || node.is_non_content() {
            return Walk::SkipChildren;
        }
        if std::ptr::eq(node, root) || node.tag().is_none() {
            return Walk::Continue;
        }

        let paragraph_len: usize = node
            .children
            .iter()
            .filter(|c| c.is_tag("p"))
            .map(Node::text_len)
            .sum();
        if paragraph_len > best.map_or(0, |(_, len)| len) {
            best = Some((node, paragraph_len));
        }
        Walk::Continue
    });

    best.map(|(node, _)| node)
}

/// The main-content region of a document and how it was chosen.
pub fn isolate<'a>(doc: &'a Document, config: &ExtractionConfig) -> (&'a Node, ExtractionMethod) {
    let body = doc.body();
    let total = content_len(body);
    if total == 0 {
        return (body, ExtractionMethod::Fallback);
    }
    let dominant = |node: &Node| content_len(node) as f64 >= config.dominance_ratio * total as f64;

    for selector in MAIN_SELECTORS {
        if let Some(node) = find_outside_boilerplate(body, |n| selector.matches(n)) {
            if dominant(node) {
                return (node, ExtractionMethod::MainContentHeuristic);
            }
        }
    }

    if let Some(node) = densest_container(body) {
        if dominant(node) {
            return (node, ExtractionMethod::MainContentHeuristic);
        }
    }

    (body, ExtractionMethod::Fallback)
}

fn heading_count(node: &Node) -> usize {
    node.descendants()
        .filter(|n| is_heading(n) && !n.text_content().is_empty())
        .count()
}

fn contains(haystack: &Node, needle: &Node) -> bool {
    haystack.descendants().any(|n| std::ptr::eq(n, needle))
}

/// Ancestors of `target` from `root` down to its parent.
fn ancestor_chain<'a>(root: &'a Node, target: &Node) -> Option<Vec<&'a Node>> {
    let mut chain = None;
    root.walk(&mut |node, ancestors| {
        if chain.is_some() {
            return Walk::SkipChildren;
        }
        if std::ptr::eq(node, target) {
            chain = Some(ancestors.to_vec());
            return Walk::SkipChildren;
        }
        Walk::Continue
    });
    chain
}

/// Narrow a roster region to one person's card.
///
/// Applies only when the region has at least `min_cards` headings and one of
/// them names the person. The card is the largest ancestor of that heading
/// holding no other heading; when the headings are flat siblings, the card
/// runs from the heading up to the next heading. `context` holds the
/// region's own ancestors.
pub fn narrow_to_person<'a>(
    region: &'a Node,
    context: &[&'a Node],
    name: &NameTokens,
    min_cards: usize,
) -> Option<Vec<String>> {
    let headings: Vec<&Node> = region
        .descendants()
        .filter(|n| is_heading(n) && !n.text_content().is_empty())
        .collect();
    if headings.len() < min_cards.max(2) {
        return None;
    }

    let target = headings
        .iter()
        .copied()
        .find(|h| name.match_in(&tokenize(&h.text_content())) == NameMatch::Exact)?;
    let chain = ancestor_chain(region, target)?;

    let card_depth = (0..chain.len())
        .rev()
        .take_while(|&depth| !std::ptr::eq(chain[depth], region) && heading_count(chain[depth]) == 1)
        .last();
    let scope = |depth: usize| -> Vec<&'a Node> {
        context.iter().chain(&chain[..depth]).copied().collect()
    };

    let blocks: Vec<String> = match card_depth {
        Some(depth) => chain[depth].blocks_within(&scope(depth), &is_boilerplate),
        None => {
            let parent = chain.last()?;
            let outer = scope(chain.len());
            let start = parent.children.iter().position(|c| contains(c, target))?;
            parent.children[start..]
                .iter()
                .enumerate()
                .take_while(|(i, c)| *i == 0 || heading_count(c) == 0)
                .flat_map(|(_, c)| c.blocks_within(&outer, &is_boilerplate))
                .collect()
        }
    };

    if blocks.is_empty() {
        None
    } else {
        Some(blocks)
    }
}

/// Known credentials appearing as tokens in `texts`, in first-seen order.
///
/// Dots are ignored (`Ph.D.` matches `PHD`) and a token needs at least two
/// capitals, so prose words and honorifics like `Ms` never match.
pub fn detect_credentials<'a, I>(texts: I, known: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut found: Vec<String> = Vec::new();

    for text in texts {
        for token in CREDENTIAL_TOKEN.find_iter(text) {
            let cleaned = token.as_str().replace('.', "");
            let cleaned = cleaned.trim_end_matches('-');
            if cleaned.chars().filter(|c| c.is_ascii_uppercase()).count() < 2 {
                continue;
            }
            let matched = known
                .iter()
                .find(|k| k.replace('.', "").eq_ignore_ascii_case(cleaned));
            if let Some(credential) = matched {
                if !found.contains(credential) {
                    found.push(credential.clone());
                }
            }
        }
    }

    found
}

/// Extract content from an already parsed document.
pub fn extract_document(
    page: &Url,
    doc: &Document,
    person: Option<&NameTokens>,
    config: &ExtractionConfig,
    credentials: &[String],
) -> ExtractedContent {
    let (region, method) = isolate(doc, config);
    let context = ancestor_chain(doc.body(), region).unwrap_or_default();
    let mut blocks = region.blocks_within(&context, &is_boilerplate);

    if let Some(name) = person {
        if let Some(card) = narrow_to_person(region, &context, name, config.roster_min_cards) {
            debug!(url = %page, blocks = card.len(), "Narrowed roster to person");
            blocks = card;
        }
    }

    let title = doc.first_heading().or_else(|| doc.title());
    let found = detect_credentials(
        title
            .iter()
            .chain(blocks.iter().take(CREDENTIAL_SCAN_BLOCKS))
            .map(String::as_str),
        credentials,
    );

    ExtractedContent::from_blocks(page.clone(), method, blocks, config.min_content_len)
        .with_title(title)
        .with_credentials(found)
}

/// Extracted content plus whatever went wrong getting it.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub content: ExtractedContent,
    pub diagnostics: Vec<Diagnostic>,
}

/// Fetches pages (rendering sparse ones) and extracts their prose.
pub struct ContentExtractor {
    fetcher: ScheduledFetcher,
    config: ExtractionConfig,
    credentials: Vec<String>,
}

impl ContentExtractor {
    pub fn new(fetcher: ScheduledFetcher, config: &ScrapeConfig) -> Self {
        Self {
            fetcher,
            config: config.extraction.clone(),
            credentials: config.scoring.credentials.clone(),
        }
    }

    /// Extract one page.
    ///
    /// `prefetched` skips the HTTP fetch when discovery already has the page.
    /// Never fails: problems come back as diagnostics next to empty content.
    pub async fn extract(
        &self,
        url: &Url,
        prefetched: Option<FetchedPage>,
        person: Option<&NameTokens>,
        cancel: &CancellationToken,
    ) -> ExtractionOutcome {
        let mut diagnostics = Vec::new();

        let page = match prefetched {
            Some(page) => page,
            None => match self.fetcher.fetch(url, cancel).await.result {
                Ok(page) => page,
                Err(error) => {
                    diagnostics.push(Diagnostic::from_fetch_error(Stage::Fetch, &error).with_url(url));
                    return ExtractionOutcome {
                        content: ExtractedContent::empty(url.clone()),
                        diagnostics,
                    };
                }
            },
        };

        let mut doc = Document::parse(&page.html);
        let mut path = page.path;

        let text_len = doc.visible_text_len();
        if text_len < self.config.min_body_text_len {
            debug!(url = %url, text_len = text_len, "Sparse page, trying render path");
            match self.fetcher.render(url, cancel).await.result {
                Ok(rendered) => {
                    let rendered_doc = Document::parse(&rendered.html);
                    if rendered_doc.visible_text_len() > text_len {
                        doc = rendered_doc;
                        path = rendered.path;
                    }
                }
                Err(FetchError::Cancelled) => {
                    diagnostics.push(
                        Diagnostic::from_fetch_error(Stage::Render, &FetchError::Cancelled)
                            .with_url(url),
                    );
                }
                Err(error) => {
                    diagnostics.push(
                        Diagnostic::warning(Stage::Render, DiagnosticKind::from(&error), error.to_string())
                            .with_url(url),
                    );
                }
            }
        }

        let content = extract_document(url, &doc, person, &self.config, &self.credentials)
            .with_fetch_path(path);

        if content.empty {
            diagnostics.push(
                Diagnostic::warning(
                    Stage::Extraction,
                    DiagnosticKind::ExtractionEmpty,
                    format!("no usable content isolated from {}", url),
                )
                .with_url(url),
            );
        }

        ExtractionOutcome {
            content,
            diagnostics,
        }
    }
}
