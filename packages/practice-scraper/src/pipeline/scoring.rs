//! Table-driven page scoring.
//!
//! Every function here is pure. Weights, thresholds and vocabularies come
//! from [`ScoringConfig`]; text is compared as lowercase alphanumeric tokens
//! so anchor text and URL slugs line up (`Anxiety Therapy` ~ `anxiety-therapy`).

use std::cmp::Ordering;

use indexmap::IndexMap;
use url::Url;

use crate::fetchers::sitemap::slug_text;
use crate::pipeline::links::CandidateLink;
use crate::types::config::ScoringConfig;
use crate::types::page::DiscoveredPage;
use crate::types::result::{Diagnostic, DiagnosticKind, Stage};
use crate::validator::{dedupe_key, last_segment, path_depth};

/// Words ignored when matching a requested specialty name.
const GENERIC_SPECIALTY_WORDS: &[&str] = &[
    "therapy",
    "therapies",
    "counseling",
    "counselling",
    "treatment",
    "service",
    "services",
    "and",
    "for",
    "with",
    "of",
    "the",
    "in",
];

/// Minimum share of a requested name's tokens a page must carry to match it.
const REQUESTED_MATCH_MIN: f64 = 0.5;

/// Lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens of every path segment.
pub fn path_tokens(url: &Url) -> Vec<String> {
    tokenize(url.path())
}

/// Crude plural folding (`disorders` → `disorder`, `stress` unchanged).
fn stem(token: &str) -> &str {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        &token[..token.len() - 1]
    } else {
        token
    }
}

/// True if `phrase` occurs as a contiguous token run in `tokens`.
pub fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(phrase.len())
        .any(|w| w.iter().zip(phrase).all(|(a, b)| stem(a) == stem(b)))
}

fn contains_any_word(tokens: &[String], words: &[String]) -> bool {
    words
        .iter()
        .any(|w| contains_phrase(tokens, &tokenize(w)))
}

/// Home page paths never qualify as therapist or specialty pages.
pub fn is_home_path(url: &Url) -> bool {
    let path = url.path().trim_matches('/').to_ascii_lowercase();
    matches!(
        path.as_str(),
        "" | "home" | "index" | "index.html" | "index.htm" | "index.php" | "default.aspx"
    )
}

/// A therapist name reduced to comparable tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTokens {
    tokens: Vec<String>,
}

impl NameTokens {
    /// Strip leading honorifics and suffix credentials; `None` if no name is left.
    ///
    /// Credentials are only recognized after the first comma or trailing a
    /// name of three or more tokens, so surnames like "Ma" survive
    /// ("Lin Ma, LCSW" keeps `lin ma`).
    pub fn parse(raw: &str, config: &ScoringConfig) -> Option<Self> {
        let credentials: Vec<String> = config
            .credentials
            .iter()
            .flat_map(|c| tokenize(&c.replace('.', "")))
            .collect();
        let honorifics: Vec<String> = config.honorifics.iter().map(|h| h.to_lowercase()).collect();

        // "Ph.D." must collapse to "phd" before tokenizing
        let cleaned = raw.replace('.', "");
        let (head, suffix) = cleaned.split_once(',').unwrap_or((cleaned.as_str(), ""));

        let mut tokens: Vec<String> = tokenize(head)
            .into_iter()
            .skip_while(|t| honorifics.contains(t))
            .collect();
        while tokens.len() > 2 && tokens.last().is_some_and(|t| credentials.contains(t)) {
            tokens.pop();
        }
        // "Doe, Jane" keeps the given name
        tokens.extend(tokenize(suffix).into_iter().filter(|t| !credentials.contains(t)));

        if tokens.iter().all(|t| credentials.contains(t)) {
            None
        } else {
            Some(Self { tokens })
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Space-joined tokens (`jane doe`).
    pub fn joined(&self) -> String {
        self.tokens.join(" ")
    }

    /// Match strength against some text's tokens.
    pub fn match_in(&self, tokens: &[String]) -> NameMatch {
        if contains_phrase(tokens, &self.tokens) {
            return NameMatch::Exact;
        }

        let significant: Vec<&String> = self.tokens.iter().filter(|t| t.len() >= 2).collect();
        if significant.is_empty() {
            return NameMatch::None;
        }
        let found = significant.iter().filter(|t| tokens.contains(t)).count();

        if found == significant.len() {
            // All present but not contiguous ("Doe, Jane")
            NameMatch::Exact
        } else if found > 0 {
            NameMatch::Partial(found as f64 / significant.len() as f64)
        } else {
            NameMatch::None
        }
    }
}

/// How well a name matched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NameMatch {
    Exact,
    /// Fraction of name tokens found, in (0, 1)
    Partial(f64),
    None,
}

impl NameMatch {
    fn strength(self) -> f64 {
        match self {
            NameMatch::Exact => 2.0,
            NameMatch::Partial(f) => f,
            NameMatch::None => 0.0,
        }
    }

    fn best(self, other: NameMatch) -> NameMatch {
        if other.strength() > self.strength() {
            other
        } else {
            self
        }
    }
}

/// Raw score (for ranking) and clamped confidence (for reporting).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub raw: f64,
    pub confidence: f64,
}

impl Score {
    fn new(raw: f64) -> Self {
        Self {
            raw,
            confidence: raw.clamp(0.0, 1.0),
        }
    }

    const ZERO: Score = Score {
        raw: 0.0,
        confidence: 0.0,
    };
}

/// Score a link as the therapist's page.
pub fn therapist_score(
    link: &CandidateLink,
    name: Option<&NameTokens>,
    roster_min_links: usize,
    config: &ScoringConfig,
) -> Score {
    if is_home_path(&link.url) {
        return Score::ZERO;
    }

    let weights = &config.therapist;
    let anchor = tokenize(&link.anchor_text);
    let path = path_tokens(&link.url);
    let slug = tokenize(last_segment(&link.url).unwrap_or(""));
    let mut raw = 0.0;

    if let Some(name) = name {
        match name.match_in(&anchor).best(name.match_in(&slug)) {
            NameMatch::Exact => raw += weights.name_exact,
            NameMatch::Partial(fraction) => raw += weights.name_partial * fraction,
            NameMatch::None => {}
        }
    }

    if contains_any_word(&anchor, &config.team_keywords) {
        raw += weights.team_keyword_anchor;
    }
    if contains_any_word(&path, &config.team_keywords) {
        raw += weights.team_keyword_path;
    }
    if link.roster_size >= roster_min_links.max(2) {
        raw += weights.roster;
    }
    if contains_any_word(&path, &config.excluded_keywords)
        || contains_any_word(&anchor, &config.excluded_keywords)
    {
        raw -= weights.excluded_penalty;
    }

    Score::new(raw)
}

/// A requested specialty reduced to its distinguishing tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedSpecialty {
    pub name: String,
    tokens: Vec<String>,
}

impl RequestedSpecialty {
    pub fn new(name: &str) -> Self {
        let all = tokenize(name);
        let significant: Vec<String> = all
            .iter()
            .filter(|t| !GENERIC_SPECIALTY_WORDS.contains(&t.as_str()))
            .cloned()
            .collect();
        Self {
            name: name.trim().to_string(),
            tokens: if significant.is_empty() { all } else { significant },
        }
    }

    /// Share of this name's tokens found in the page's anchor text or URL path.
    pub fn match_fraction(&self, anchor_text: &str, url: &Url) -> f64 {
        if self.tokens.is_empty() {
            return 0.0;
        }
        let mut haystack = tokenize(anchor_text);
        haystack.extend(path_tokens(url));

        let found = self
            .tokens
            .iter()
            .filter(|t| haystack.iter().any(|h| stem(h) == stem(t)))
            .count();
        found as f64 / self.tokens.len() as f64
    }
}

/// Score a link as a specialty page.
pub fn specialty_score(
    link: &CandidateLink,
    requested: &[RequestedSpecialty],
    config: &ScoringConfig,
) -> Score {
    if is_home_path(&link.url) {
        return Score::ZERO;
    }

    let weights = &config.specialty;
    let anchor = tokenize(&link.anchor_text);
    let path = path_tokens(&link.url);
    let slug = last_segment(&link.url).unwrap_or("").to_lowercase();
    let mut raw = 0.0;

    if contains_any_word(&anchor, &config.specialty_vocabulary) {
        raw += weights.vocab_anchor;
    }
    if contains_any_word(&path, &config.specialty_vocabulary) {
        raw += weights.vocab_path;
    }
    if requested
        .iter()
        .any(|r| r.match_fraction(&link.anchor_text, &link.url) >= REQUESTED_MATCH_MIN)
    {
        raw += weights.requested_match;
    }
    if config
        .specialty_suffixes
        .iter()
        .any(|suffix| slug.ends_with(suffix.as_str()))
    {
        raw += weights.suffix;
    }

    // Service keywords only count in the parent path (`/services/anxiety`)
    let parent: Vec<String> = match path.split_last() {
        Some((_, parent)) => parent.to_vec(),
        None => Vec::new(),
    };
    if contains_any_word(&parent, &config.service_keywords) {
        raw += weights.service_path;
    }
    if let Some(heading) = &link.context_heading {
        if contains_any_word(&tokenize(heading), &config.service_keywords) {
            raw += weights.context_heading;
        }
    }

    if contains_any_word(&path, &config.excluded_keywords)
        || contains_any_word(&anchor, &config.excluded_keywords)
        || contains_any_word(&path, &config.non_specialty_keywords)
    {
        raw -= weights.excluded_penalty;
    }

    Score::new(raw)
}

/// Order for candidates: higher score, then shallower path, then first seen.
///
/// Use with a stable sort over candidates in first-seen order.
pub fn rank(a_score: f64, a_url: &Url, b_score: f64, b_url: &Url) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| path_depth(a_url).cmp(&path_depth(b_url)))
}

/// Anchor text cleaned for use as a result key.
pub fn clean_anchor(page: &DiscoveredPage) -> String {
    let text = crate::dom::collapse_whitespace(&page.anchor_text);
    let trimmed = text
        .trim_matches(|c: char| !c.is_alphanumeric() && c != ')' && c != '(')
        .to_string();
    if trimmed.is_empty() {
        let slug = slug_text(&page.url);
        if slug.is_empty() {
            page.url.path().to_string()
        } else {
            slug
        }
    } else {
        trimmed
    }
}

/// Map requested specialty names to their best pages.
///
/// Each name takes the page whose anchor text or path carries the largest
/// share of its tokens (at least half), preferring higher confidence and
/// then earlier pages. Names with no such page produce `SpecialtyNotMatched`.
/// With no requested names every page is kept, keyed by its cleaned anchor.
pub fn assign_specialties(
    requested: &[String],
    pages: &[DiscoveredPage],
) -> (IndexMap<String, DiscoveredPage>, Vec<Diagnostic>) {
    let mut assigned = IndexMap::new();
    let mut diagnostics = Vec::new();

    if requested.is_empty() {
        for page in pages {
            let key = clean_anchor(page);
            assigned.entry(key).or_insert_with(|| page.clone());
        }
        return (assigned, diagnostics);
    }

    for name in requested {
        if assigned.contains_key(name.as_str()) {
            continue;
        }
        let wanted = RequestedSpecialty::new(name);

        let best = pages
            .iter()
            .map(|page| (page, wanted.match_fraction(&page.anchor_text, &page.url)))
            .filter(|(_, fraction)| *fraction >= REQUESTED_MATCH_MIN)
            .fold(None::<(&DiscoveredPage, f64)>, |best, (page, fraction)| match best {
                Some((current, current_fraction))
                    if current_fraction > fraction
                        || (current_fraction == fraction
                            && current.confidence >= page.confidence) =>
                {
                    Some((current, current_fraction))
                }
                _ => Some((page, fraction)),
            });

        match best {
            Some((page, _)) => {
                assigned.insert(name.clone(), page.clone());
            }
            None => diagnostics.push(
                Diagnostic::warning(
                    Stage::Discovery,
                    DiagnosticKind::SpecialtyNotMatched,
                    format!("no page found for specialty \"{}\"", name),
                )
                .with_specialty(name.clone()),
            ),
        }
    }

    (assigned, diagnostics)
}

/// Drop later pages whose URL repeats an earlier one.
pub fn dedupe_pages(pages: Vec<DiscoveredPage>) -> Vec<DiscoveredPage> {
    let mut seen = std::collections::HashSet::new();
    pages
        .into_iter()
        .filter(|p| seen.insert(dedupe_key(&p.url)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::page::{LinkSource, PageKind};

    fn link(path: &str, anchor: &str) -> CandidateLink {
        let url = Url::parse("https://example.com/").unwrap().join(path).unwrap();
        CandidateLink::bare(url, anchor, LinkSource::Root)
    }

    fn page(path: &str, anchor: &str, confidence: f64) -> DiscoveredPage {
        let url = Url::parse("https://example.com/").unwrap().join(path).unwrap();
        DiscoveredPage::new(url, PageKind::SpecialtyPage, confidence, anchor, LinkSource::Root)
    }

    #[test]
    fn test_name_tokens_strip_titles() {
        let config = ScoringConfig::default();
        let name = NameTokens::parse("Dr. Jane Q. Doe, Ph.D., LMFT", &config).unwrap();
        assert_eq!(name.tokens(), &["jane", "q", "doe"]);
        assert!(NameTokens::parse("Dr. LCSW", &config).is_none());
    }

    #[test]
    fn test_name_tokens_keep_surnames_that_look_like_credentials() {
        let config = ScoringConfig::default();
        let parse = |raw: &str| NameTokens::parse(raw, &config).unwrap().joined();

        assert_eq!(parse("Lin Ma, LCSW"), "lin ma");
        assert_eq!(parse("Dr. Amy Ms"), "amy ms");
        assert_eq!(parse("Jane Doe MA LCSW"), "jane doe");
        assert_eq!(parse("Doe, Jane, MS"), "doe jane");
    }

    #[test]
    fn test_name_match_levels() {
        let config = ScoringConfig::default();
        let name = NameTokens::parse("Jane Doe", &config).unwrap();
        assert_eq!(name.match_in(&tokenize("Meet Jane Doe, LCSW")), NameMatch::Exact);
        assert_eq!(name.match_in(&tokenize("Doe, Jane")), NameMatch::Exact);
        assert_eq!(name.match_in(&tokenize("Jane Smith")), NameMatch::Partial(0.5));
        assert_eq!(name.match_in(&tokenize("Our Team")), NameMatch::None);
    }

    #[test]
    fn test_therapist_exact_beats_partial_beats_none() {
        let config = ScoringConfig::default();
        let name = NameTokens::parse("Jane Doe", &config).unwrap();
        let score = |path: &str, anchor: &str| {
            let mut l = link(path, anchor);
            l.roster_size = 4;
            therapist_score(&l, Some(&name), 3, &config).raw
        };

        let exact = score("/team/jane-doe", "Jane Doe");
        let partial = score("/team/jane-smith", "Jane Smith");
        let none = score("/team/amy-poe", "Amy Poe");
        assert!(exact > partial);
        assert!(partial > none);
        assert!(exact >= config.therapist.threshold);
    }

    #[test]
    fn test_therapist_team_page_without_name() {
        let config = ScoringConfig::default();
        let team = therapist_score(&link("/our-team", "Our Team"), None, 3, &config);
        assert!(team.confidence >= config.therapist.threshold);

        let contact = therapist_score(&link("/contact", "Contact"), None, 3, &config);
        assert_eq!(contact.confidence, 0.0);

        let home = therapist_score(&link("/", "Meet the Team"), None, 3, &config);
        assert_eq!(home.raw, 0.0);
    }

    #[test]
    fn test_specialty_scores() {
        let config = ScoringConfig::default();
        let requested = vec![RequestedSpecialty::new("Anxiety")];
        let threshold = config.specialty.threshold;

        let anxiety = specialty_score(&link("/services/anxiety-therapy", "Anxiety"), &requested, &config);
        assert!(anxiety.raw >= threshold);

        let emdr = specialty_score(&link("/emdr", "EMDR"), &[], &config);
        assert!(emdr.raw >= threshold);

        let blog = specialty_score(&link("/blog/anxiety-tips", "Anxiety tips"), &[], &config);
        assert!(blog.raw < threshold);

        let about = specialty_score(&link("/about", "About"), &[], &config);
        assert!(about.raw < threshold);

        let home = specialty_score(&link("/", "Anxiety Therapy"), &requested, &config);
        assert_eq!(home.confidence, 0.0);
    }

    #[test]
    fn test_context_heading_bonus() {
        let config = ScoringConfig::default();
        let mut plain = link("/grief", "Grief");
        let base = specialty_score(&plain, &[], &config).raw;
        plain.context_heading = Some("What We Treat".to_string());
        let with_heading = specialty_score(&plain, &[], &config).raw;
        assert!((with_heading - base - config.specialty.context_heading).abs() < 1e-9);
    }

    #[test]
    fn test_rank_prefers_score_then_depth() {
        let shallow = Url::parse("https://example.com/anxiety").unwrap();
        let deep = Url::parse("https://example.com/services/anxiety").unwrap();
        assert_eq!(rank(0.9, &deep, 0.5, &shallow), Ordering::Less);
        assert_eq!(rank(0.5, &shallow, 0.5, &deep), Ordering::Less);
        assert_eq!(rank(0.5, &deep, 0.5, &deep), Ordering::Equal);
    }

    #[test]
    fn test_assign_requested() {
        let pages = vec![
            page("/anxiety-therapy", "Anxiety Therapy", 0.9),
            page("/couples-counseling", "Couples Counseling", 0.8),
            page("/services/anxiety", "Anxiety", 0.6),
        ];
        let requested = vec![
            "Couples Therapy".to_string(),
            "Anxiety".to_string(),
            "Eating Disorders".to_string(),
        ];

        let (assigned, diagnostics) = assign_specialties(&requested, &pages);

        let keys: Vec<&str> = assigned.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Couples Therapy", "Anxiety"]);
        assert_eq!(assigned["Couples Therapy"].url.path(), "/couples-counseling");
        assert_eq!(assigned["Anxiety"].url.path(), "/anxiety-therapy");

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::SpecialtyNotMatched);
        assert_eq!(diagnostics[0].specialty.as_deref(), Some("Eating Disorders"));
    }

    #[test]
    fn test_assign_without_requested_uses_anchor_keys() {
        let pages = vec![
            page("/anxiety-therapy", "  Anxiety Therapy » ", 0.9),
            page("/emdr", "", 0.8),
        ];
        let (assigned, diagnostics) = assign_specialties(&[], &pages);
        let keys: Vec<&str> = assigned.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Anxiety Therapy", "emdr"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_stemmed_phrase_match() {
        let tokens = tokenize("eating-disorder-treatment");
        assert!(contains_phrase(&tokens, &tokenize("Eating Disorders")));
        assert!(!contains_phrase(&tokens, &tokenize("disorder eating")));
    }
}
