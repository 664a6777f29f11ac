//! Robots.txt parser and checker.
//!
//! Supports user-agent groups (several `User-agent` lines may share one
//! group), `Allow`/`Disallow` with `*` and `$` patterns resolved by longest
//! match (ties go to `Allow`), `Crawl-delay` and `Sitemap` hints.

use std::time::Duration;

use regex::Regex;
use url::Url;

#[derive(Debug, Clone)]
struct Rule {
    /// Raw pattern, used for precedence by length
    pattern: String,
    regex: Regex,
    allow: bool,
}

#[derive(Debug, Clone, Default)]
struct Group {
    /// Lowercase agent tokens
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<f64>,
}

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsTxt {
    groups: Vec<Group>,

    /// Sitemaps listed (global, not per group)
    sitemaps: Vec<String>,
}

impl RobotsTxt {
    /// Rules that allow everything (missing or unreadable robots.txt).
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt content. Unknown directives and bad lines are ignored.
    pub fn parse(content: &str) -> Self {
        let mut robots = Self::default();
        let mut current: Option<Group> = None;
        // True while consecutive User-agent lines are extending one group
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        if let Some(group) = current.take() {
                            robots.groups.push(group);
                        }
                        current = Some(Group::default());
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                    collecting_agents = true;
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    // An empty Disallow means "allow everything"
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(regex) = pattern_regex(value) {
                        group.rules.push(Rule {
                            pattern: value.to_string(),
                            regex,
                            allow: directive == "allow",
                        });
                    }
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let (Some(group), Ok(delay)) = (current.as_mut(), value.parse::<f64>()) {
                        if delay.is_finite() && delay >= 0.0 {
                            group.crawl_delay = Some(delay);
                        }
                    }
                }
                "sitemap" => {
                    // Sitemap lines do not end an agent list
                    if !value.is_empty() {
                        robots.sitemaps.push(value.to_string());
                    }
                }
                _ => {
                    collecting_agents = false;
                }
            }
        }

        if let Some(group) = current {
            robots.groups.push(group);
        }

        robots
    }

    /// Group for a user agent: the most specific named match, else `*`.
    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let product = user_agent
            .split('/')
            .next()
            .unwrap_or(user_agent)
            .trim()
            .to_ascii_lowercase();

        let named = self
            .groups
            .iter()
            .flat_map(|g| g.agents.iter().map(move |a| (g, a)))
            .filter(|(_, agent)| agent.as_str() != "*" && !agent.is_empty())
            .filter(|(_, agent)| product.contains(agent.as_str()))
            .max_by_key(|(_, agent)| agent.len())
            .map(|(g, _)| g);

        named.or_else(|| {
            self.groups
                .iter()
                .find(|g| g.agents.iter().any(|a| a == "*"))
        })
    }

    /// Check if a path (with optional query) is allowed for a user agent.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };

        let best = group
            .rules
            .iter()
            .filter(|rule| rule.regex.is_match(path))
            .max_by(|a, b| {
                a.pattern
                    .len()
                    .cmp(&b.pattern.len())
                    .then(a.allow.cmp(&b.allow))
            });

        best.map_or(true, |rule| rule.allow)
    }

    /// Check a full URL.
    pub fn is_url_allowed(&self, user_agent: &str, url: &Url) -> bool {
        match url.query() {
            Some(query) => self.is_allowed(user_agent, &format!("{}?{}", url.path(), query)),
            None => self.is_allowed(user_agent, url.path()),
        }
    }

    /// Crawl delay for a user agent.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            // Values too large for a Duration saturate; callers cap the delay
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    /// Listed sitemaps.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// Check if robots.txt disallows all crawling.
    pub fn disallows_all(&self, user_agent: &str) -> bool {
        !self.is_allowed(user_agent, "/")
    }
}

/// `https://host/robots.txt` for any URL on the site.
pub fn robots_url(root: &Url) -> Option<Url> {
    root.join("/robots.txt").ok()
}

/// Translate a robots pattern into an anchored regex.
fn pattern_regex(pattern: &str) -> Option<Regex> {
    let (body, anchored_end) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };

    let mut source = String::from("^");
    for (i, piece) in body.split('*').enumerate() {
        if i > 0 {
            source.push_str(".*");
        }
        source.push_str(&regex::escape(piece));
    }
    if anchored_end {
        source.push('$');
    }

    Regex::new(&source).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "practice-scraper/0.1.0";

    #[test]
    fn test_parse_basic() {
        let content = r#"
User-agent: *
Disallow: /private/
Disallow: /admin/
Allow: /public/
Crawl-delay: 2

Sitemap: https://example.com/sitemap.xml
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(robots.is_allowed(AGENT, "/public/page"));
        assert!(!robots.is_allowed(AGENT, "/private/page"));
        assert!(!robots.is_allowed(AGENT, "/admin/"));
        assert!(robots.is_allowed(AGENT, "/team"));

        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_secs(2)));
        assert_eq!(robots.sitemaps(), &["https://example.com/sitemap.xml".to_string()]);
    }

    #[test]
    fn test_named_group_wins() {
        let content = r#"
User-agent: *
Disallow: /

User-agent: practice-scraper
Disallow:
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed("OtherBot/2.0", "/team"));
        assert!(robots.is_allowed(AGENT, "/team"));
    }

    #[test]
    fn test_shared_agent_lines_form_one_group() {
        let content = r#"
User-agent: googlebot
User-agent: practice-scraper
Disallow: /staff/
Crawl-delay: 5
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed(AGENT, "/staff/jane"));
        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_secs(5)));
        assert!(robots.is_allowed("bingbot", "/staff/jane"));
    }

    #[test]
    fn test_longest_match_and_allow_ties() {
        let content = r#"
User-agent: *
Disallow: /private/
Allow: /private/public/
Disallow: /page
Allow: /page
        "#;

        let robots = RobotsTxt::parse(content);

        assert!(!robots.is_allowed(AGENT, "/private/secret"));
        assert!(robots.is_allowed(AGENT, "/private/public/page"));
        assert!(robots.is_allowed(AGENT, "/page"));
    }

    #[test]
    fn test_wildcards() {
        let content = r#"
User-agent: *
Disallow: /*.pdf$
Disallow: /*?print=
        "#;

        let robots = RobotsTxt::parse(content);
        let url = Url::parse("https://example.com/services/anxiety?print=1").unwrap();

        assert!(!robots.is_allowed(AGENT, "/forms/intake.pdf"));
        assert!(robots.is_allowed(AGENT, "/forms/intake.pdf.html"));
        assert!(!robots.is_url_allowed(AGENT, &url));
    }

    #[test]
    fn test_empty_and_disallow_all() {
        let robots = RobotsTxt::parse("");
        assert!(robots.is_allowed(AGENT, "/any/path"));
        assert!(robots.crawl_delay(AGENT).is_none());

        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /\n");
        assert!(robots.disallows_all(AGENT));
    }

    #[test]
    fn test_huge_crawl_delay_saturates() {
        for value in ["1e20", "99999999999999999999"] {
            let robots = RobotsTxt::parse(&format!("User-agent: *\nCrawl-delay: {}\n", value));
            assert_eq!(robots.crawl_delay(AGENT), Some(Duration::MAX));
        }

        let robots = RobotsTxt::parse("User-agent: *\nCrawl-delay: 0.5\n");
        assert_eq!(robots.crawl_delay(AGENT), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_robots_url() {
        let root = Url::parse("https://example.com/some/page?x=1").unwrap();
        assert_eq!(
            robots_url(&root).unwrap().as_str(),
            "https://example.com/robots.txt"
        );
    }
}
