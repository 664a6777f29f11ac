// Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use practice_scraper::testing::{html_page, prose, MockFetcher};
use practice_scraper::{ScrapeConfig, ScrapeRequest, Scraper, SiteTarget};

pub const ROOT: &str = "https://calmwaters.com/";
pub const ROBOTS: &str = "https://calmwaters.com/robots.txt";
pub const ABOUT: &str = "https://calmwaters.com/about";
pub const JANE: &str = "https://calmwaters.com/team/jane-doe";
pub const ANXIETY: &str = "https://calmwaters.com/services/anxiety-therapy";
pub const EMDR: &str = "https://calmwaters.com/services/emdr";

/// Home page with a services submenu and a link to the team page.
pub fn home() -> String {
    html_page(
        "Calm Waters Counseling",
        r#"<header><nav><ul>
             <li><a href="/">Home</a></li>
             <li><a href="/about">About</a></li>
             <li><span>Services</span><ul>
               <li><a href="/services/anxiety-therapy">Anxiety</a></li>
               <li><a href="/services/emdr">EMDR</a></li>
             </ul></li>
             <li><a href="/contact">Contact</a></li>
           </ul></nav></header>
           <main><h1>Welcome</h1><p>A small group practice.</p></main>"#,
    )
}

/// Team page linking to each clinician's bio.
pub fn team() -> String {
    html_page(
        "About",
        r#"<main><section><h2>Our Clinicians</h2>
             <div><a href="/team/jane-doe"><img alt="Jane Doe, LCSW" src="j.jpg"></a></div>
             <div><a href="/team/john-roe">John Roe</a></div>
             <div><a href="/team/amy-poe">Amy Poe</a></div>
           </section></main>"#,
    )
}

/// Team page where every clinician is a card on the page itself.
pub fn team_cards() -> String {
    html_page(
        "About Us",
        &format!(
            r#"<main><h1>Our Clinicians</h1>
                 <div class="card"><h3>Jane Doe, LCSW</h3>{}</div>
                 <div class="card"><h3>John Roe, LMFT</h3>{}</div>
               </main>"#,
            prose("Trauma recovery"),
            prose("Couples counseling"),
        ),
    )
}

pub fn jane_bio() -> String {
    html_page(
        "Jane Doe, LCSW | Calm Waters",
        &format!(
            r#"<header><nav><a href="/">Home</a></nav></header>
               <main><h1>Jane Doe, LCSW</h1>{}{}</main>
               <footer><p>Calm Waters Counseling, 12 Lake St</p></footer>"#,
            prose("Trauma recovery"),
            prose("Family systems work"),
        ),
    )
}

pub fn specialty(topic: &str) -> String {
    html_page(
        topic,
        &format!("<main><h1>{}</h1>{}{}</main>", topic, prose(topic), prose(topic)),
    )
}

/// A practice site where discovery succeeds end to end.
pub fn practice_site() -> MockFetcher {
    MockFetcher::new()
        .with_page(ROOT, home())
        .with_page(ABOUT, team())
        .with_page(JANE, jane_bio())
        .with_page(ANXIETY, specialty("Anxiety Therapy"))
        .with_page(EMDR, specialty("EMDR"))
}

/// Defaults without sitemap lookups, so request timing is easy to follow.
pub fn config() -> ScrapeConfig {
    ScrapeConfig::default().with_sitemap(false)
}

pub fn scraper(mock: &MockFetcher, config: ScrapeConfig) -> Scraper {
    Scraper::new(Arc::new(mock.clone()), config)
}

pub fn jane_request(specialties: &[&str]) -> ScrapeRequest {
    ScrapeRequest::new(SiteTarget::new("calmwaters.com").with_therapist("Dr. Jane Doe, LCSW"))
        .with_specialties(specialties.iter().copied())
}
