//! Property tests for URL handling and scoring.

mod common;

use std::time::Duration;

use common::*;
use practice_scraper::pipeline::scoring::{specialty_score, therapist_score, RequestedSpecialty};
use practice_scraper::pipeline::{CandidateLink, NameTokens};
use practice_scraper::validator::{dedupe, dedupe_key, normalize};
use practice_scraper::{DiscoveredPage, LinkSource, PageKind, ScoringConfig};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;
use url::Url;

fn base() -> Url {
    Url::parse("https://calmwaters.com/services/").unwrap()
}

fn host() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("calmwaters.com".to_string()),
        Just("www.calmwaters.com".to_string()),
        Just("CalmWaters.COM".to_string()),
        Just("peaceful-minds.org".to_string()),
    ]
}

fn path() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-z0-9-]{1,8}", 0..4),
        any::<bool>(),
    )
        .prop_map(|(segments, trailing)| {
            let mut path = format!("/{}", segments.join("/"));
            if trailing && !segments.is_empty() {
                path.push('/');
            }
            path
        })
}

/// Absolute, root-relative and relative references.
fn reference() -> impl Strategy<Value = String> {
    prop_oneof![
        (host(), path(), "(#[a-z]{1,5})?")
            .prop_map(|(host, path, fragment)| format!("https://{}{}{}", host, path, fragment)),
        path(),
        "[a-z0-9-]{1,10}(\\?q=[a-z]{1,4})?",
    ]
}

fn url() -> impl Strategy<Value = Url> {
    (host(), path()).prop_map(|(host, path)| Url::parse(&format!("https://{}{}", host, path)).unwrap())
}

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in reference()) {
        let once = normalize(&raw, &base()).unwrap();
        let twice = normalize(once.as_str(), &base()).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.fragment().is_none());
    }

    #[test]
    fn dedupe_is_idempotent_and_keeps_first_seen_order(urls in prop::collection::vec(url(), 0..12)) {
        let once = dedupe(&urls);
        prop_assert_eq!(dedupe(&once), once.clone());

        // Every kept URL is the first occurrence of its key
        let mut first_seen: Vec<&Url> = Vec::new();
        for url in &urls {
            if !first_seen.iter().any(|u| dedupe_key(u) == dedupe_key(url)) {
                first_seen.push(url);
            }
        }
        let kept: Vec<&Url> = once.iter().collect();
        prop_assert_eq!(kept, first_seen);
    }

    #[test]
    fn page_confidence_is_clamped(confidence in any::<f64>(), url in url()) {
        let page = DiscoveredPage::new(url, PageKind::Unknown, confidence, "", LinkSource::Root);
        prop_assert!((0.0..=1.0).contains(&page.confidence));
    }

    #[test]
    fn scores_stay_in_unit_interval(
        url in url(),
        anchor in "[A-Za-z ,.]{0,40}",
        roster in 1usize..10,
        name in "(Dr\\. )?[A-Z][a-z]{2,8} [A-Z][a-z]{2,8}(, LCSW)?",
        wanted in "[A-Za-z ]{1,20}",
    ) {
        let config = ScoringConfig::default();
        let mut link = CandidateLink::bare(url, anchor, LinkSource::Root);
        link.roster_size = roster;
        let name = NameTokens::parse(&name, &config);

        let therapist = therapist_score(&link, name.as_ref(), 3, &config);
        prop_assert!((0.0..=1.0).contains(&therapist.confidence));

        let requested = vec![RequestedSpecialty::new(&wanted)];
        let specialty = specialty_score(&link, &requested, &config);
        prop_assert!((0.0..=1.0).contains(&specialty.confidence));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn discovered_pages_meet_configured_thresholds(
        therapist_threshold in 0.0f64..1.5,
        specialty_threshold in 0.0f64..1.5,
    ) {
        let mut config = config().with_min_interval(Duration::ZERO);
        config.scoring.therapist.threshold = therapist_threshold;
        config.scoring.specialty.threshold = specialty_threshold;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        let result = runtime
            .block_on(
                scraper(&practice_site(), config)
                    .run(&jane_request(&["Anxiety", "EMDR"]), &CancellationToken::new()),
            )
            .unwrap();

        for page in result.pages.iter().filter(|p| p.source != LinkSource::Manual) {
            match page.kind {
                PageKind::TherapistPage => prop_assert!(page.confidence >= therapist_threshold),
                PageKind::SpecialtyPage => prop_assert!(page.confidence >= specialty_threshold),
                _ => {}
            }
        }
        if specialty_threshold > 1.0 {
            prop_assert!(result.pages.iter().all(|p| p.kind != PageKind::SpecialtyPage));
        }
    }
}
