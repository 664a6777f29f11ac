//! Discovery, scoring, extraction and their orchestration.

pub mod extractor;
pub mod finder;
pub mod links;
pub mod orchestrator;
pub mod scoring;

pub use extractor::{extract_document, ContentExtractor, ExtractionOutcome};
pub use finder::{FinderOutput, PageFinder};
pub use links::{extract_links, CandidateLink};
pub use orchestrator::Scraper;
pub use scoring::{assign_specialties, specialty_score, therapist_score, NameTokens, Score};
