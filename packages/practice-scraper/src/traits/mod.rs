//! Trait seams for network access.

pub mod fetcher;

pub use fetcher::{FetchedPage, PageFetcher, Renderer};
