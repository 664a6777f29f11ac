//! Network access: HTTP and render fetchers, pacing, retry, robots and sitemaps.

pub mod firecrawl;
pub mod http;
pub mod retry;
pub mod robots;
pub mod scheduled;
pub mod scheduler;
pub mod sitemap;

pub use firecrawl::FirecrawlRenderer;
pub use http::HttpFetcher;
pub use retry::{AttemptOutcome, FetchAttempt, RetryOutcome, RetryPolicy};
pub use robots::RobotsTxt;
pub use scheduled::ScheduledFetcher;
pub use scheduler::RequestScheduler;
pub use sitemap::{parse_sitemap, Sitemap};
