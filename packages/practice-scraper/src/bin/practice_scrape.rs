//! Scrape one therapy-practice site and print the result as JSON.
//!
//! Usage:
//!   practice-scrape calmwaters.com --therapist "Jane Doe" --specialty Anxiety --specialty EMDR
//!
//! Configuration comes from `PRACTICE_SCRAPER_*` environment variables (or
//! `--config file.json`); `FIRECRAWL_API_KEY` enables the render path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use practice_scraper::{RenderCredentials, ScrapeConfig, ScrapeRequest, Scraper, SiteTarget};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "practice-scrape")]
#[command(about = "Find a therapist's page and specialty pages and extract their text")]
struct Cli {
    /// Practice website (scheme optional)
    url: String,

    /// Therapist name to look for
    #[arg(short, long)]
    therapist: Option<String>,

    /// Requested specialty (repeatable)
    #[arg(short, long = "specialty")]
    specialties: Vec<String>,

    /// Therapist page to use instead of discovery
    #[arg(long)]
    manual_therapist_url: Vec<String>,

    /// Extra specialty page (repeatable)
    #[arg(long)]
    manual_specialty_url: Vec<String>,

    /// JSON config file (defaults plus environment otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,practice_scraper=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ScrapeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ScrapeConfig::from_env().context("Invalid PRACTICE_SCRAPER_* environment")?,
    };

    let credentials = RenderCredentials::from_env();
    if credentials.is_none() {
        tracing::info!("FIRECRAWL_API_KEY not set, render path disabled");
    }

    let scraper = Scraper::http(config, credentials).context("Failed to build HTTP client")?;

    let mut target = SiteTarget::new(cli.url);
    if let Some(name) = cli.therapist {
        target = target.with_therapist(name);
    }
    let mut request = ScrapeRequest::new(target).with_specialties(cli.specialties);
    for url in cli.manual_therapist_url {
        request = request.with_manual_therapist_url(url);
    }
    for url in cli.manual_specialty_url {
        request = request.with_manual_specialty_url(url);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with partial results");
            on_interrupt.cancel();
        }
    });

    let result = scraper
        .run(&request, &cancel)
        .await
        .context("Scrape failed")?;

    let json = if cli.compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", json);

    Ok(())
}
