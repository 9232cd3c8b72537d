//! # Airline Reviews
//!
//! Scrapes customer reviews of one airline from
//! [AirlineQuality](https://www.airlinequality.com) into flat CSV datasets
//! for downstream text analysis, and pseudonymizes reviewer names in them.
//!
//! ## Usage
//!
//! ```sh
//! airline_reviews scrape --pages 10
//! airline_reviews pseudonymize
//! ```
//!
//! ## Architecture
//!
//! `scrape` runs one pipeline per review section:
//! 1. **Fetching**: one listing page at a time, paced and retried ([`fetch`])
//! 2. **Parsing**: rule-table extraction of each review ([`scrapers`])
//! 3. **Paginating**: page-count discovery and bad-page tolerance ([`crawl`])
//! 4. **Output**: first-write-wins merge into `<section>_reviews.csv` ([`outputs`])
//!
//! `pseudonymize` is a separate pass over the written files ([`pseudonymize`]).
//!
//! Skipped pages and fragments are logged warnings; the process exits
//! non-zero only when setup fails, no section could be reached, or a dataset
//! file cannot be read or written.

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod crawl;
mod error;
mod fetch;
mod models;
mod outputs;
mod pseudonymize;
mod scrapers;
mod utils;

use cli::{Cli, Command, PseudonymizeArgs, ScrapeArgs};
use config::ScraperConfig;
use crawl::scrape_sections;
use error::ConfigError;
use fetch::build_fetcher;
use pseudonymize::Pseudonymizer;
use scrapers::airlinequality::ReviewParser;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "airline_reviews starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let result = match args.command {
        Command::Scrape(args) => scrape(args).await,
        Command::Pseudonymize(args) => pseudonymize(args).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}

#[instrument(level = "info", skip_all)]
async fn scrape(args: ScrapeArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => ScraperConfig::load(path)?,
        None => ScraperConfig::default(),
    };
    if let Some(airline) = &args.airline {
        config.airline = airline.clone();
    }
    config.validate()?;

    let sections = args.sections();
    if args.output.is_some() && sections.len() > 1 {
        return Err(ConfigError::Invalid(
            "--output can only be used with a single --section".into(),
        )
        .into());
    }

    // Early check: ensure the dataset directory is writable
    for section in &sections {
        let path = args.output_path(*section);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(std::path::Path::new("."));
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Dataset directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let parser = ReviewParser::new()?;
    let mut fetcher = build_fetcher(&config)?;
    info!(
        airline = %config.airline,
        sections = ?sections,
        max_pages = ?args.pages,
        "Starting scrape"
    );

    let outcome = scrape_sections(&mut fetcher, &parser, &config, &sections, args.pages, |s| {
        args.output_path(s)
    })
    .await;

    info!(
        requests = fetcher.inner().requests(),
        sections_reached = outcome.as_ref().map_or(0, Vec::len),
        sections_total = sections.len(),
        "Scrape finished"
    );
    outcome?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn pseudonymize(args: PseudonymizeArgs) -> Result<(), Box<dyn Error>> {
    let jobs = match &args.input {
        Some(input) => {
            let output = args.output.clone().unwrap_or_else(|| input.clone());
            vec![(input.clone(), output)]
        }
        None => pseudonymize::dataset_files(&args.data_dir)
            .await?
            .into_iter()
            .map(|path| (path.clone(), path))
            .collect(),
    };

    let pseudonymizer = Pseudonymizer::new(args.salt.as_ref().map(|s| s.expose()));
    if !pseudonymizer.is_salted() {
        debug!("No pseudonym salt set; mapping is reproducible from names alone");
    }
    for (input, output) in &jobs {
        let stats = pseudonymize::pseudonymize_file(input, output, &pseudonymizer).await?;
        info!(
            input = %input.display(),
            output = %output.display(),
            replaced = stats.replaced,
            "Dataset pseudonymized"
        );
    }
    info!(files = jobs.len(), "Pseudonymization finished");
    Ok(())
}
