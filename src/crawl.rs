//! Pagination driver: walks the listing pages of one section.
//!
//! # Stopping
//!
//! The first page decides how far to go. If it carries a page count (the
//! pagination bar, or the review total divided by the page size) that count is
//! the last page. A page with no review fragments ends the crawl early, and so
//! does `--pages`. Without a page count, the crawl also gives up after
//! `max_consecutive_failures` failed pages in a row.
//!
//! # Failures
//!
//! Page 1 failing makes the section unreachable. Any later page that fails,
//! permanently or after retries, is logged and skipped and the next index is
//! tried. Nothing is remembered across runs: re-running converges through the
//! dataset's dedup instead.
//!
//! A run over several sections ([`scrape_sections`]) fails only when none of
//! them could be reached, or when a dataset file cannot be read or written.

use crate::config::ScraperConfig;
use crate::error::{CrawlError, ScrapeError};
use crate::fetch::PageSource;
use crate::models::{Page, Review, Section};
use crate::outputs::dataset::{Dataset, MergeStats};
use crate::scrapers::airlinequality::ReviewParser;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Counters for one section crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    pub reviews_parsed: usize,
    pub reviews_skipped: usize,
}

impl CrawlSummary {
    fn absorb(&mut self, page: &Page) {
        self.pages_fetched += 1;
        self.reviews_parsed += page.reviews.len();
        self.reviews_skipped += page.skipped;
    }
}

/// Everything collected from one section.
#[derive(Debug, Clone, Default)]
pub struct SectionCrawl {
    pub reviews: Vec<Review>,
    pub summary: CrawlSummary,
}

/// Result of a scrape-and-save of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionReport {
    pub section: Section,
    pub crawl: CrawlSummary,
    pub merge: MergeStats,
    /// Records in the dataset file after the save.
    pub total_records: usize,
}

/// Fetch and parse every page of `section`.
///
/// Page 1 is fetched first and decides the page count. The remaining pages
/// are fetched one at a time, in order, until the last page, an empty page,
/// `max_pages`, or too many failures in a row without a page count.
///
/// # Arguments
///
/// * `source` - Where listing pages come from; [`crate::fetch::RetryFetch`] in production
/// * `parser` - Compiled review selectors
/// * `config` - Base URL, airline slug, page size and failure limit
/// * `section` - Which listing to walk
/// * `max_pages` - Optional cap on the number of pages, page 1 included
///
/// # Returns
///
/// Every review parsed, in page order, with page and fragment counters.
///
/// # Errors
///
/// [`CrawlError::Unreachable`] when page 1 cannot be fetched.
/// [`CrawlError::InvalidUrl`] when the configured base URL cannot be joined.
/// Failures on later pages are not errors; they are counted in
/// [`CrawlSummary::pages_skipped`].
///
/// # Examples
///
/// ```ignore
/// let mut fetcher = build_fetcher(&config)?;
/// let parser = ReviewParser::new()?;
/// let crawl = crawl_section(&mut fetcher, &parser, &config, Section::Lounge, Some(2)).await?;
/// println!("{} reviews from {} pages", crawl.reviews.len(), crawl.summary.pages_fetched);
/// ```
#[instrument(level = "info", skip(source, parser, config))]
pub async fn crawl_section<S: PageSource>(
    source: &mut S,
    parser: &ReviewParser,
    config: &ScraperConfig,
    section: Section,
    max_pages: Option<u32>,
) -> Result<SectionCrawl, CrawlError> {
    let url_for = |page: u32| {
        config
            .page_url(section, page)
            .map_err(|source| CrawlError::InvalidUrl {
                section: section.to_string(),
                source,
            })
    };

    let mut crawl = SectionCrawl::default();

    let first_url = url_for(1)?;
    let html = source
        .fetch(&first_url)
        .await
        .map_err(|source| CrawlError::Unreachable {
            section: section.to_string(),
            source,
        })?;
    let first = parser.parse_page(&html, 1, section);
    crawl.summary.absorb(&first);

    let page_count = first.pagination.page_count(config.page_size);
    let last_page = match (page_count, max_pages) {
        (Some(total), Some(cap)) => Some(total.min(cap)),
        (total, cap) => total.or(cap),
    };
    info!(
        ?page_count,
        total_reviews = ?first.pagination.total_reviews,
        ?last_page,
        "Discovered pagination"
    );

    let first_empty = first.is_empty();
    crawl.reviews.extend(first.reviews);
    if first_empty {
        info!("First page has no reviews; nothing more to crawl");
        return Ok(crawl);
    }

    let failure_limit = config.max_consecutive_failures.max(1);
    let mut consecutive_failures = 0u32;
    let mut index = 2u32;

    while last_page.is_none_or(|last| index <= last) {
        let url = url_for(index)?;
        match source.fetch(&url).await {
            Ok(html) => {
                consecutive_failures = 0;
                let page = parser.parse_page(&html, index, section);
                crawl.summary.absorb(&page);
                if page.is_empty() {
                    info!(page = index, "Empty listing page; end of section");
                    break;
                }
                crawl.reviews.extend(page.reviews);
            }
            Err(e) => {
                crawl.summary.pages_skipped += 1;
                consecutive_failures += 1;
                warn!(page = index, url = e.url(), error = %e, "Skipping page");
                if page_count.is_none() && consecutive_failures >= failure_limit {
                    warn!(
                        consecutive_failures,
                        "Too many failed pages without a known page count; stopping"
                    );
                    break;
                }
            }
        }
        index += 1;
    }

    info!(
        pages_fetched = crawl.summary.pages_fetched,
        pages_skipped = crawl.summary.pages_skipped,
        reviews_parsed = crawl.summary.reviews_parsed,
        reviews_skipped = crawl.summary.reviews_skipped,
        "Section crawl finished"
    );
    Ok(crawl)
}

/// Crawl `section` and merge the result into the dataset at `path`.
///
/// The existing file is loaded before any request is made and only rewritten
/// once the crawl has finished, so an unreachable section leaves it untouched.
#[instrument(level = "info", skip(source, parser, config, path), fields(path = %path.display()))]
pub async fn scrape_to_dataset<S: PageSource>(
    source: &mut S,
    parser: &ReviewParser,
    config: &ScraperConfig,
    section: Section,
    max_pages: Option<u32>,
    path: &Path,
) -> Result<SectionReport, ScrapeError> {
    let mut dataset = Dataset::load(path, section).await?;
    let crawl = crawl_section(source, parser, config, section, max_pages).await?;

    let merge = dataset.merge(crawl.reviews);
    dataset.save(path).await?;

    let report = SectionReport {
        section,
        crawl: crawl.summary,
        merge,
        total_records: dataset.len(),
    };
    info!(
        added = merge.added,
        duplicates = merge.duplicates,
        total_records = report.total_records,
        "Merged section into dataset"
    );
    Ok(report)
}

/// Scrape several sections in turn, each into its own dataset file.
///
/// An unreachable section is logged and skipped; the others still run.
///
/// # Arguments
///
/// * `sections` - Sections to scrape, in order
/// * `dataset_path` - Dataset file of each section
///
/// Other arguments are as for [`crawl_section`].
///
/// # Returns
///
/// One report per section that was reached. Skipped pages within a reached
/// section do not make the run fail.
///
/// # Errors
///
/// [`CrawlError::Unreachable`] of the last section tried when no section
/// could be reached. Any other [`ScrapeError`] stops the run at once.
///
/// # Examples
///
/// ```ignore
/// let data_dir = PathBuf::from("data");
/// let reports = scrape_sections(&mut fetcher, &parser, &config, &Section::ALL, None, |s| {
///     data_dir.join(s.dataset_file_name())
/// })
/// .await?;
/// ```
#[instrument(level = "info", skip(source, parser, config, dataset_path))]
pub async fn scrape_sections<S: PageSource>(
    source: &mut S,
    parser: &ReviewParser,
    config: &ScraperConfig,
    sections: &[Section],
    max_pages: Option<u32>,
    dataset_path: impl Fn(Section) -> PathBuf,
) -> Result<Vec<SectionReport>, ScrapeError> {
    let mut reports = Vec::with_capacity(sections.len());
    let mut last_unreachable = None;

    for &section in sections {
        let path = dataset_path(section);
        match scrape_to_dataset(source, parser, config, section, max_pages, &path).await {
            Ok(report) => {
                info!(
                    %section,
                    path = %path.display(),
                    pages_fetched = report.crawl.pages_fetched,
                    pages_skipped = report.crawl.pages_skipped,
                    reviews_parsed = report.crawl.reviews_parsed,
                    reviews_skipped = report.crawl.reviews_skipped,
                    added = report.merge.added,
                    duplicates = report.merge.duplicates,
                    total_records = report.total_records,
                    "Section complete"
                );
                reports.push(report);
            }
            Err(ScrapeError::Crawl(e @ CrawlError::Unreachable { .. })) => {
                warn!(%section, error = %e, "Section unreachable; skipping");
                last_unreachable = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    match last_unreachable {
        Some(e) if reports.is_empty() => Err(e.into()),
        _ => Ok(reports),
    }
}
