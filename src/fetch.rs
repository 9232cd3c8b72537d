//! Listing page retrieval with pacing and exponential backoff.
//!
//! # Architecture
//!
//! - [`PageSource`]: core trait, one page body per URL
//! - [`HttpFetcher`]: `reqwest`-backed source that owns its client and the
//!   courtesy delay between consecutive requests
//! - [`RetryFetch`]: decorator that retries transient failures of any
//!   [`PageSource`]
//!
//! A fetcher is built once per run by [`build_fetcher`] and handed to the
//! crawler explicitly; there is no process-wide session.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! Only [`FetchError::Transient`] is retried. A permanent failure such as a 404
//! is returned on the first attempt.

use crate::config::ScraperConfig;
use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::Client;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Something that can return the body of a listing page.
pub trait PageSource {
    async fn fetch(&mut self, url: &Url) -> Result<String, FetchError>;
}

/// HTTP page source with a minimum delay between requests.
pub struct HttpFetcher {
    client: Client,
    request_delay: Duration,
    last_request: Option<Instant>,
    requests: u64,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            request_delay: config.request_delay(),
            last_request: None,
            requests: 0,
        })
    }

    /// Requests issued so far, retries included.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                let wait = self.request_delay - elapsed;
                debug!(?wait, requests = self.requests, "Pacing before next request");
                sleep(wait).await;
            }
        }
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("request_delay", &self.request_delay)
            .field("requests", &self.requests)
            .finish()
    }
}

impl PageSource for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&mut self, url: &Url) -> Result<String, FetchError> {
        self.pace().await;
        self.last_request = Some(Instant::now());
        self.requests += 1;

        let t0 = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url.as_str(), status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff to any [`PageSource`].
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ms: u64,
}

impl<T> RetryFetch<T>
where
    T: PageSource,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter_ms: 250,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(31) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter = if self.jitter_ms > 0 {
            rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageSource for RetryFetch<T>
where
    T: PageSource,
{
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&mut self, url: &Url) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The production fetcher for one run: HTTP with pacing, wrapped in retries.
pub fn build_fetcher(config: &ScraperConfig) -> Result<RetryFetch<HttpFetcher>, reqwest::Error> {
    let http = HttpFetcher::new(config)?;
    Ok(RetryFetch::new(http, config.max_retries, config.backoff_base())
        .with_max_delay(config.backoff_max())
        .with_jitter_ms(config.backoff_jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails transiently `flaky` times, then returns `outcome`.
    struct Scripted {
        flaky: usize,
        permanent: bool,
        calls: usize,
    }

    impl PageSource for Scripted {
        async fn fetch(&mut self, url: &Url) -> Result<String, FetchError> {
            self.calls += 1;
            if self.calls <= self.flaky {
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    reason: "HTTP 503 Service Unavailable".into(),
                });
            }
            if self.permanent {
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".into(),
                });
            }
            Ok("<html></html>".into())
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/airline-reviews/x/page/1/").unwrap()
    }

    fn retrying(flaky: usize, permanent: bool, max_retries: usize) -> RetryFetch<Scripted> {
        RetryFetch::new(
            Scripted {
                flaky,
                permanent,
                calls: 0,
            },
            max_retries,
            Duration::ZERO,
        )
        .with_jitter_ms(0)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut source = retrying(2, false, 3);
        let body = source.fetch(&url()).await.unwrap();
        assert_eq!(body, "<html></html>");
        assert_eq!(source.inner().calls, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut source = retrying(10, false, 2);
        let err = source.fetch(&url()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(source.inner().calls, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mut source = retrying(0, true, 5);
        let err = source.fetch(&url()).await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(source.inner().calls, 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let source = RetryFetch::new(
            Scripted {
                flaky: 0,
                permanent: false,
                calls: 0,
            },
            5,
            Duration::from_secs(1),
        )
        .with_max_delay(Duration::from_secs(5))
        .with_jitter_ms(0);
        assert_eq!(source.backoff(1), Duration::from_secs(1));
        assert_eq!(source.backoff(2), Duration::from_secs(2));
        assert_eq!(source.backoff(3), Duration::from_secs(4));
        assert_eq!(source.backoff(4), Duration::from_secs(5));
    }

    #[test]
    fn test_http_fetcher_starts_without_requests() {
        let fetcher = HttpFetcher::new(&ScraperConfig::default()).unwrap();
        assert_eq!(fetcher.requests(), 0);
    }

    #[tokio::test]
    async fn test_pacing_waits_between_requests() {
        let config = ScraperConfig {
            request_delay_ms: 50,
            ..ScraperConfig::default()
        };
        let mut fetcher = HttpFetcher::new(&config).unwrap();
        fetcher.last_request = Some(Instant::now());
        let t0 = Instant::now();
        fetcher.pace().await;
        assert!(t0.elapsed() >= Duration::from_millis(40));
    }
}
