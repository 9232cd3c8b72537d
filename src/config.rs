//! Scraper configuration.
//!
//! Defaults reproduce the behaviour the datasets were first collected with
//! (British Airways, 100 reviews per page, newest first). Any subset of the
//! fields can be overridden from a YAML file passed with `--config`:
//!
//! ```yaml
//! airline: virgin-atlantic
//! request_delay_ms: 2000
//! max_retries: 3
//! ```

use crate::error::ConfigError;
use crate::models::Section;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Site root, e.g. `https://www.airlinequality.com`.
    pub base_url: String,
    /// Airline slug as it appears in listing URLs.
    pub airline: String,
    /// Reviews per listing page requested from the site.
    pub page_size: u32,
    pub user_agent: String,
    /// Minimum pause between two consecutive requests.
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    pub backoff_jitter_ms: u64,
    /// When the page count is unknown, stop after this many failed pages in a row.
    pub max_consecutive_failures: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.airlinequality.com".to_string(),
            airline: "british-airways".to_string(),
            page_size: 100,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3"
                .to_string(),
            request_delay_ms: 1000,
            timeout_secs: 30,
            max_retries: 4,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            backoff_jitter_ms: 250,
            max_consecutive_failures: 3,
        }
    }
}

impl ScraperConfig {
    /// Load overrides from a YAML file on top of the defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScraperConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        info!(airline = %config.airline, "Loaded scraper configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".into()));
        }
        if self.airline.trim().is_empty() {
            return Err(ConfigError::Invalid("airline must not be empty".into()));
        }
        Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url `{}`: {e}", self.base_url)))?;
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// URL of one listing page, 1-based.
    pub fn page_url(&self, section: Section, page: u32) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.base_url)?.join(&format!(
            "/{}-reviews/{}/page/{}/",
            section.as_str(),
            self.airline,
            page
        ))?;
        url.query_pairs_mut()
            .append_pair("sortby", "post_date:Desc")
            .append_pair("pagesize", &self.page_size.to_string());
        Ok(url)
    }
}
