//! Error taxonomy for the scrape and pseudonymize runs.
//!
//! The variants map onto how far a failure is allowed to travel:
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`FetchError::Transient`] | one request | retried with backoff |
//! | [`FetchError::Permanent`] | one page | page skipped, run continues |
//! | [`ParseError`] | one review fragment | fragment skipped, page continues |
//! | [`CrawlError`] | one section | section skipped, run fails if nothing was reachable |
//! | [`ScrapeError`] | one section | either of the above for a scrape-and-save |
//! | [`WriteError`] | the dataset file | fatal, non-zero exit |
//! | [`ConfigError`] | startup | fatal, non-zero exit |

use std::path::PathBuf;
use thiserror::Error;

/// Failure to retrieve one listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Worth retrying: timeouts, connection resets, 5xx, 408 and 429.
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// Retrying will not help: 404 and the other 4xx statuses.
    #[error("permanent failure fetching {url}: {reason}")]
    Permanent { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transient { url, .. } | FetchError::Permanent { url, .. } => url,
        }
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(url: &str, status: reqwest::StatusCode) -> Self {
        let reason = format!("HTTP {status}");
        let url = url.to_string();
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            FetchError::Transient { url, reason }
        } else {
            FetchError::Permanent { url, reason }
        }
    }

    /// Classify a transport-level error from `reqwest`.
    pub fn from_reqwest(url: &str, e: &reqwest::Error) -> Self {
        let reason = e.to_string();
        let url = url.to_string();
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            FetchError::Transient { url, reason }
        } else if let Some(status) = e.status() {
            FetchError::from_status(&url, status)
        } else {
            FetchError::Permanent { url, reason }
        }
    }
}

/// Failure to turn one review fragment into a record.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("review fragment {fragment} has no body text")]
    MissingBody { fragment: usize },

    #[error("invalid CSS selector `{selector}`")]
    InvalidSelector { selector: String },
}

/// The crawl of a whole section could not start.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("first page of the {section} section is unreachable: {source}")]
    Unreachable {
        section: String,
        #[source]
        source: FetchError,
    },

    #[error("cannot build listing URL for the {section} section: {source}")]
    InvalidUrl {
        section: String,
        #[source]
        source: url::ParseError,
    },
}

/// Failure of a whole scrape-and-save for one section.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Reading or rewriting a dataset file failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot tell which review section {path} belongs to")]
    UnknownSection { path: PathBuf },
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_not_found_is_permanent() {
        let e = FetchError::from_status("https://example.com/page/3/", StatusCode::NOT_FOUND);
        assert!(!e.is_transient());
        assert_eq!(e.url(), "https://example.com/page/3/");
    }

    #[test]
    fn test_server_errors_and_throttling_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
        ] {
            assert!(FetchError::from_status("u", status).is_transient(), "{status}");
        }
    }

    #[test]
    fn test_forbidden_is_permanent() {
        assert!(!FetchError::from_status("u", StatusCode::FORBIDDEN).is_transient());
    }
}
