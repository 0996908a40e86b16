//! Error types for fetching, configuration, and persistence.
//!
//! Each layer of the scraper gets its own error enum so callers can decide at
//! the right scope whether a failure is fatal (a broken config file), per-source
//! (a bad ruleset, an unreachable listing page), or per-article (a timed-out
//! fetch).

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while downloading a page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Transport-level failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status code.
    #[error("unexpected status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl ScrapeError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Timeouts, connection failures and 5xx answers are transient; client
    /// errors and malformed URLs are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::Http(e) => e.is_timeout() || e.is_connect(),
            ScrapeError::Status { status, .. } => status.is_server_error(),
            ScrapeError::Url(_) => false,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("source `{source_name}` is missing required field `{field}`")]
    MissingField {
        source_name: String,
        field: &'static str,
    },

    #[error("source `{source_name}` has an invalid selector `{selector}`: {reason}")]
    Selector {
        source_name: String,
        selector: String,
        reason: String,
    },

    #[error("source `{source_name}` has an invalid header `{header}`")]
    Header { source_name: String, header: String },

    #[error("source `{source_name}` has an invalid base_url: {reason}")]
    BaseUrl { source_name: String, reason: String },

    #[error("source `{source_name}` extends unknown template `{template}`")]
    UnknownTemplate {
        source_name: String,
        template: String,
    },
}

/// Errors raised by the persisted article table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
