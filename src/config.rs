//! YAML configuration: per-source rulesets and global settings.
//!
//! A config file has three top-level sections:
//!
//! ```yaml
//! settings:
//!   output_csv: news_articles.csv
//!   request_delay: 1.0
//!   start_date: "2024-01-01"
//!   save_interval: 10
//! templates:
//!   common:
//!     headers: { User-Agent: "Mozilla/5.0" }
//! sources:
//!   cnn:
//!     extends: common
//!     base_url: https://edition.cnn.com/world
//!     article_selector: "a.container__link, a[data-link-type=article]"
//! ```
//!
//! Sources may `extends` a named template. Inheritance is a shallow merge where
//! the source's own keys win, resolved once here; the resulting
//! [`SourceRuleset`] is immutable for the rest of the run. A source that fails
//! validation is skipped with a warning instead of failing the whole file.

use crate::error::ConfigError;
use chrono::NaiveDate;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use scraper::Selector;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

/// User agent sent when a source configures no headers of its own.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

const DEFAULT_OUTPUT_CSV: &str = "news_articles.csv";
const DEFAULT_REQUEST_DELAY_SECS: f64 = 1.0;
const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_MAX_RETRIES: usize = 2;

/// The config file as written on disk.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: RawSettings,
    #[serde(default)]
    pub templates: Mapping,
    #[serde(default)]
    pub sources: Mapping,
}

impl ConfigFile {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Read and parse a config file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let yaml = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let config = ConfigFile::from_yaml(&yaml)?;
    info!("Loaded configuration");
    Ok(config)
}

/// Link selectors may be written as one comma-joined string or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SelectorList {
    Joined(String),
    List(Vec<String>),
}

impl SelectorList {
    /// Individual selectors in configured order.
    pub fn parts(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            SelectorList::Joined(s) => s.split(',').collect(),
            SelectorList::List(items) => items.iter().flat_map(|s| s.split(',')).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One source entry after template inheritance, before validation.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SourceConfig {
    pub base_url: Option<String>,
    pub article_selector: Option<SelectorList>,
    pub title_selector: Option<String>,
    pub author_selector: Option<String>,
    pub content_selector: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub max_articles: Option<usize>,
}

/// Validated, immutable description of where a source keeps its articles.
#[derive(Debug, Clone)]
pub struct SourceRuleset {
    pub name: String,
    pub listing_url: Url,
    /// Evaluated as a union: every selector's matches are concatenated.
    pub link_selectors: Vec<Selector>,
    pub title_selector: Option<Selector>,
    pub author_selector: Option<Selector>,
    pub content_selector: Option<Selector>,
    pub headers: HeaderMap,
    pub max_articles: Option<usize>,
}

impl SourceRuleset {
    pub fn from_config(name: &str, config: SourceConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                source_name: name.to_string(),
                field: "base_url",
            })?;
        let selectors = config
            .article_selector
            .map(|s| s.parts())
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                source_name: name.to_string(),
                field: "article_selector",
            })?;

        let listing_url = Url::parse(base_url.trim()).map_err(|e| ConfigError::BaseUrl {
            source_name: name.to_string(),
            reason: e.to_string(),
        })?;

        let link_selectors = selectors
            .iter()
            .map(|s| compile_selector(name, s))
            .collect::<Result<Vec<_>, _>>()?;

        let optional = |s: Option<String>| -> Result<Option<Selector>, ConfigError> {
            match s.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => compile_selector(name, s).map(Some),
                _ => Ok(None),
            }
        };

        Ok(Self {
            name: name.to_string(),
            listing_url,
            link_selectors,
            title_selector: optional(config.title_selector)?,
            author_selector: optional(config.author_selector)?,
            content_selector: optional(config.content_selector)?,
            headers: build_headers(name, config.headers)?,
            max_articles: config.max_articles.filter(|n| *n > 0),
        })
    }
}

fn compile_selector(source_name: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        source_name: source_name.to_string(),
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn build_headers(
    source_name: &str,
    headers: Option<BTreeMap<String, String>>,
) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers.unwrap_or_default() {
        let invalid = || ConfigError::Header {
            source_name: source_name.to_string(),
            header: key.clone(),
        };
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
        map.insert(name, value);
    }
    if !map.contains_key(USER_AGENT) {
        map.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
    Ok(map)
}

/// Shallow-merge a source entry over the template it extends.
fn inherit(source_name: &str, entry: &Value, templates: &Mapping) -> Result<Mapping, ConfigError> {
    let child = entry.as_mapping().cloned().unwrap_or_default();
    let Some(template_name) = child.get("extends").and_then(Value::as_str) else {
        return Ok(child);
    };
    let template = templates
        .get(template_name)
        .and_then(Value::as_mapping)
        .ok_or_else(|| ConfigError::UnknownTemplate {
            source_name: source_name.to_string(),
            template: template_name.to_string(),
        })?;

    let mut merged = template.clone();
    for (key, value) in child {
        merged.insert(key, value);
    }
    Ok(merged)
}

fn resolve_source(
    source_name: &str,
    entry: &Value,
    templates: &Mapping,
) -> Result<SourceRuleset, ConfigError> {
    let merged = inherit(source_name, entry, templates)?;
    let config: SourceConfig = serde_yaml::from_value(Value::Mapping(merged))?;
    SourceRuleset::from_config(source_name, config)
}

/// Resolve every configured source, skipping (and logging) invalid ones.
///
/// Order follows the config file.
#[instrument(level = "info", skip_all)]
pub fn init_sources(config: &ConfigFile) -> IndexMap<String, SourceRuleset> {
    let mut sources = IndexMap::new();
    for (key, entry) in &config.sources {
        let Some(name) = key.as_str() else {
            warn!(key = ?key, "Skipping source with a non-string name");
            continue;
        };
        match resolve_source(name, entry, &config.templates) {
            Ok(ruleset) => {
                info!(source = %name, url = %ruleset.listing_url, "Initialized source");
                sources.insert(name.to_string(), ruleset);
            }
            Err(e) => {
                warn!(source = %name, error = %e, "Skipping source: invalid configuration");
            }
        }
    }
    sources
}

/// Settings as written in the config file; every key is optional.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawSettings {
    #[serde(alias = "output_path")]
    pub output_csv: Option<PathBuf>,
    pub request_delay: Option<f64>,
    pub start_date: Option<Value>,
    pub max_articles_per_source: Option<usize>,
    pub save_interval: Option<usize>,
    pub request_timeout: Option<f64>,
    pub max_retries: Option<usize>,
    pub max_concurrent_sources: Option<usize>,
}

/// Run-wide settings with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_csv: PathBuf,
    /// Minimum spacing between two requests to the same source.
    pub request_delay: Duration,
    /// Articles dated strictly before this are dropped.
    pub start_date: Option<NaiveDate>,
    pub max_articles_per_source: Option<usize>,
    /// Checkpoint every N assembled articles per source; 0 saves once at the end.
    pub save_interval: usize,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub max_concurrent_sources: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_csv: PathBuf::from(DEFAULT_OUTPUT_CSV),
            request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
            start_date: None,
            max_articles_per_source: None,
            save_interval: 0,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrent_sources: 1,
        }
    }
}

impl Settings {
    /// Apply defaults. A missing or malformed `start_date` becomes `today`.
    pub fn resolve(raw: RawSettings, today: NaiveDate) -> Self {
        let defaults = Settings::default();
        let start_date = match raw.start_date {
            Some(Value::String(s)) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                Ok(date) => {
                    info!(%date, "Filtering articles from start date");
                    date
                }
                Err(e) => {
                    warn!(start_date = %s, error = %e, "Invalid start_date format. Using current date.");
                    today
                }
            },
            Some(other) => {
                warn!(start_date = ?other, "Invalid start_date format. Using current date.");
                today
            }
            None => {
                warn!("No start_date provided. Using current date.");
                today
            }
        };

        Self {
            output_csv: raw.output_csv.unwrap_or(defaults.output_csv),
            request_delay: seconds("request_delay", raw.request_delay, defaults.request_delay),
            start_date: Some(start_date),
            max_articles_per_source: raw.max_articles_per_source.filter(|n| *n > 0),
            save_interval: raw.save_interval.unwrap_or(defaults.save_interval),
            request_timeout: seconds(
                "request_timeout",
                raw.request_timeout,
                defaults.request_timeout,
            ),
            max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
            max_concurrent_sources: raw
                .max_concurrent_sources
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_sources),
        }
    }
}

fn seconds(key: &str, value: Option<f64>, default: Duration) -> Duration {
    match value {
        None => default,
        Some(secs) => Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
            warn!(key, value = secs, "Invalid duration; using default");
            default
        }),
    }
}
