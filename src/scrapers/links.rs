//! Listing-page link classification.
//!
//! A listing page (a section front, a homepage) links to far more than
//! articles. Candidate URLs are collected from every configured link selector,
//! resolved against the listing URL, and then filtered by a per-publisher
//! predicate looked up in a [`ClassifierRegistry`]:
//!
//! | Source name | Rule |
//! |-------------|------|
//! | `cnn` | URL contains a `/YYYY/MM/DD/` date path |
//! | `nytimes*` | no pagination, section fronts or video; Spanish articles or a date path |
//! | `apnews*` | path contains an `/article/` segment |
//! | anything else | every link is accepted |
//!
//! Supporting another publisher means registering one more predicate.

use crate::config::SourceRuleset;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

/// Decides whether a resolved link points at an article.
pub type LinkPredicate = fn(&Url) -> bool;

static DATE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d{4}/\d{2}/\d{2}/").expect("valid regex"));

/// How a registry entry matches a source name (always case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Exact(&'static str),
    Prefix(&'static str),
}

impl NameMatch {
    fn matches(&self, source_name: &str) -> bool {
        let name = source_name.to_ascii_lowercase();
        match self {
            NameMatch::Exact(expected) => name == expected.to_ascii_lowercase(),
            NameMatch::Prefix(prefix) => name.starts_with(&prefix.to_ascii_lowercase()),
        }
    }
}

/// Maps source names to link predicates. First registration that matches wins.
#[derive(Debug, Clone)]
pub struct ClassifierRegistry {
    entries: Vec<(NameMatch, LinkPredicate)>,
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(NameMatch::Exact("cnn"), has_date_path)
            .register(NameMatch::Prefix("nytimes"), is_nytimes_article)
            .register(NameMatch::Prefix("apnews"), is_apnews_article);
        registry
    }
}

impl ClassifierRegistry {
    /// A registry that accepts every link for every source.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, pattern: NameMatch, predicate: LinkPredicate) -> &mut Self {
        self.entries.push((pattern, predicate));
        self
    }

    /// The predicate for `source_name`, or a pass-through if none is registered.
    pub fn predicate_for(&self, source_name: &str) -> LinkPredicate {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(source_name))
            .map(|(_, predicate)| *predicate)
            .unwrap_or(accept_all)
    }
}

fn accept_all(_: &Url) -> bool {
    true
}

/// CNN article URLs carry their date: `/2025/02/25/`.
pub fn has_date_path(url: &Url) -> bool {
    DATE_PATH.is_match(url.as_str())
}

pub fn is_nytimes_article(url: &Url) -> bool {
    let s = url.as_str();
    if s.contains("?page=")
        || s.ends_with("/section/politics")
        || s.ends_with("/section/world")
        || s.ends_with("/section/business")
    {
        return false;
    }
    if s.contains("/video/") {
        return false;
    }
    if s.contains("/es/") && s.contains("/espanol/") {
        return true;
    }
    has_date_path(url)
}

pub fn is_apnews_article(url: &Url) -> bool {
    url.path().contains("/article/")
}

/// Extract candidate article URLs from a parsed listing page.
///
/// Selectors are a union: their matches are concatenated in configured order.
/// Fragment-only and `javascript:` links are dropped, relative links are
/// resolved against the listing URL, the source's predicate is applied, and
/// the result is deduplicated (first occurrence wins) before `cap` truncates
/// it.
pub fn classify_links(
    document: &Html,
    ruleset: &SourceRuleset,
    registry: &ClassifierRegistry,
    cap: Option<usize>,
) -> Vec<String> {
    let predicate = registry.predicate_for(&ruleset.name);

    let anchors: Vec<&str> = ruleset
        .link_selectors
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|element| element.value().attr("href"))
        .collect();

    if anchors.is_empty() {
        warn!(source = %ruleset.name, url = %ruleset.listing_url, "No links found on listing page");
        return Vec::new();
    }
    info!(source = %ruleset.name, count = anchors.len(), "Found links on listing page");

    let mut urls: Vec<String> = anchors
        .into_iter()
        .filter_map(|href| resolve_link(&ruleset.listing_url, href))
        .filter(|url| predicate(url))
        .map(String::from)
        .unique()
        .collect();

    if let Some(cap) = cap {
        if urls.len() > cap {
            info!(source = %ruleset.name, cap, "Reached maximum limit of article URLs");
            urls.truncate(cap);
        }
    }

    info!(source = %ruleset.name, count = urls.len(), "Found unique article URLs");
    debug!(urls = ?urls, "Classified article URLs");
    urls
}

/// Parse listing HTML and classify its links in one step.
pub fn classify_listing(
    html: &str,
    ruleset: &SourceRuleset,
    registry: &ClassifierRegistry,
    cap: Option<usize>,
) -> Vec<String> {
    let document = Html::parse_document(html);
    classify_links(&document, ruleset, registry, cap)
}

fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.get(..11).is_some_and(|p| p.eq_ignore_ascii_case("javascript:"))
    {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
