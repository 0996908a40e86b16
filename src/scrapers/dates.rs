//! Publication date inference.
//!
//! A page's date is inferred by an ordered cascade. The first strategy that
//! produces a date wins and later strategies are never consulted:
//!
//! | Rank | Strategy | Signal |
//! |------|----------|--------|
//! | 0 | `url` | `/2024/03/07/`, `/2024/mar/07/` or a trailing `-20240307` in the path |
//! | 1 | `json_ld` | `datePublished` in `application/ld+json` blocks |
//! | 2 | `meta` | fifteen known `<meta>` tags, in fixed priority |
//! | 3 | `time` | `datetime` attribute of `<time>` elements |
//! | 4 | `class` | visible text of elements with date-like class names |
//!
//! Within `meta`, a tag whose content is empty or does not parse as a date is
//! passed over and the next tag in priority order is tried.
//!
//! If nothing matches the page is undateable. There is no fallback to "today".
//!
//! Textual formats are tried in a fixed order and the first that parses is
//! accepted, so `%d %B %Y` and `%B %d, %Y` never compete, but a purely numeric
//! day/month ambiguity is not detected. Keep the order stable; datasets built
//! with it depend on it.

use super::cascade::{Cascade, Hit, Strategy};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// The winning date and the rank of the strategy that produced it.
pub type DateCandidate = Hit<NaiveDate>;

/// `(attribute, value)` pairs probed in order by the meta-tag strategy.
pub const META_DATE_TAGS: [(&str, &str); 15] = [
    ("property", "article:published_time"),
    ("property", "og:published_time"),
    ("property", "article:modified_time"),
    ("property", "og:updated_time"),
    ("name", "dc.date.issued"),
    ("name", "dc.date"),
    ("name", "dcterms.created"),
    ("itemprop", "datePublished"),
    ("itemprop", "dateModified"),
    ("name", "date"),
    ("name", "pubdate"),
    ("name", "publishdate"),
    ("name", "publish-date"),
    ("name", "sailthru.date"),
    ("name", "parsely-pub-date"),
];

const TEXT_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%d %B %Y"];
const CLASS_TEXT_FORMATS: [&str; 3] = ["%B %d, %Y", "%d %B %Y", "%Y-%m-%d"];

static URL_DATE_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"/(\d{4})/(\d{1,2})/(\d{1,2})(?:/|$)").expect("valid regex"),
        Regex::new(r"(?i)/(\d{4})/(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)/(\d{1,2})(?:/|$)")
            .expect("valid regex"),
        Regex::new(r"(?i)-(\d{4})(\d{2})(\d{2})(?:\.[a-z]+)?/?$").expect("valid regex"),
    ]
});

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").expect("valid selector"));
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").expect("valid selector"));
static DATE_CLASSES: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"[class*="date"], [class*="time"], [class*="timestamp"], [class*="article-date"], [class*="published"], [class*="pubdate"]"#,
    )
    .expect("valid selector")
});

static STRATEGIES: &[(&str, Strategy<str, NaiveDate>)] = &[
    ("url", url_date),
    ("json_ld", structured_data_date),
    ("meta", meta_tag_date),
    ("time", time_element_date),
    ("class", class_name_date),
];

/// Infer the publication date of `document` fetched from `url`.
///
/// `None` means the article is undateable.
pub fn infer_date(document: &Html, url: &str) -> Option<DateCandidate> {
    let candidate = Cascade::new(STRATEGIES).run(document, url);
    match &candidate {
        Some(hit) => debug!(%url, date = %hit.value, strategy = hit.strategy, "Inferred publication date"),
        None => debug!(%url, "No date signal found"),
    }
    candidate
}

fn url_date(_: &Html, url: &str) -> Option<NaiveDate> {
    date_from_url(url)
}

/// Extract a date embedded in a URL path.
///
/// Matches that do not form a valid calendar date are skipped and the search
/// continues with the next match or pattern.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    URL_DATE_PATTERNS.iter().find_map(|pattern| {
        let mut start = 0;
        while let Some(caps) = pattern.captures_at(&path, start) {
            let whole = caps.get(0)?;
            let year = caps[1].parse::<i32>().ok();
            let month = month_number(&caps[2]);
            let day = caps[3].parse::<u32>().ok();
            if let (Some(y), Some(m), Some(d)) = (year, month, day) {
                if let Some(date) = valid_date(y, m, d) {
                    return Some(date);
                }
            }
            start = whole.start() + 1;
        }
        None
    })
}

fn month_number(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = raw.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .map(|i| i as u32 + 1)
}

fn valid_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1900..=2100).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn structured_data_date(document: &Html, url: &str) -> Option<NaiveDate> {
    document.select(&LD_JSON).find_map(|script| {
        let raw = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(value) => value,
            Err(e) => {
                debug!(%url, error = %e, "Skipping malformed JSON-LD block");
                return None;
            }
        };
        let root = match &value {
            Value::Array(items) => items.first()?,
            other => other,
        };
        parse_iso_date(date_published(root)?)
    })
}

/// Locate `datePublished` on the root object, a nested article object, or the
/// first `@graph` entry that carries it.
fn date_published(root: &Value) -> Option<&str> {
    if let Some(date) = root.get("datePublished").and_then(Value::as_str) {
        return Some(date);
    }

    if let Some(object) = root.as_object() {
        let nested = ["mainEntityOfPage", "mainEntity"]
            .iter()
            .filter_map(|key| object.get(*key))
            .chain(object.values().filter(|v| is_article_node(v)))
            .find_map(|node| node.get("datePublished").and_then(Value::as_str));
        if nested.is_some() {
            return nested;
        }
    }

    root.get("@graph")?
        .as_array()?
        .iter()
        .find_map(|node| node.get("datePublished").and_then(Value::as_str))
}

fn is_article_node(value: &Value) -> bool {
    let names_article = |t: &Value| t.as_str().is_some_and(|s| s.ends_with("Article"));
    match value.get("@type") {
        Some(Value::Array(types)) => types.iter().any(names_article),
        Some(t) => names_article(t),
        None => false,
    }
}

fn meta_tag_date(document: &Html, _: &str) -> Option<NaiveDate> {
    let metas: Vec<ElementRef> = document.select(&META).collect();
    META_DATE_TAGS.iter().find_map(|(attr, expected)| {
        metas
            .iter()
            .filter(|meta| {
                meta.value()
                    .attr(attr)
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
            })
            .filter_map(|meta| meta.value().attr("content"))
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .find_map(parse_date_value)
    })
}

fn time_element_date(document: &Html, _: &str) -> Option<NaiveDate> {
    document.select(&TIME).find_map(|time| {
        let value = time.value();
        value
            .attr("datetime")
            .or_else(|| value.attr("content"))
            .and_then(parse_date_value)
    })
}

fn class_name_date(document: &Html, _: &str) -> Option<NaiveDate> {
    document.select(&DATE_CLASSES).find_map(|element| {
        let text = super::element_text(&element);
        parse_with_formats(&text, &CLASS_TEXT_FORMATS)
    })
}

/// Parse an ISO-8601-like timestamp and keep only its calendar date.
///
/// The date is the one written in the string; offsets are not converted, so
/// `2024-03-07T23:30:00Z` and `2024-03-07T23:30:00` both give 2024-03-07.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%dT%H:%M%:z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.date_naive());
        }
    }

    let naive = s.strip_suffix(|c| c == 'Z' || c == 'z').unwrap_or(s);
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d").ok()
}

/// ISO-8601 first, then the textual format list.
pub fn parse_date_value(raw: &str) -> Option<NaiveDate> {
    parse_iso_date(raw).or_else(|| parse_with_formats(raw, &TEXT_FORMATS))
}

fn parse_with_formats(raw: &str, formats: &[&str]) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
