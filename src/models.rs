//! Data models for extracted articles.
//!
//! [`Article`] is the unit of output: one row of the persisted dataset. Field
//! declaration order is the CSV column order (`title, author, content, source,
//! url, date`), so do not reorder fields without migrating existing datasets.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Author sentinel used when no byline could be found.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Title sentinel used when no headline could be found.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// A normalized article record.
///
/// The `url` is the record's identity: two records with the same `url` are the
/// same logical article regardless of what was fetched. A record is only ever
/// built with a resolved `date`; undateable pages never become an `Article`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline, or [`UNKNOWN_TITLE`].
    #[serde(default)]
    pub title: String,
    /// Comma-joined author names, or [`UNKNOWN_AUTHOR`].
    #[serde(default)]
    pub author: String,
    /// Paragraph text joined by blank lines.
    #[serde(default)]
    pub content: String,
    /// Logical source name from the configuration.
    #[serde(default)]
    pub source: String,
    /// Canonical article URL; the deduplication key.
    pub url: String,
    /// Publication date, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
}
