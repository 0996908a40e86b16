//! Assembling article records.
//!
//! Combines a classified URL, the extracted text fields and the inferred date
//! into an [`Article`], then applies the optional start-date cutoff. Pages with
//! no inferable date, and pages dated before the cutoff, produce no record.

use super::dates::{DateCandidate, infer_date};
use super::fields::{ExtractedFields, extract_fields};
use crate::config::SourceRuleset;
use crate::models::Article;
use chrono::NaiveDate;
use scraper::Html;
use tracing::{debug, info};

/// Result of assembling one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    Article(Article),
    /// No date strategy succeeded; the page is dropped.
    Undateable,
    /// The page is dated strictly before the configured start date.
    BeforeCutoff { date: NaiveDate, start_date: NaiveDate },
}

#[cfg(test)]
impl Assembly {
    pub fn into_article(self) -> Option<Article> {
        match self {
            Assembly::Article(article) => Some(article),
            _ => None,
        }
    }
}

/// Build a record from already-extracted parts.
pub fn assemble(
    url: &str,
    source: &str,
    fields: ExtractedFields,
    date: Option<DateCandidate>,
    start_date: Option<NaiveDate>,
) -> Assembly {
    let Some(candidate) = date else {
        info!(%url, "Skipping undateable article");
        return Assembly::Undateable;
    };
    let date = candidate.value;

    if let Some(start_date) = start_date {
        if date < start_date {
            info!(%url, %date, %start_date, "Skipping article from before start date");
            return Assembly::BeforeCutoff { date, start_date };
        }
    }

    debug!(%url, %date, strategy = candidate.strategy, "Assembled article");
    Assembly::Article(Article {
        title: fields.title,
        author: fields.author,
        content: fields.content,
        source: source.to_string(),
        url: url.to_string(),
        date,
    })
}

/// Parse an article page and run extraction, date inference and assembly.
pub fn extract_article(
    url: &str,
    html: &str,
    ruleset: &SourceRuleset,
    start_date: Option<NaiveDate>,
) -> Assembly {
    let document = Html::parse_document(html);
    let fields = extract_fields(&document, ruleset);
    let date = infer_date(&document, url);
    assemble(url, &ruleset.name, fields, date, start_date)
}
