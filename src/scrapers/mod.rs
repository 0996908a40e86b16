//! Turning news pages into article records.
//!
//! Scraping is split into small, independently testable stages:
//!
//! | Stage | Module | Input → Output |
//! |-------|--------|----------------|
//! | Fetch | [`fetch`] | URL → HTML (timeout, retries) |
//! | Classify | [`links`] | listing page → candidate article URLs |
//! | Extract | [`fields`] | article page → title, author, body |
//! | Date | [`dates`] | article page + URL → publication date |
//! | Assemble | [`article`] | all of the above → [`Article`](crate::models::Article) |
//!
//! Every stage other than fetching is a pure function over a parsed
//! [`scraper::Html`] document. Heuristic stages are expressed as
//! [`cascade::Cascade`]s so the order in which fallbacks are tried is explicit
//! and fixed.

pub mod article;
pub mod cascade;
pub mod dates;
pub mod fetch;
pub mod fields;
pub mod links;

use scraper::ElementRef;

/// Visible text of an element with whitespace runs collapsed and trimmed.
pub(crate) fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn test_element_text_collapses_whitespace() {
        let doc = Html::parse_fragment("<p>  Hello,\n   <b>wor</b>ld!  </p>");
        let p = doc.select(&Selector::parse("p").unwrap()).next().unwrap();
        assert_eq!(element_text(&p), "Hello, world!");
    }
}
