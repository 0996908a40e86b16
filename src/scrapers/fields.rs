//! Title, author and body extraction.
//!
//! Each field is found by a cascade: the source's configured selector first,
//! then generic fallbacks that work on most news markup. Tiers are never
//! merged; the first one that yields non-empty text is the answer.

use super::cascade::{Cascade, Strategy};
use super::element_text;
use crate::config::SourceRuleset;
use crate::models::{UNKNOWN_AUTHOR, UNKNOWN_TITLE};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// Paragraphs shorter than this are ignored by the last-resort body tier.
const MIN_LOOSE_PARAGRAPH_CHARS: usize = 100;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static AUTHOR_FALLBACKS: Lazy<[Selector; 2]> =
    Lazy::new(|| [selector(r#"a[rel="author"]"#), selector(r#"span[class*="author"]"#)]);
static AUTHOR_META: Lazy<Selector> = Lazy::new(|| selector(r#"meta[name="author"]"#));
static ARTICLE_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("article p"));
static SCOPED_PARAGRAPHS: Lazy<[Selector; 2]> = Lazy::new(|| {
    [
        selector(r#"div[class*="article"] p"#),
        selector(r#"div[class*="content"] p"#),
    ]
});
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("p"));

/// Text fields extracted from one article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: String,
    pub author: String,
    pub content: String,
}

/// Extract title, author and body using `ruleset` with generic fallbacks.
pub fn extract_fields(document: &Html, ruleset: &SourceRuleset) -> ExtractedFields {
    ExtractedFields {
        title: extract_title(document, ruleset),
        author: extract_author(document, ruleset),
        content: extract_content(document, ruleset),
    }
}

static TITLE_STRATEGIES: &[(&str, Strategy<SourceRuleset, String>)] = &[
    ("ruleset", ruleset_title),
    ("h1", first_heading),
    ("title", title_element),
];

static AUTHOR_STRATEGIES: &[(&str, Strategy<SourceRuleset, String>)] = &[
    ("ruleset", ruleset_author),
    ("byline", byline_author),
    ("meta", meta_author),
];

static CONTENT_STRATEGIES: &[(&str, Strategy<SourceRuleset, String>)] = &[
    ("ruleset", ruleset_content),
    ("article", article_content),
    ("scoped", scoped_content),
    ("loose", loose_paragraphs),
];

pub fn extract_title(document: &Html, ruleset: &SourceRuleset) -> String {
    Cascade::new(TITLE_STRATEGIES)
        .run(document, ruleset)
        .map(|hit| hit.value)
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

pub fn extract_author(document: &Html, ruleset: &SourceRuleset) -> String {
    Cascade::new(AUTHOR_STRATEGIES)
        .run(document, ruleset)
        .map(|hit| hit.value)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

pub fn extract_content(document: &Html, ruleset: &SourceRuleset) -> String {
    Cascade::new(CONTENT_STRATEGIES)
        .run(document, ruleset)
        .map(|hit| hit.value)
        .unwrap_or_default()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| element_text(&el))
        .find(|text| !text.is_empty())
}

fn non_empty(texts: Vec<String>, separator: &str) -> Option<String> {
    let joined = texts
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator);
    (!joined.is_empty()).then_some(joined)
}

fn all_texts<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
    elements.map(|el| element_text(&el)).collect()
}

fn ruleset_title(document: &Html, ruleset: &SourceRuleset) -> Option<String> {
    first_text(document, ruleset.title_selector.as_ref()?)
}

fn first_heading(document: &Html, _: &SourceRuleset) -> Option<String> {
    first_text(document, &H1)
}

fn title_element(document: &Html, _: &SourceRuleset) -> Option<String> {
    first_text(document, &TITLE)
}

fn ruleset_author(document: &Html, ruleset: &SourceRuleset) -> Option<String> {
    let selector = ruleset.author_selector.as_ref()?;
    non_empty(all_texts(document.select(selector)), ", ")
}

fn byline_author(document: &Html, _: &SourceRuleset) -> Option<String> {
    AUTHOR_FALLBACKS
        .iter()
        .find_map(|selector| non_empty(all_texts(document.select(selector)), ", "))
}

fn meta_author(document: &Html, _: &SourceRuleset) -> Option<String> {
    document
        .select(&AUTHOR_META)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn ruleset_content(document: &Html, ruleset: &SourceRuleset) -> Option<String> {
    let selector = ruleset.content_selector.as_ref()?;
    non_empty(all_texts(document.select(selector)), "\n\n")
}

fn article_content(document: &Html, _: &SourceRuleset) -> Option<String> {
    non_empty(all_texts(document.select(&ARTICLE_PARAGRAPHS)), "\n\n")
}

fn scoped_content(document: &Html, _: &SourceRuleset) -> Option<String> {
    SCOPED_PARAGRAPHS
        .iter()
        .find_map(|selector| non_empty(all_texts(document.select(selector)), "\n\n"))
}

fn loose_paragraphs(document: &Html, _: &SourceRuleset) -> Option<String> {
    let paragraphs = document
        .select(&PARAGRAPHS)
        .filter(|p| !inside_page_chrome(p))
        .map(|p| element_text(&p))
        .filter(|text| text.chars().count() > MIN_LOOSE_PARAGRAPH_CHARS)
        .collect();
    non_empty(paragraphs, "\n\n")
}

fn inside_page_chrome(element: &ElementRef) -> bool {
    let mut node = element.parent();
    while let Some(current) = node {
        if let Some(el) = current.value().as_element() {
            if matches!(el.name(), "nav" | "footer" | "header") {
                return true;
            }
        }
        node = current.parent();
    }
    false
}
