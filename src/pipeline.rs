//! Per-source scraping orchestration.
//!
//! Each source moves through
//! `Idle → Classifying → Fetching → Assembling → (Checkpointing)* → Done`,
//! ending in `Failed` if its listing page cannot be fetched or `Cancelled` if
//! the run is cancelled. A failed source never stops the others.
//!
//! Within a source, articles are fetched one at a time and every request to the
//! source (listing page included) goes through that source's own rate limiter.
//! Sources may run concurrently (`max_concurrent_sources`); the only state
//! they share is the [`SharedStore`].
//!
//! Records are checkpointed into the store every `save_interval` assembled
//! articles. Whatever is still pending when a source finishes (or is
//! cancelled) is merged and flushed once at the end of the run.

use crate::config::{Settings, SourceRuleset};
use crate::models::Article;
use crate::scrapers::article::{Assembly, extract_article};
use crate::scrapers::fetch::{HttpFetcher, PageFetcher, RetryFetch};
use crate::scrapers::links::{ClassifierRegistry, classify_listing};
use crate::storage::{ArticleStore, SharedStore};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

/// Delay before the first retry of a transient fetch failure.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Lifecycle of one source within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Classifying,
    Fetching,
    Assembling,
    Checkpointing,
    Done,
    Failed(String),
    Cancelled,
}

impl SourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SourceState::Done | SourceState::Failed(_) | SourceState::Cancelled
        )
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Idle => write!(f, "idle"),
            SourceState::Classifying => write!(f, "classifying"),
            SourceState::Fetching => write!(f, "fetching"),
            SourceState::Assembling => write!(f, "assembling"),
            SourceState::Checkpointing => write!(f, "checkpointing"),
            SourceState::Done => write!(f, "done"),
            SourceState::Failed(reason) => write!(f, "failed: {reason}"),
            SourceState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happened to one source.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub state: SourceState,
    /// Candidate article URLs after classification.
    pub urls: usize,
    /// URLs skipped because the store already has them.
    pub known: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub assembled: usize,
    pub undateable: usize,
    pub before_cutoff: usize,
    /// New records persisted by mid-run checkpoints.
    pub checkpointed: usize,
}

impl SourceReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            state: SourceState::Idle,
            urls: 0,
            known: 0,
            fetched: 0,
            fetch_failures: 0,
            assembled: 0,
            undateable: 0,
            before_cutoff: 0,
            checkpointed: 0,
        }
    }

    fn transition(&mut self, next: SourceState) {
        if self.state != next {
            debug!(source = %self.source, from = %self.state, to = %next, "Source state change");
            self.state = next;
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// One report per source, in configuration order.
    pub sources: Vec<SourceReport>,
    /// Records added to the dataset during this run.
    pub new_articles: usize,
    /// Records in the dataset after the run.
    pub total_articles: usize,
}

/// Drives every configured source through classification, fetching,
/// assembly and persistence.
pub struct Pipeline<F> {
    fetcher: F,
    store: SharedStore,
    settings: Settings,
    registry: ClassifierRegistry,
    cancel: CancellationToken,
    span: Span,
}

impl<F: PageFetcher> Pipeline<F> {
    pub fn new(fetcher: F, store: SharedStore, settings: Settings, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            store,
            settings,
            registry: ClassifierRegistry::default(),
            cancel,
            span: info_span!("pipeline"),
        }
    }

    /// Parent span for everything this pipeline logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run every source and flush whatever is left at the end.
    pub async fn run(&self, sources: &IndexMap<String, SourceRuleset>) -> RunSummary {
        let span = self.span.clone();
        async move {
            let started = Instant::now();
            let concurrency = self.settings.max_concurrent_sources.max(1);
            info!(sources = sources.len(), concurrency, "Starting scrape run");

            let results: Vec<(SourceReport, Vec<Article>)> = stream::iter(sources.values())
                .map(|ruleset| {
                    let span = info_span!(parent: &self.span, "source", source = %ruleset.name);
                    self.run_source(ruleset).instrument(span)
                })
                .buffered(concurrency)
                .collect()
                .await;

            let mut reports = Vec::with_capacity(results.len());
            let mut leftovers = Vec::new();
            for (report, pending) in results {
                leftovers.extend(pending);
                reports.push(report);
            }

            let mut store = self.store.lock().await;
            let final_added = store.checkpoint(leftovers).await;
            let new_articles =
                final_added + reports.iter().map(|r| r.checkpointed).sum::<usize>();

            let elapsed = started.elapsed();
            info!(
                new_articles,
                total = store.len(),
                path = %store.path().display(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Scraping completed"
            );

            RunSummary {
                sources: reports,
                new_articles,
                total_articles: store.len(),
            }
        }
        .instrument(span)
        .await
    }

    async fn run_source(&self, ruleset: &SourceRuleset) -> (SourceReport, Vec<Article>) {
        let mut report = SourceReport::new(&ruleset.name);
        let mut pending: Vec<Article> = Vec::new();
        let limiter = rate_limiter(self.settings.request_delay);
        let cap = ruleset.max_articles.or(self.settings.max_articles_per_source);
        let save_interval = self.settings.save_interval;

        if self.cancel.is_cancelled() {
            report.transition(SourceState::Cancelled);
            return (report, pending);
        }

        info!(url = %ruleset.listing_url, cap = ?cap, "Processing source");
        report.transition(SourceState::Classifying);
        wait_turn(limiter.as_ref()).await;
        let listing = match self
            .fetcher
            .fetch(ruleset.listing_url.as_str(), &ruleset.headers)
            .await
        {
            Ok(html) => html,
            Err(e) => {
                error!(url = %ruleset.listing_url, error = %e, "Error getting article URLs");
                report.transition(SourceState::Failed(e.to_string()));
                return (report, pending);
            }
        };
        let urls = classify_listing(&listing, ruleset, &self.registry, cap);
        report.urls = urls.len();

        for url in urls {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested; stopping source");
                report.transition(SourceState::Cancelled);
                break;
            }
            if self.store.lock().await.contains(&url) {
                debug!(%url, "Article already stored; skipping");
                report.known += 1;
                continue;
            }

            report.transition(SourceState::Fetching);
            wait_turn(limiter.as_ref()).await;
            let html = match self.fetcher.fetch(&url, &ruleset.headers).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(%url, error = %e, "Error extracting article");
                    report.fetch_failures += 1;
                    continue;
                }
            };
            report.fetched += 1;

            report.transition(SourceState::Assembling);
            match extract_article(&url, &html, ruleset, self.settings.start_date) {
                Assembly::Article(article) => {
                    info!(title = %article.title, date = %article.date, "Extracted article");
                    debug!(preview = %truncate_for_log(&article.content, 200), "Article content");
                    pending.push(article);
                    report.assembled += 1;
                }
                Assembly::Undateable => report.undateable += 1,
                Assembly::BeforeCutoff { .. } => report.before_cutoff += 1,
            }

            if save_interval > 0 && pending.len() >= save_interval {
                report.transition(SourceState::Checkpointing);
                let batch = std::mem::take(&mut pending);
                let added = self.store.lock().await.checkpoint(batch).await;
                info!(added, "Checkpoint save");
                report.checkpointed += added;
            }

            if cap.is_some_and(|cap| report.assembled >= cap) {
                info!(cap = ?cap, "Reached maximum limit of articles");
                break;
            }
        }

        if !report.state.is_terminal() {
            report.transition(SourceState::Done);
        }
        info!(
            state = %report.state,
            assembled = report.assembled,
            fetched = report.fetched,
            known = report.known,
            "Completed scraping source"
        );
        (report, pending)
    }
}

fn rate_limiter(delay: Duration) -> Option<DefaultDirectRateLimiter> {
    Quota::with_period(delay).map(RateLimiter::direct)
}

async fn wait_turn(limiter: Option<&DefaultDirectRateLimiter>) {
    if let Some(limiter) = limiter {
        limiter.until_ready().await;
    }
}

/// Load the dataset, scrape every source, and persist the result.
///
/// Returns the process exit code: 0 when the run completes (even with nothing
/// new), 1 when no valid sources are configured, the existing dataset cannot
/// be read, or no HTTP client can be built.
pub async fn run_pipeline(
    sources: IndexMap<String, SourceRuleset>,
    settings: Settings,
    cancel: CancellationToken,
) -> i32 {
    if sources.is_empty() {
        error!("No valid sources found in configuration");
        return 1;
    }

    let store = match ArticleStore::load(&settings.output_csv).await {
        Ok(store) => store,
        Err(e) => {
            error!(
                path = %settings.output_csv.display(),
                error = %e,
                "Error loading existing articles; refusing to overwrite them"
            );
            return 1;
        }
    };

    let fetcher = match HttpFetcher::new(settings.request_timeout) {
        Ok(fetcher) => RetryFetch::new(fetcher, settings.max_retries, RETRY_BASE_DELAY),
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return 1;
        }
    };

    let span = info_span!("pipeline", output = %settings.output_csv.display());
    let pipeline =
        Pipeline::new(fetcher, Arc::new(Mutex::new(store)), settings, cancel).with_span(span);
    let summary = pipeline.run(&sources).await;
    for report in &summary.sources {
        info!(
            source = %report.source,
            state = %report.state,
            urls = report.urls,
            known = report.known,
            fetched = report.fetched,
            fetch_failures = report.fetch_failures,
            assembled = report.assembled,
            undateable = report.undateable,
            before_cutoff = report.before_cutoff,
            "Source summary"
        );
    }
    info!(
        new_articles = summary.new_articles,
        total_articles = summary.total_articles,
        "Run summary"
    );
    0
}
