//! Page fetching with bounded waits and retry with exponential backoff.
//!
//! # Architecture
//!
//! - [`PageFetcher`]: core trait for downloading a page as text
//! - [`HttpFetcher`]: `reqwest` implementation with a per-request timeout
//! - [`RetryFetch`]: decorator that retries transient failures of any
//!   [`PageFetcher`]
//!
//! # Retry Strategy
//!
//! Only transient failures (timeouts, connection errors, 5xx) are retried.
//! Delays grow as `base_delay * 2^(attempt-1)`, capped at 30 seconds, plus
//! 0-250ms of random jitter. A fetch that still fails is reported to the
//! caller, which treats it as "no data" for that page.

use crate::error::ScrapeError;
use rand::{Rng, rng};
use reqwest::header::HeaderMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Something that can download a page and return its body as text.
pub trait PageFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<String, ScrapeError>;
}

/// Plain HTTP fetcher. Every request is bounded by the client timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<String, ScrapeError> {
        let t0 = Instant::now();
        let parsed = Url::parse(url)?;
        let response = self
            .client
            .get(parsed)
            .headers(headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`PageFetcher`].
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: PageFetcher> RetryFetch<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1 << shift)
            .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: PageFetcher> PageFetcher for RetryFetch<T> {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<String, ScrapeError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url, headers).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt > self.max_retries {
                        if e.is_transient() {
                            error!(
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                                error = %e,
                                "fetch exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given status a fixed number of times, then succeeds.
    struct Flaky {
        failures: usize,
        status: reqwest::StatusCode,
        calls: AtomicUsize,
    }

    impl PageFetcher for Flaky {
        async fn fetch(&self, url: &str, _: &HeaderMap) -> Result<String, ScrapeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ScrapeError::Status {
                    url: url.to_string(),
                    status: self.status,
                })
            } else {
                Ok("<html></html>".to_string())
            }
        }
    }

    fn flaky(failures: usize, status: reqwest::StatusCode) -> Flaky {
        Flaky {
            failures,
            status,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let fetcher = RetryFetch::new(
            flaky(2, reqwest::StatusCode::SERVICE_UNAVAILABLE),
            3,
            Duration::from_millis(1),
        );
        let body = fetcher.fetch("https://example.com", &HeaderMap::new()).await;
        assert!(body.is_ok());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let fetcher = RetryFetch::new(
            flaky(10, reqwest::StatusCode::BAD_GATEWAY),
            2,
            Duration::from_millis(1),
        );
        let result = fetcher.fetch("https://example.com", &HeaderMap::new()).await;
        assert!(result.is_err());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let fetcher = RetryFetch::new(
            flaky(1, reqwest::StatusCode::NOT_FOUND),
            5,
            Duration::from_millis(1),
        );
        assert!(fetcher.fetch("https://example.com", &HeaderMap::new()).await.is_err());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let fetcher = RetryFetch::new(
            flaky(0, reqwest::StatusCode::OK),
            50,
            Duration::from_secs(1),
        );
        assert!(fetcher.backoff(1) < Duration::from_millis(1_251));
        assert!(fetcher.backoff(40) <= Duration::from_millis(30_250));
    }

    #[tokio::test]
    async fn test_http_fetcher_status_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/page")
            .match_header("user-agent", "Mozilla/5.0")
            .with_status(200)
            .with_body("<p>hello</p>")
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Mozilla/5.0"),
        );
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let body = fetcher
            .fetch(&format!("{}/page", server.url()), &headers)
            .await
            .unwrap();
        assert_eq!(body, "<p>hello</p>");

        let err = fetcher
            .fetch(&format!("{}/gone", server.url()), &headers)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Status { .. }));

        let err = fetcher.fetch("not a url", &headers).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Url(_)));
        assert!(!err.is_transient());

        ok.assert_async().await;
        missing.assert_async().await;
    }
}
