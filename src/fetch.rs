//! Page transport.
//!
//! [`Fetch`] is the only way the scrapers reach the network, so tests can
//! serve fixed documents. [`HttpFetcher`] is the production implementation.

use crate::error::{PipelineError, Result};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Stable browser profile, so servers hand out the same markup every run.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7";

/// Fetch a document by URL.
pub trait Fetch {
    /// Return the raw body of `url`, or [`PipelineError::Fetch`] on transport
    /// failure, timeout or a non-success status.
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory pages keyed by URL; unknown URLs fail like a 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, String>,
        pub requested: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }
    }

    impl Fetch for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.requested.borrow_mut().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::fetch(url, "status 404 Not Found"))
        }
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(15)).is_ok());
    }

    #[tokio::test]
    async fn test_fake_fetcher_reports_missing_page_as_fetch_error() {
        let fetcher = FakeFetcher::default().with_page("https://news.example/", "<html></html>");
        assert!(fetcher.fetch("https://news.example/").await.is_ok());
        let err = fetcher.fetch("https://news.example/missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
        assert_eq!(fetcher.requested.borrow().len(), 2);
    }
}
