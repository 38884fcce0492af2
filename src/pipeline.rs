//! Run orchestration.
//!
//! Each configured source goes through the same steps, one source at a time:
//!
//! 1. fetch the index page and locate the newest article link
//! 2. skip the source when that link is the last one delivered for it
//! 3. fetch the article and extract title and body
//! 4. optionally rewrite the body
//! 5. format a channel-safe message and deliver it
//! 6. record the link as delivered, only after the channel accepted it
//!
//! Every source is its own error boundary. A failure is logged, reported in
//! the [`RunSummary`] and the run moves on to the next source.

use crate::api::AskAsync;
use crate::config::Source;
use crate::dedup::DedupStore;
use crate::delivery::{Channel, DeliveryClient};
use crate::fetch::Fetch;
use crate::filter::{MessageOptions, format_message, render_segments, sanitize};
use crate::models::{Article, RunSummary, SourceOutcome, SourceReport};
use crate::rewrite::{RewriteOutcome, Rewriter};
use crate::scrapers::{article::fetch_article, index::find_latest_article};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

/// Stateless stages shared by every source.
struct Stages<F, C, A> {
    fetcher: F,
    delivery: DeliveryClient<C>,
    rewriter: Option<Rewriter<A>>,
    message: MessageOptions,
}

pub struct Pipeline<F, C, A> {
    sources: Vec<Source>,
    stages: Stages<F, C, A>,
    store: DedupStore,
}

impl<F, C, A> Pipeline<F, C, A>
where
    F: Fetch,
    C: Channel,
    A: AskAsync<Response = String>,
{
    pub fn new(
        sources: Vec<Source>,
        fetcher: F,
        delivery: DeliveryClient<C>,
        store: DedupStore,
        message: MessageOptions,
    ) -> Self {
        Self {
            sources,
            stages: Stages {
                fetcher,
                delivery,
                rewriter: None,
                message,
            },
            store,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Rewriter<A>) -> Self {
        self.stages.rewriter = Some(rewriter);
        self
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Process every source once. Never fails; per-source problems end up in
    /// the returned summary.
    #[instrument(level = "info", skip_all, fields(sources = self.sources.len()))]
    pub async fn run(&mut self) -> RunSummary {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let outcome = self.stages.relay(source, &mut self.store).await;
            outcomes.push(SourceReport {
                source: source.key.clone(),
                outcome,
            });
        }

        let delivered = outcomes.iter().filter(|r| r.outcome.is_delivered()).count();
        info!(delivered, "Run finished");
        RunSummary {
            started_at,
            finished_at: Utc::now(),
            delivered,
            outcomes,
        }
    }
}

impl<F, C, A> Stages<F, C, A>
where
    F: Fetch,
    C: Channel,
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(source = %source.key))]
    async fn relay(&self, source: &Source, store: &mut DedupStore) -> SourceOutcome {
        let link = match find_latest_article(&self.fetcher, source).await {
            Ok(Some(link)) => link,
            Ok(None) => return SourceOutcome::NoArticleFound,
            Err(e) => {
                error!(error = %e, "Index page fetch failed");
                return SourceOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };
        let url = link.absolute_url;

        if store.last_delivered(&source.key) == Some(url.as_str()) {
            info!(%url, "Latest article already delivered");
            return SourceOutcome::Unchanged { url };
        }

        let article = match fetch_article(&self.fetcher, source, &url).await {
            Ok(Some(article)) => article,
            Ok(None) => return SourceOutcome::ExtractionMiss { url },
            Err(e) => {
                error!(error = %e, "Article fetch failed");
                return SourceOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        debug!(
            source_key = %article.source_key,
            extracted_at = %article.extracted_at,
            segments = article.body_segments.len(),
            "Article extracted"
        );
        let body = self.render_body(&article, source).await;
        let message = format_message(article.title.text(), &body, &article.url, &self.message);
        if message.truncated {
            warn!(limit = self.message.limit, "Message truncated to fit the channel");
        }

        if !self.delivery.deliver(&message).await {
            return SourceOutcome::DeliveryFailed { url };
        }
        if let Err(e) = store.mark_delivered(&source.key, &url).await {
            // Delivered already; the worst case is one repeat next run.
            error!(error = %e, "Failed to record delivery");
        }
        SourceOutcome::Delivered { url }
    }

    /// Channel-safe body markup, rewritten when a backend is configured.
    async fn render_body(&self, article: &Article, source: &Source) -> String {
        let Some(rewriter) = &self.rewriter else {
            return render_segments(&article.body_segments);
        };
        let outcome = rewriter
            .rewrite(&article.body_text(), article.title.text(), &source.keywords)
            .await;
        if outcome.is_rewritten() {
            return sanitize(outcome.text());
        }
        // Echoed or failed: deliver exactly what a run without a backend would.
        match &outcome {
            RewriteOutcome::Fallback { reason, .. } => {
                debug!(%reason, "Delivering original text")
            }
            _ => debug!(chars = outcome.text().len(), "Delivering original text"),
        }
        render_segments(&article.body_segments)
    }
}
