//! # News Relay
//!
//! Watches the index pages of news sites, extracts the newest article of each
//! and relays it to a Telegram channel exactly once per article.
//!
//! ## Features
//!
//! - Config-driven sources: index URL, link pattern and CSS selector chains
//!   per site, with a built-in default source
//! - Ordered fallback extraction for links, titles and bodies
//! - Noise and boilerplate filtering of article paragraphs
//! - Optional rewriting through an OpenAI-compatible LLM
//! - Channel-safe HTML formatting within the 4096 character message limit
//! - Per-source dedup state persisted after every successful delivery
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_TOKEN=... TELEGRAM_CHAT_ID=... news_relay --sources sources.yaml
//! ```
//!
//! ## Architecture
//!
//! Each run processes the configured sources one after another:
//! 1. **Locating**: Find the newest article link on the index page
//! 2. **Dedup**: Skip the source if that link was already delivered
//! 3. **Extraction**: Fetch the article, pick title and body blocks
//! 4. **Rewrite** (optional): Rephrase the body through the LLM
//! 5. **Delivery**: Format, send, then record the link as delivered

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod dedup;
mod delivery;
mod error;
mod fetch;
mod filter;
mod models;
mod outputs;
mod pipeline;
mod rewrite;
mod scrapers;
mod selectors;
mod utils;

use api::{AskFnWrapper, load_backend};
use cli::Cli;
use config::Settings;
use dedup::DedupStore;
use delivery::{DeliveryClient, TelegramChannel};
use fetch::HttpFetcher;
use filter::MessageOptions;
use outputs::json;
use pipeline::Pipeline;
use rewrite::{RewriteOptions, Rewriter};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_relay starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(sources = ?args.sources, state_file = %args.state_file, rewrite = args.rewrite, "Parsed CLI arguments");

    let settings = match Settings::from_cli(&args).await {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration; nothing was fetched");
            return Err(e.into());
        }
    };

    // ---- Load generation backend (only when rewriting) ----
    let backend = match &settings.rewrite {
        Some(rewrite) => match load_backend(rewrite.config_path.as_deref(), &rewrite.template).await {
            Ok(backend) => Some(backend),
            Err(e) => {
                error!(template = %rewrite.template, error = %e, "Failed to load generation backend");
                return Err(e);
            }
        },
        None => None,
    };

    // ---- Build pipeline ----
    let fetcher = HttpFetcher::new(settings.timeout)?;
    let channel = TelegramChannel::new(
        &settings.telegram_api_url,
        &settings.telegram_token,
        &settings.telegram_chat_id,
    )?;
    let store = DedupStore::load(&settings.state_file).await;
    let message = MessageOptions {
        source_label: settings.source_label.clone(),
        ..MessageOptions::default()
    };

    let mut pipeline: Pipeline<_, _, AskFnWrapper> = Pipeline::new(
        settings.sources,
        fetcher,
        DeliveryClient::new(channel),
        store,
        message,
    );
    if let (Some(rewrite), Some((config, template))) = (&settings.rewrite, &backend) {
        info!(template = %rewrite.template, chunk_chars = rewrite.chunk_chars, "Rewrite enabled");
        pipeline = pipeline.with_rewriter(Rewriter::new(
            AskFnWrapper { config, template },
            RewriteOptions {
                chunk_chars: rewrite.chunk_chars,
                structure: rewrite.structure,
            },
        ));
    }

    // ---- Run ----
    let summary = pipeline.run().await;
    for report in &summary.outcomes {
        info!(source = %report.source, outcome = ?report.outcome, "Source processed");
    }

    // ---- Run report ----
    if let Some(dir) = &settings.summary_dir {
        if let Err(e) = json::write_summary(&summary, dir).await {
            warn!(error = %e, "Failed to write run report");
        }
    }

    debug!(tracked_sources = pipeline.store().entries().len(), "Delivery history updated");

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        delivered = summary.delivered,
        sources = summary.outcomes.len(),
        "Execution complete"
    );

    Ok(())
}
