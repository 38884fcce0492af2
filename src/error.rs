//! Error taxonomy for the relay pipeline.
//!
//! Only [`PipelineError::Configuration`] is fatal, and only at startup. Every
//! other variant is caught at the per-source boundary in [`crate::pipeline`]
//! and turned into a [`crate::models::SourceOutcome`].
//!
//! An exhausted selector chain is not an error at all: extractors return
//! `Ok(None)` for it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Transport failure, timeout or non-success status while fetching a page.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("rewrite failed: {0}")]
    Rewrite(String),

    /// Missing credentials, unreadable source definitions, invalid selectors.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("state storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        PipelineError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
