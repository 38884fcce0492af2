//! Data models shared across the relay pipeline.
//!
//! - [`CandidateLink`]: the URL believed to be the newest article on an index page
//! - [`Article`]: an extracted article, alive for one pipeline pass only
//! - [`FormattedMessage`]: the final channel-ready text
//! - [`SourceOutcome`] / [`RunSummary`]: what happened to each source in a run
//!
//! Only an article's `url` is ever persisted (as the dedup key).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when no title strategy produced anything.
pub const UNTITLED: &str = "Untitled";

/// A link discovered on an index page.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLink {
    /// Absolute article URL, the identity used for deduplication.
    pub absolute_url: String,
    /// Name of the selector-chain strategy that produced the link.
    pub discovered_via: String,
}

/// Resolved article title.
///
/// `Missing` renders as [`UNTITLED`] but stays distinguishable from a page
/// that literally titles itself "Untitled".
#[derive(Debug, Clone, PartialEq)]
pub enum Title {
    Found(String),
    Missing,
}

impl Title {
    pub fn text(&self) -> &str {
        match self {
            Title::Found(t) => t,
            Title::Missing => UNTITLED,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Title::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Heading,
    Paragraph,
}

/// One text block of an article body, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    pub fn heading(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Heading,
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Paragraph,
            text: text.into(),
        }
    }
}

/// An extracted article.
#[derive(Debug, Clone)]
pub struct Article {
    pub source_key: String,
    pub url: String,
    pub title: Title,
    pub body_segments: Vec<Segment>,
    pub extracted_at: DateTime<Utc>,
}

impl Article {
    /// Body text with a blank line between blocks.
    pub fn body_text(&self) -> String {
        self.body_segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Channel-ready message text plus the article it points to.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedMessage {
    pub text: String,
    pub target_url: String,
    /// True when the body had to be cut to fit the channel limit.
    pub truncated: bool,
}

/// Result of processing a single source during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Delivered { url: String },
    NoArticleFound,
    Unchanged { url: String },
    ExtractionMiss { url: String },
    FetchFailed { reason: String },
    DeliveryFailed { url: String },
}

impl SourceOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SourceOutcome::Delivered { .. })
    }
}

/// Aggregate of one relay run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of newly delivered articles; zero is a normal result.
    pub delivered: usize,
    pub outcomes: Vec<SourceReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl RunSummary {
    #[cfg(test)]
    pub fn outcome_for(&self, key: &str) -> Option<&SourceOutcome> {
        self.outcomes
            .iter()
            .find(|r| r.source == key)
            .map(|r| &r.outcome)
    }
}
