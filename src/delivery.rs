//! Message delivery.
//!
//! [`Channel`] is one send to the downstream channel. [`DeliveryClient`]
//! wraps a channel and never raises: failures are logged and reported as
//! `false`. Text over the channel limit is sent as several chunks, and the
//! delivery only counts if every chunk went through. Nothing is retried; the
//! next run retries naturally because dedup state was not advanced.

use crate::error::{PipelineError, Result};
use crate::filter::CHANNEL_MESSAGE_LIMIT;
use crate::models::FormattedMessage;
use crate::utils::{char_len, truncate_chars, truncate_for_log};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

/// A single send to the downstream channel.
pub trait Channel {
    /// Largest text accepted by one send, in characters.
    fn limit(&self) -> usize;

    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage` channel using HTML parse mode.
#[derive(Debug, Clone)]
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(api_url: &str, token: &str, chat_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }
}

impl Channel for TelegramChannel {
    fn limit(&self) -> usize {
        CHANNEL_MESSAGE_LIMIT
    }

    async fn send(&self, text: &str) -> Result<()> {
        let form = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ];
        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            // The endpoint embeds the bot token; keep it out of the message.
            .map_err(|e| PipelineError::Delivery(e.without_url().to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PipelineError::Delivery(format!(
                "status {status}: {}",
                truncate_for_log(&body, 300)
            )));
        }
        match serde_json::from_str::<TelegramResponse>(&body) {
            Ok(TelegramResponse { ok: false, description }) => Err(PipelineError::Delivery(
                description.unwrap_or_else(|| "channel rejected message".into()),
            )),
            _ => Ok(()),
        }
    }
}

/// Fail-soft wrapper around a [`Channel`].
#[derive(Debug)]
pub struct DeliveryClient<C> {
    channel: C,
}

impl<C: Channel> DeliveryClient<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    #[cfg(test)]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Send `message`; `true` only if every chunk was accepted.
    #[instrument(level = "info", skip_all, fields(url = %message.target_url))]
    pub async fn deliver(&self, message: &FormattedMessage) -> bool {
        let chunks = split_for_channel(&message.text, self.channel.limit());
        let total = chunks.len();
        if total > 1 {
            warn!(chunks = total, "Message exceeds channel limit; sending in parts");
        }
        for (i, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.channel.send(chunk).await {
                error!(chunk = i + 1, total, error = %e, "Delivery failed");
                return false;
            }
        }
        info!(chunks = total, "Message delivered");
        true
    }
}

/// Split `text` into pieces of at most `limit` characters, preferring line
/// breaks as cut points. Whitespace-only pieces are dropped; the channel
/// rejects empty messages.
pub fn split_for_channel(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while char_len(rest) > limit {
        let window = truncate_chars(rest, limit);
        let cut = match window.rfind('\n') {
            Some(idx) if idx > 0 => idx,
            _ => window.len(),
        };
        let chunk = rest[..cut].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = rest[cut..].trim_start_matches('\n');
    }
    if !rest.trim().is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Records sends; fails every send from `fail_from` (1-based) onward.
    pub struct FakeChannel {
        pub limit: usize,
        pub sent: RefCell<Vec<String>>,
        pub fail_from: Cell<Option<usize>>,
    }

    impl FakeChannel {
        pub fn new() -> Self {
            Self {
                limit: CHANNEL_MESSAGE_LIMIT,
                sent: RefCell::new(Vec::new()),
                fail_from: Cell::new(None),
            }
        }

        pub fn failing() -> Self {
            let channel = Self::new();
            channel.fail_from.set(Some(1));
            channel
        }
    }

    impl Channel for FakeChannel {
        fn limit(&self) -> usize {
            self.limit
        }

        async fn send(&self, text: &str) -> Result<()> {
            let attempt = self.sent.borrow().len() + 1;
            if matches!(self.fail_from.get(), Some(n) if attempt >= n) {
                return Err(PipelineError::Delivery("status 502 Bad Gateway".into()));
            }
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    fn message(text: &str) -> FormattedMessage {
        FormattedMessage {
            text: text.to_string(),
            target_url: "https://news.example/a/1".to_string(),
            truncated: false,
        }
    }

    #[tokio::test]
    async fn test_deliver_success() {
        let client = DeliveryClient::new(FakeChannel::new());
        assert!(client.deliver(&message("hello")).await);
        assert_eq!(*client.channel().sent.borrow(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_deliver_failure_is_false() {
        let client = DeliveryClient::new(FakeChannel::failing());
        assert!(!client.deliver(&message("hello")).await);
        assert!(client.channel().sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_mid_sequence_failure_fails_delivery() {
        let mut channel = FakeChannel::new();
        channel.limit = 10;
        channel.fail_from.set(Some(2));
        let client = DeliveryClient::new(channel);

        assert!(!client.deliver(&message("line one\nline two\nline three")).await);
        assert_eq!(client.channel().sent.borrow().len(), 1);
    }

    #[test]
    fn test_split_for_channel_prefers_line_breaks() {
        let chunks = split_for_channel("line one\nline two\nline three", 10);
        assert_eq!(chunks, vec!["line one", "line two", "line three"]);
        assert_eq!(split_for_channel("short", 10), vec!["short"]);
    }

    #[test]
    fn test_split_for_channel_hard_cuts_long_lines() {
        let chunks = split_for_channel(&"ğ".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| char_len(c) <= 10));
    }

    #[test]
    fn test_split_for_channel_never_yields_blank_chunks() {
        let text = format!(" \n{}", "x".repeat(20));
        let chunks = split_for_channel(&text, 10);
        assert_eq!(chunks, vec!["x".repeat(10), "x".repeat(10)]);
        assert!(split_for_channel(" \n \n ", 1).is_empty());
    }

    #[test]
    fn test_telegram_endpoint() {
        let channel = TelegramChannel::new("https://api.telegram.org/", "123:abc", "-100").unwrap();
        assert_eq!(channel.endpoint, "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(channel.limit(), 4096);
    }
}
