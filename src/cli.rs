//! Command-line interface definitions for News Relay.
//!
//! All credentials can be provided via command-line flags or environment
//! variables. They are optional at the parser level so that a missing value
//! surfaces as a configuration error from [`crate::config::Settings`]
//! instead of a usage message.

use clap::Parser;

/// Command-line arguments for the News Relay application.
///
/// # Examples
///
/// ```sh
/// # Built-in source, credentials from the environment
/// TELEGRAM_TOKEN=... TELEGRAM_CHAT_ID=... news_relay
///
/// # Custom sources with rewriting enabled
/// news_relay --sources sources.yaml --rewrite --template news_rewriter
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Telegram chat id messages are delivered to
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    /// Base URL of the Telegram Bot API
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Path to a YAML file with source definitions (built-in source when absent)
    #[arg(short, long)]
    pub sources: Option<String>,

    /// Path of the JSON file holding the last delivered link per source
    #[arg(long, env = "NEWS_RELAY_STATE_FILE", default_value = "last_links.json")]
    pub state_file: String,

    /// Timeout for every page fetch, in seconds
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,

    /// Only process the sources with these keys
    #[arg(long = "only")]
    pub only: Vec<String>,

    /// Rewrite article bodies through the generation backend before delivery
    #[arg(long)]
    pub rewrite: bool,

    /// Optional path to the generation backend config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Chat template used for rewriting
    #[arg(long, default_value = "news_rewriter")]
    pub template: String,

    /// Largest body slice sent to the generation backend in one call, in characters
    #[arg(long, default_value_t = 3000)]
    pub chunk_chars: usize,

    /// Run a final pass that arranges the rewrite into lead, body and closing
    #[arg(long)]
    pub structure: bool,

    /// Text of the trailing link to the original article
    #[arg(long, default_value = "Source")]
    pub source_label: String,

    /// Directory for JSON run reports
    #[arg(long)]
    pub summary_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["news_relay"]);

        assert_eq!(cli.state_file, "last_links.json");
        assert_eq!(cli.timeout_secs, 15);
        assert_eq!(cli.template, "news_rewriter");
        assert_eq!(cli.chunk_chars, 3000);
        assert!(!cli.rewrite);
        assert!(cli.only.is_empty());
    }

    #[test]
    fn test_cli_repeated_only_and_rewrite_flags() {
        let cli = Cli::parse_from([
            "news_relay",
            "-s",
            "/etc/news/sources.yaml",
            "--only",
            "a",
            "--only",
            "b",
            "--rewrite",
            "--structure",
        ]);

        assert_eq!(cli.sources.as_deref(), Some("/etc/news/sources.yaml"));
        assert_eq!(cli.only, vec!["a", "b"]);
        assert!(cli.rewrite);
        assert!(cli.structure);
    }
}
