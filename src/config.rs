//! Startup configuration: credentials, source definitions and run options.
//!
//! Everything here is validated before any network work happens. A problem is
//! reported as [`PipelineError::Configuration`], which `main` treats as fatal.
//!
//! # Source definitions
//!
//! Sources are read from a YAML file. Selector lists are tried in the order
//! given, so put precise markup first and loose fallbacks last:
//!
//! ```yaml
//! sources:
//!   - key: ajansspor-futbol
//!     index_url: https://ajansspor.com/kategori/16/futbol
//!     link_pattern: '^/haber/.+-\d+$'
//!     link_containers: ["div.card"]
//!     title_selectors: ["header.news-header"]
//!     body_containers: ["div.article-content article", "div.article-content"]
//!     blacklist: ["Bu haberi paylaş"]
//! ```

use crate::cli::Cli;
use crate::error::{PipelineError, Result};
use regex::{Regex, RegexBuilder};
use scraper::Selector;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Class-name markers of non-article blocks, matched case-insensitively.
pub const DEFAULT_NOISE_CLASS_PATTERN: &str =
    r"share|social|promo|related|cookie|subscri|banner|advert|newsletter|sponsor";

/// One source as written in the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub key: String,
    pub index_url: String,
    /// Scheme and host prefixed to relative links; derived from `index_url` when absent.
    #[serde(default)]
    pub origin: Option<String>,
    /// Regex matched against the path of candidate article links.
    #[serde(default)]
    pub link_pattern: Option<String>,
    #[serde(default = "default_link_containers")]
    pub link_containers: Vec<String>,
    #[serde(default = "default_title_selectors")]
    pub title_selectors: Vec<String>,
    #[serde(default = "default_body_containers")]
    pub body_containers: Vec<String>,
    #[serde(default)]
    pub noise_class_pattern: Option<String>,
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: Vec<SourceConfig>,
}

fn default_link_containers() -> Vec<String> {
    vec!["div.card".into(), "article".into()]
}

fn default_title_selectors() -> Vec<String> {
    vec!["header.news-header".into(), ".article-title".into()]
}

fn default_body_containers() -> Vec<String> {
    vec![
        "div.article-content article".into(),
        "div.article-content".into(),
        "article".into(),
        "main".into(),
    ]
}

fn default_blacklist() -> Vec<String> {
    vec![
        "Bu haberi paylaş".into(),
        "Tüm hakları saklıdır".into(),
        "Share this article".into(),
        "All rights reserved".into(),
    ]
}

/// The source the relay was first written for, used when no file is given.
pub fn builtin_sources() -> Vec<SourceConfig> {
    vec![SourceConfig {
        key: "ajansspor-futbol".into(),
        index_url: "https://ajansspor.com/kategori/16/futbol".into(),
        origin: Some("https://ajansspor.com".into()),
        link_pattern: Some(r"^/haber/.+".into()),
        link_containers: default_link_containers(),
        title_selectors: default_title_selectors(),
        body_containers: default_body_containers(),
        noise_class_pattern: None,
        blacklist: default_blacklist(),
        keywords: Vec::new(),
    }]
}

/// A CSS selector kept together with the text it was parsed from, which
/// doubles as the strategy name in logs.
#[derive(Debug, Clone)]
pub struct NamedSelector {
    pub raw: String,
    pub selector: Selector,
}

impl NamedSelector {
    pub fn parse(raw: &str) -> Result<Self> {
        let selector = Selector::parse(raw).map_err(|e| {
            PipelineError::Configuration(format!("invalid selector {raw:?}: {e:?}"))
        })?;
        Ok(Self {
            raw: raw.to_string(),
            selector,
        })
    }
}

/// A validated source, ready for the link locator and article extractor.
#[derive(Debug, Clone)]
pub struct Source {
    pub key: String,
    pub index_url: Url,
    pub origin: Url,
    pub link_pattern: Option<Regex>,
    pub link_containers: Vec<NamedSelector>,
    pub title_selectors: Vec<NamedSelector>,
    pub body_containers: Vec<NamedSelector>,
    pub noise_class: Regex,
    /// Lowercased boilerplate phrases.
    pub blacklist: Vec<String>,
    pub keywords: Vec<String>,
}

impl Source {
    pub fn compile(config: &SourceConfig) -> Result<Self> {
        let key = config.key.trim();
        if key.is_empty() {
            return Err(PipelineError::Configuration(
                "source key must not be empty".into(),
            ));
        }

        let index_url = Url::parse(&config.index_url).map_err(|e| {
            PipelineError::Configuration(format!(
                "source {key}: invalid index_url {:?}: {e}",
                config.index_url
            ))
        })?;

        let origin = match &config.origin {
            Some(raw) => Url::parse(raw).map_err(|e| {
                PipelineError::Configuration(format!("source {key}: invalid origin {raw:?}: {e}"))
            })?,
            None => {
                let mut origin = index_url.clone();
                origin.set_path("/");
                origin.set_query(None);
                origin.set_fragment(None);
                origin
            }
        };

        let link_pattern = config
            .link_pattern
            .as_deref()
            .map(|p| compile_regex(key, p, false))
            .transpose()?;
        let noise_class = compile_regex(
            key,
            config
                .noise_class_pattern
                .as_deref()
                .unwrap_or(DEFAULT_NOISE_CLASS_PATTERN),
            true,
        )?;

        Ok(Self {
            key: key.to_string(),
            index_url,
            origin,
            link_pattern,
            link_containers: parse_selectors(&config.link_containers)?,
            title_selectors: parse_selectors(&config.title_selectors)?,
            body_containers: parse_selectors(&config.body_containers)?,
            noise_class,
            blacklist: config
                .blacklist
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            keywords: config.keywords.clone(),
        })
    }
}

fn compile_regex(key: &str, pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| {
            PipelineError::Configuration(format!("source {key}: invalid pattern {pattern:?}: {e}"))
        })
}

fn parse_selectors(raw: &[String]) -> Result<Vec<NamedSelector>> {
    raw.iter().map(|s| NamedSelector::parse(s)).collect()
}

/// Parse and validate YAML source definitions.
pub fn parse_sources(yaml: &str) -> Result<Vec<Source>> {
    let file: SourcesFile = serde_yaml::from_str(yaml)
        .map_err(|e| PipelineError::Configuration(format!("invalid sources file: {e}")))?;
    compile_sources(&file.sources)
}

fn compile_sources(configs: &[SourceConfig]) -> Result<Vec<Source>> {
    if configs.is_empty() {
        return Err(PipelineError::Configuration("no sources configured".into()));
    }
    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(configs.len());
    for config in configs {
        let source = Source::compile(config)?;
        if !seen.insert(source.key.clone()) {
            return Err(PipelineError::Configuration(format!(
                "duplicate source key {:?}",
                source.key
            )));
        }
        sources.push(source);
    }
    Ok(sources)
}

/// Options for the optional generation stage.
#[derive(Debug, Clone)]
pub struct RewriteSettings {
    pub config_path: Option<String>,
    pub template: String,
    pub chunk_chars: usize,
    pub structure: bool,
}

/// Fully validated run configuration.
#[derive(Debug)]
pub struct Settings {
    pub telegram_token: String,
    pub telegram_chat_id: String,
    pub telegram_api_url: String,
    pub sources: Vec<Source>,
    pub state_file: PathBuf,
    pub timeout: Duration,
    pub source_label: String,
    pub summary_dir: Option<String>,
    pub rewrite: Option<RewriteSettings>,
}

impl Settings {
    /// Validate CLI/env input and load source definitions.
    #[instrument(level = "info", skip_all)]
    pub async fn from_cli(cli: &Cli) -> Result<Self> {
        let telegram_token = required(&cli.telegram_token, "TELEGRAM_TOKEN")?;
        let telegram_chat_id = required(&cli.telegram_chat_id, "TELEGRAM_CHAT_ID")?;

        let mut sources = match &cli.sources {
            Some(path) => {
                let yaml = fs::read_to_string(path).await.map_err(|e| {
                    PipelineError::Configuration(format!("cannot read sources file {path}: {e}"))
                })?;
                parse_sources(&yaml)?
            }
            None => compile_sources(&builtin_sources())?,
        };

        if !cli.only.is_empty() {
            for key in &cli.only {
                if !sources.iter().any(|s| &s.key == key) {
                    return Err(PipelineError::Configuration(format!(
                        "unknown source key {key:?} passed to --only"
                    )));
                }
            }
            sources.retain(|s| cli.only.contains(&s.key));
        }

        if cli.timeout_secs == 0 {
            return Err(PipelineError::Configuration(
                "--timeout-secs must be greater than zero".into(),
            ));
        }
        if cli.rewrite && cli.chunk_chars == 0 {
            return Err(PipelineError::Configuration(
                "--chunk-chars must be greater than zero".into(),
            ));
        }

        let rewrite = cli.rewrite.then(|| RewriteSettings {
            config_path: cli.config.clone(),
            template: cli.template.clone(),
            chunk_chars: cli.chunk_chars,
            structure: cli.structure,
        });

        info!(
            sources = sources.len(),
            rewrite = rewrite.is_some(),
            state_file = %cli.state_file,
            "Configuration validated"
        );

        Ok(Self {
            telegram_token,
            telegram_chat_id,
            telegram_api_url: cli.telegram_api_url.trim_end_matches('/').to_string(),
            sources,
            state_file: PathBuf::from(&cli.state_file),
            timeout: Duration::from_secs(cli.timeout_secs),
            source_label: cli.source_label.clone(),
            summary_dir: cli.summary_dir.clone(),
            rewrite,
        })
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(PipelineError::Configuration(format!(
            "{name} is not set"
        ))),
    }
}
