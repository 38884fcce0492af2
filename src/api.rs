//! Text generation backend interaction.
//!
//! This module provides the interface the rewrite stage uses to reach an
//! OpenAI-compatible LLM through the `awful_aj` client.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//!
//! Calls are not retried. A failed call makes the rewrite stage fall back to
//! the original text.

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends, including in-memory
/// fakes in tests.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// # Lifetime Parameters
///
/// * `'a` - The lifetime of the references to config and template
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// Reference to the LLM configuration (API keys, endpoints, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Reference to the chat template defining the conversation structure.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(chars = text.len()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => debug!(elapsed_ms = dt.as_millis() as u64, "API call succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "API call failed"),
        }
        res
    }
}

/// Load the backend configuration and chat template.
///
/// `config_path` defaults to `config.yaml` in the `awful_aj` config directory.
#[instrument(level = "info")]
pub async fn load_backend(
    config_path: Option<&str>,
    template_name: &str,
) -> Result<(AwfulJadeConfig, ChatTemplate), Box<dyn Error>> {
    let config_path = match config_path {
        Some(path) => path.to_string(),
        None => awful_aj::config_dir()?
            .join("config.yaml")
            .to_string_lossy()
            .into_owned(),
    };
    let config = awful_aj::config::load_config(&config_path)?;
    let template = awful_aj::template::load_template(template_name).await?;
    debug!(%config_path, template = template_name, "Loaded generation backend");
    Ok((config, template))
}
