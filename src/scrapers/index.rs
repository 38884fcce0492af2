//! Latest-article link locator.
//!
//! Finds the single newest article URL on a source's index page. Strategies
//! run from most specific (the first link inside a configured card
//! container) to least specific (any link whose path matches the source's
//! link pattern). Relative hrefs are resolved against the source origin.

use crate::config::Source;
use crate::error::Result;
use crate::fetch::Fetch;
use crate::models::CandidateLink;
use crate::selectors::{Strategy, resolve};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Locate the newest article link of `source`.
///
/// Returns `Ok(None)` when no strategy matched; that usually means the page
/// layout changed and is logged, not raised.
///
/// # Errors
///
/// [`crate::error::PipelineError::Fetch`] when the index page cannot be retrieved.
#[instrument(level = "info", skip_all, fields(source = %source.key))]
pub async fn find_latest_article<F: Fetch>(
    fetcher: &F,
    source: &Source,
) -> Result<Option<CandidateLink>> {
    let html = fetcher.fetch(source.index_url.as_str()).await?;
    let link = locate_in_document(source, &html);
    match &link {
        Some(link) => info!(
            url = %link.absolute_url,
            strategy = %link.discovered_via,
            "Located latest article"
        ),
        None => warn!(index = %source.index_url, "No article link found on index page"),
    }
    Ok(link)
}

/// Run the link chain over an already fetched index page.
pub fn locate_in_document(source: &Source, html: &str) -> Option<CandidateLink> {
    let document = Html::parse_document(html);
    let strategies = link_strategies(source);
    let resolved = resolve(&document, &strategies)?;
    // Every strategy only yields hrefs that resolve.
    let absolute_url = normalize_url(&source.origin, &resolved.value)?;
    Some(CandidateLink {
        absolute_url,
        discovered_via: resolved.strategy,
    })
}

fn link_strategies(source: &Source) -> Vec<Strategy<'_, String>> {
    let mut strategies: Vec<Strategy<'_, String>> = source
        .link_containers
        .iter()
        .map(|container| {
            Strategy::new(format!("container:{}", container.raw), move |doc: &Html| {
                let card = doc.select(&container.selector).next()?;
                card.select(&LINK_SELECTOR)
                    .filter_map(|a| a.value().attr("href"))
                    .find(|href| usable_href(href) && normalize_url(&source.origin, href).is_some())
                    .map(str::to_string)
            })
        })
        .collect();

    if let Some(pattern) = &source.link_pattern {
        strategies.push(Strategy::new(
            format!("pattern:{}", pattern.as_str()),
            move |doc: &Html| {
                doc.select(&LINK_SELECTOR)
                    .filter_map(|a| a.value().attr("href"))
                    .filter(|href| usable_href(href))
                    .find(|href| {
                        source
                            .origin
                            .join(href.trim())
                            .map(|url| pattern.is_match(url.path()))
                            .unwrap_or(false)
                    })
                    .map(str::to_string)
            },
        ));
    }

    strategies
}

fn usable_href(href: &str) -> bool {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    !href.is_empty()
        && !href.starts_with('#')
        && !lower.starts_with("javascript:")
        && !lower.starts_with("mailto:")
        && !lower.starts_with("tel:")
}

/// Resolve `href` against `origin`; hrefs that already carry a scheme are
/// kept as they are. Only http(s) results are accepted.
pub fn normalize_url(origin: &Url, href: &str) -> Option<String> {
    let url = origin.join(href.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}
