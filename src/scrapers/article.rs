//! Article title and body extraction.
//!
//! Title chain, in this exact order:
//! 1. the source's page-specific header selectors
//! 2. the first `h1`
//! 3. `og:title` metadata
//! 4. the document `<title>`
//!
//! Body: the first element matched by the first configured container selector
//! that holds at least one heading or paragraph is used, or the whole document
//! when none qualifies. Containers classed like page furniture (related news,
//! promo cards) never qualify. Headings and
//! paragraphs are collected in document order. Blocks whose own or enclosing
//! classes look like share/promo/cookie furniture are dropped, as are blocks
//! containing a blacklisted phrase. If nothing survives, one last pass takes
//! every `<p>` in the document with only the blacklist applied.

use crate::config::Source;
use crate::error::Result;
use crate::fetch::Fetch;
use crate::models::{Article, Segment, Title};
use crate::selectors::{Blank, Strategy, resolve};
use crate::utils::{collapse_whitespace, truncate_for_log};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

static BLOCK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6, p").unwrap());
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static OG_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());

/// Fetch and extract the article at `url`.
///
/// Returns `Ok(None)` when no body text survives filtering.
///
/// # Errors
///
/// [`crate::error::PipelineError::Fetch`] when the page cannot be retrieved.
#[instrument(level = "info", skip(fetcher, source), fields(source = %source.key))]
pub async fn fetch_article<F: Fetch>(
    fetcher: &F,
    source: &Source,
    url: &str,
) -> Result<Option<Article>> {
    let html = fetcher.fetch(url).await?;
    let article = parse_article(source, url, &html);
    match &article {
        Some(a) => info!(
            segments = a.body_segments.len(),
            untitled = a.title.is_missing(),
            "Parsed article"
        ),
        None => warn!("Article produced no body text"),
    }
    Ok(article)
}

/// Extract an article from an already fetched page.
pub fn parse_article(source: &Source, url: &str, html: &str) -> Option<Article> {
    let document = Html::parse_document(html);

    let title = match resolve(&document, &title_strategies(source)) {
        Some(resolved) => {
            debug!(strategy = %resolved.strategy, "Resolved title");
            Title::Found(resolved.value)
        }
        None => Title::Missing,
    };

    let mut segments = match resolve(&document, &body_strategies(source)) {
        Some(resolved) => {
            debug!(
                strategy = %resolved.strategy,
                candidates = resolved.value.candidates,
                kept = resolved.value.segments.len(),
                "Resolved body container"
            );
            resolved.value.segments
        }
        None => Vec::new(),
    };

    if segments.is_empty() {
        debug!("Filtered body is empty; collecting every paragraph");
        segments = document
            .select(&PARAGRAPH_SELECTOR)
            .filter_map(|p| {
                let text = block_text(p);
                (!text.is_empty() && !is_boilerplate(&text, &source.blacklist))
                    .then(|| Segment::paragraph(text))
            })
            .collect();
    }

    if segments.is_empty() {
        return None;
    }

    Some(Article {
        source_key: source.key.clone(),
        url: url.to_string(),
        title,
        body_segments: segments,
        extracted_at: Utc::now(),
    })
}

fn title_strategies(source: &Source) -> Vec<Strategy<'_, String>> {
    let mut strategies: Vec<Strategy<'_, String>> = source
        .title_selectors
        .iter()
        .map(|header| {
            Strategy::new(format!("header:{}", header.raw), move |doc: &Html| {
                doc.select(&header.selector).next().map(block_text)
            })
        })
        .collect();

    strategies.push(Strategy::new("h1", |doc: &Html| {
        doc.select(&H1_SELECTOR).next().map(block_text)
    }));
    strategies.push(Strategy::new("og:title", |doc: &Html| {
        doc.select(&OG_TITLE_SELECTOR)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(collapse_whitespace)
    }));
    strategies.push(Strategy::new("title", |doc: &Html| {
        doc.select(&TITLE_SELECTOR).next().map(block_text)
    }));
    strategies
}

/// Segments gathered from one container choice.
///
/// `candidates` counts headings and paragraphs before filtering; a container
/// qualifies when it has any, even if filtering later removes them all.
#[derive(Debug, Default)]
struct BodyPick {
    segments: Vec<Segment>,
    candidates: usize,
}

impl Blank for BodyPick {
    fn is_blank(&self) -> bool {
        self.candidates == 0
    }
}

fn body_strategies(source: &Source) -> Vec<Strategy<'_, BodyPick>> {
    let mut strategies: Vec<Strategy<'_, BodyPick>> = source
        .body_containers
        .iter()
        .map(|container| {
            Strategy::new(format!("container:{}", container.raw), move |doc: &Html| {
                doc.select(&container.selector)
                    .filter(|element| !is_noise_container(*element, &source.noise_class))
                    .map(|element| {
                        let mut pick = BodyPick::default();
                        collect_blocks(element, source, &mut pick);
                        pick
                    })
                    .find(|pick| pick.candidates > 0)
            })
        })
        .collect();

    strategies.push(Strategy::new("document", move |doc: &Html| {
        let mut pick = BodyPick::default();
        collect_blocks(doc.root_element(), source, &mut pick);
        Some(pick)
    }));
    strategies
}

fn collect_blocks(container: ElementRef<'_>, source: &Source, pick: &mut BodyPick) {
    for element in container.select(&BLOCK_SELECTOR) {
        pick.candidates += 1;
        let text = block_text(element);
        if text.is_empty() {
            continue;
        }
        if in_noise_block(element, container, &source.noise_class) {
            debug!(text = %truncate_for_log(&text, 60), "Skipped non-content block");
            continue;
        }
        if is_boilerplate(&text, &source.blacklist) {
            debug!(text = %truncate_for_log(&text, 60), "Skipped boilerplate block");
            continue;
        }
        pick.segments.push(match element.value().name() {
            "p" => Segment::paragraph(text),
            _ => Segment::heading(text),
        });
    }
}

fn block_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// True when the classes of `element` or any ancestor below `container`
/// match the non-content pattern.
fn in_noise_block(element: ElementRef<'_>, container: ElementRef<'_>, pattern: &Regex) -> bool {
    let container_id = (*container).id();
    let mut classes: Vec<&str> = element.value().classes().collect();
    for node in element.ancestors() {
        if node.id() == container_id {
            break;
        }
        if let Some(ancestor) = ElementRef::wrap(node) {
            classes.extend(ancestor.value().classes());
        }
    }
    !classes.is_empty() && pattern.is_match(&classes.join(" "))
}

/// True when `container` or one of its ancestors is classed like page
/// furniture, e.g. a related-news card reusing the `article` tag.
fn is_noise_container(container: ElementRef<'_>, pattern: &Regex) -> bool {
    let classes: Vec<&str> = container
        .value()
        .classes()
        .chain(
            container
                .ancestors()
                .filter_map(ElementRef::wrap)
                .flat_map(|a| a.value().classes()),
        )
        .collect();
    !classes.is_empty() && pattern.is_match(&classes.join(" "))
}

/// True when `text` contains any lowercased blacklist phrase.
fn is_boilerplate(text: &str, blacklist: &[String]) -> bool {
    let lower = text.to_lowercase();
    blacklist.iter().any(|phrase| lower.contains(phrase.as_str()))
}
