//! Optional rewrite stage.
//!
//! Article bodies can be rephrased through any [`AskAsync`] backend before
//! delivery. Bodies longer than the backend's per-call limit are split into
//! chunks that are rewritten independently and joined again; an optional
//! final pass arranges the result into lead, body and closing sections.
//!
//! Rewriting never fails the pipeline. Any backend error or empty answer
//! yields [`RewriteOutcome::Fallback`] carrying the original text. A backend
//! that returns its input unchanged is reported as
//! [`RewriteOutcome::Echoed`] and logged, since that usually points at a
//! silent failure upstream.

use crate::api::AskAsync;
use crate::error::{PipelineError, Result};
use crate::utils::{char_len, collapse_whitespace, truncate_chars, truncate_for_log};
use std::fmt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    Rewritten(String),
    /// The backend answered with the input text.
    Echoed(String),
    /// The backend failed; `text` is the original input.
    Fallback { text: String, reason: String },
}

impl RewriteOutcome {
    pub fn text(&self) -> &str {
        match self {
            RewriteOutcome::Rewritten(t) | RewriteOutcome::Echoed(t) => t,
            RewriteOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self, RewriteOutcome::Rewritten(_))
    }
}

#[derive(Debug, Clone)]
pub struct RewriteOptions {
    /// Largest slice of body text sent in one call, in characters.
    pub chunk_chars: usize,
    /// Run the lead/body/closing pass over the joined chunks.
    pub structure: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            chunk_chars: 3000,
            structure: false,
        }
    }
}

pub struct Rewriter<A> {
    backend: A,
    options: RewriteOptions,
}

impl<A> fmt::Debug for Rewriter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewriter")
            .field("chunk_chars", &self.options.chunk_chars)
            .field("structure", &self.options.structure)
            .finish()
    }
}

impl<A> Rewriter<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(backend: A, options: RewriteOptions) -> Self {
        Self { backend, options }
    }

    /// Rewrite plain `body_text` for an article titled `title`.
    #[instrument(level = "info", skip_all, fields(chars = body_text.len()))]
    pub async fn rewrite(&self, body_text: &str, title: &str, keywords: &[String]) -> RewriteOutcome {
        match self.try_rewrite(body_text, title, keywords).await {
            Ok(text) if collapse_whitespace(&text) == collapse_whitespace(body_text) => {
                warn!("Backend echoed the input unchanged");
                RewriteOutcome::Echoed(text)
            }
            Ok(text) => {
                info!(chars = text.len(), "Rewrote article body");
                RewriteOutcome::Rewritten(text)
            }
            Err(e) => {
                warn!(error = %e, "Rewrite failed; keeping original text");
                RewriteOutcome::Fallback {
                    text: body_text.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_rewrite(&self, body_text: &str, title: &str, keywords: &[String]) -> Result<String> {
        let chunks = split_chunks(body_text, self.options.chunk_chars);
        let total = chunks.len();
        let mut parts = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(chunk = i + 1, total, chars = char_len(chunk), "Rewriting chunk");
            let prompt = rewrite_prompt(title, keywords, chunk, i + 1, total);
            parts.push(self.ask_text(&prompt).await?);
        }
        let joined = parts.join("\n\n");

        if !self.options.structure {
            return Ok(joined);
        }
        if char_len(&joined) > self.options.chunk_chars {
            debug!(chars = char_len(&joined), "Skipping structure pass; text exceeds call limit");
            return Ok(joined);
        }
        self.ask_text(&structure_prompt(title, &joined)).await
    }

    async fn ask_text(&self, prompt: &str) -> Result<String> {
        let response = self
            .backend
            .ask(prompt)
            .await
            .map_err(|e| PipelineError::Rewrite(e.to_string()))?;
        let response = response.trim();
        if response.is_empty() {
            return Err(PipelineError::Rewrite("empty response".into()));
        }
        debug!(preview = %truncate_for_log(response, 120), "Backend answered");
        Ok(response.to_string())
    }
}

/// Split `text` into chunks of at most `max` characters, packing whole
/// paragraphs where possible and hard-splitting paragraphs that are too long.
pub fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let needed = if current.is_empty() {
            char_len(paragraph)
        } else {
            char_len(&current) + 2 + char_len(paragraph)
        };
        if needed <= max {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        let mut rest = paragraph;
        while char_len(rest) > max {
            let head = truncate_chars(rest, max);
            chunks.push(head.to_string());
            rest = &rest[head.len()..];
        }
        current.push_str(rest);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn rewrite_prompt(title: &str, keywords: &[String], chunk: &str, part: usize, total: usize) -> String {
    let mut prompt = format!(
        "Rewrite the following news text in your own words, in the same language as the \
         original. Keep every fact, name, number and quote. Do not add information. \
         Answer with the rewritten text only, as plain paragraphs; <b> is the only markup allowed.\n\n\
         Headline: {title}\n"
    );
    if total > 1 {
        prompt.push_str(&format!("This is part {part} of {total}.\n"));
    }
    if !keywords.is_empty() {
        prompt.push_str(&format!(
            "Use these keywords naturally where they fit: {}\n",
            keywords.join(", ")
        ));
    }
    prompt.push_str("\nText:\n");
    prompt.push_str(chunk);
    prompt
}

fn structure_prompt(title: &str, text: &str) -> String {
    format!(
        "Arrange the following news text into three parts separated by blank lines: \
         a one or two sentence lead, the main body, and a short closing sentence. \
         Keep the language and every fact. Do not add headings or any other markup.\n\n\
         Headline: {title}\n\nText:\n{text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::error::Error;

    /// Answers from a script; `Err` entries simulate backend failures.
    struct ScriptedBackend {
        answers: RefCell<VecDeque<std::result::Result<String, String>>>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(answers: Vec<std::result::Result<&str, &str>>) -> Self {
            Self {
                answers: RefCell::new(
                    answers
                        .into_iter()
                        .map(|a| a.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AskAsync for &ScriptedBackend {
        type Response = String;

        async fn ask(&self, text: &str) -> std::result::Result<String, Box<dyn Error>> {
            self.prompts.borrow_mut().push(text.to_string());
            match self.answers.borrow_mut().pop_front() {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(e)) => Err(e.into()),
                None => Err("script exhausted".into()),
            }
        }
    }

    fn options(chunk_chars: usize, structure: bool) -> RewriteOptions {
        RewriteOptions {
            chunk_chars,
            structure,
        }
    }

    #[tokio::test]
    async fn test_single_call_rewrite() {
        let backend = ScriptedBackend::new(vec![Ok("  Fresh words.  ")]);
        let rewriter = Rewriter::new(&backend, RewriteOptions::default());
        let keywords = vec!["süper lig".to_string()];

        let outcome = rewriter.rewrite("Old words.", "Title X", &keywords).await;
        assert_eq!(outcome, RewriteOutcome::Rewritten("Fresh words.".into()));

        let prompts = backend.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Headline: Title X"));
        assert!(prompts[0].contains("süper lig"));
        assert!(prompts[0].ends_with("Old words."));
    }

    #[tokio::test]
    async fn test_chunks_are_rewritten_and_joined_in_order() {
        let backend = ScriptedBackend::new(vec![Ok("one"), Ok("two")]);
        let rewriter = Rewriter::new(&backend, options(12, false));

        let outcome = rewriter.rewrite("first para\n\nsecond para", "T", &[]).await;
        assert_eq!(outcome.text(), "one\n\ntwo");
        assert!(outcome.is_rewritten());
        assert!(backend.prompts.borrow()[0].contains("part 1 of 2"));
    }

    #[tokio::test]
    async fn test_structure_pass_runs_last() {
        let backend = ScriptedBackend::new(vec![Ok("draft"), Ok("Lead.\n\nBody.\n\nEnd.")]);
        let rewriter = Rewriter::new(&backend, options(3000, true));

        let outcome = rewriter.rewrite("original", "T", &[]).await;
        assert_eq!(outcome.text(), "Lead.\n\nBody.\n\nEnd.");
        assert!(backend.prompts.borrow()[1].ends_with("draft"));
    }

    #[tokio::test]
    async fn test_any_failure_falls_back_to_original() {
        let backend = ScriptedBackend::new(vec![Ok("one"), Err("429 quota exceeded")]);
        let rewriter = Rewriter::new(&backend, options(12, false));

        let outcome = rewriter.rewrite("first para\n\nsecond para", "T", &[]).await;
        match outcome {
            RewriteOutcome::Fallback { text, reason } => {
                assert_eq!(text, "first para\n\nsecond para");
                assert!(reason.contains("quota"));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_answer_is_a_failure() {
        let backend = ScriptedBackend::new(vec![Ok("   ")]);
        let rewriter = Rewriter::new(&backend, RewriteOptions::default());
        let outcome = rewriter.rewrite("body", "T", &[]).await;
        assert!(matches!(outcome, RewriteOutcome::Fallback { .. }));
        assert_eq!(outcome.text(), "body");
    }

    #[tokio::test]
    async fn test_echo_is_detected_but_not_an_error() {
        let backend = ScriptedBackend::new(vec![Ok("Same   text\nhere")]);
        let rewriter = Rewriter::new(&backend, RewriteOptions::default());
        let outcome = rewriter.rewrite("Same text here", "T", &[]).await;
        assert_eq!(outcome, RewriteOutcome::Echoed("Same   text\nhere".into()));
    }

    #[test]
    fn test_split_chunks_packs_paragraphs() {
        let chunks = split_chunks("aa\n\nbb\n\ncc", 6);
        assert_eq!(chunks, vec!["aa\n\nbb", "cc"]);
    }

    #[test]
    fn test_split_chunks_hard_splits_long_paragraph() {
        let chunks = split_chunks("şşşşşşşşşş\n\nx", 4);
        assert_eq!(chunks, vec!["şşşş", "şşşş", "şş", "x"]);
        assert!(chunks.iter().all(|c| char_len(c) <= 4));
    }

    #[test]
    fn test_split_chunks_short_text_is_one_chunk() {
        assert_eq!(split_chunks("short", 3000), vec!["short"]);
        assert!(split_chunks("  \n\n ", 10).is_empty());
    }
}
