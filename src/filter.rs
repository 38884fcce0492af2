//! Channel-safe message building.
//!
//! The delivery channel renders a small HTML subset (bold, italic, links,
//! code). [`sanitize`] removes the wrapper tags it rejects by tag stripping
//! only, leaving that inline subset alone, and escapes any stray `<`, `>` or
//! `&` that is not part of a kept tag or entity. [`format_message`] lays out
//! `title + body + source link` and cuts the body, never the title or the
//! link, when the result would exceed the channel limit.

use crate::models::{FormattedMessage, Segment, SegmentKind};
use crate::utils::{char_len, truncate_chars};
use html_escape::{encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum message size accepted by the channel, in characters.
pub const CHANNEL_MESSAGE_LIMIT: usize = 4096;
/// Appended to a body that had to be cut.
pub const TRUNCATION_MARKER: &str = "…";

static SCRIPT_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<noscript\b[^>]*>.*?</noscript\s*>",
    )
    .unwrap()
});
static BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|table|section|article|figure)\s*>").unwrap()
});
static UNSUPPORTED_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(h[1-6]|div|span|p|section|article|header|footer|nav|aside|table|thead|tbody|tfoot|tr|td|th|ul|ol|li|img|video|audio|source|picture|figure|figcaption|iframe|embed|object|svg|form|input|button|script|style)\b[^>]*>",
    )
    .unwrap()
});
static TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static INLINE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(/?)(b|strong|i|em|u|ins|s|strike|del|a|code|pre|tg-spoiler)\b[^>]*>")
        .unwrap()
});
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^&(#[0-9]+|#x[0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").unwrap());

/// Strip markup the channel does not support.
///
/// `<script>`/`<style>` blocks go away with their content; other unsupported
/// tags are removed and their text kept. Block boundaries become line breaks.
pub fn sanitize(body_text: &str) -> String {
    let text = SCRIPT_LIKE.replace_all(body_text, "");
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    let text = UNSUPPORTED_TAG.replace_all(&text, "");
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    escape_stray(text.trim())
}

/// Escape everything outside the kept inline tags, preserving entities.
fn escape_stray(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for tag in INLINE_TAG.find_iter(text) {
        escape_segment(&text[last..tag.start()], &mut out);
        out.push_str(tag.as_str());
        last = tag.end();
    }
    escape_segment(&text[last..], &mut out);
    out
}

fn escape_segment(segment: &str, out: &mut String) {
    for (i, c) in segment.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' if ENTITY.is_match(&segment[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
}

/// Escape plain extracted text so it can be embedded in channel markup.
pub fn escape_text(plain: &str) -> String {
    encode_text(plain).into_owned()
}

/// Channel markup for extracted blocks: headings in bold, all text escaped.
pub fn render_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| match s.kind {
            SegmentKind::Heading => format!("<b>{}</b>", escape_text(&s.text)),
            SegmentKind::Paragraph => escape_text(&s.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone)]
pub struct MessageOptions {
    pub limit: usize,
    pub source_label: String,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            limit: CHANNEL_MESSAGE_LIMIT,
            source_label: "Source".to_string(),
        }
    }
}

/// Build the final message from a plain-text title, a channel-safe body and
/// the article URL.
pub fn format_message(
    title: &str,
    body: &str,
    url: &str,
    options: &MessageOptions,
) -> FormattedMessage {
    let title = escape_text(title);
    let head = format!("<b>{title}</b>\n\n");
    let tail = format!(
        "\n\n<a href=\"{}\">{}</a>",
        encode_double_quoted_attribute(url),
        escape_text(&options.source_label)
    );

    let full = format!("{head}{body}{tail}");
    if char_len(&full) <= options.limit {
        return FormattedMessage {
            text: full,
            target_url: url.to_string(),
            truncated: false,
        };
    }

    let overhead = char_len(&head) + char_len(&tail) + char_len(TRUNCATION_MARKER);
    let text = if overhead < options.limit {
        let body = cut_markup(body, options.limit - overhead);
        format!("{head}{}{TRUNCATION_MARKER}{tail}", body.trim_end())
    } else {
        // Title alone does not fit: keep a shortened title and the link.
        let frame = char_len("<b></b>") + char_len(TRUNCATION_MARKER) + char_len(&tail);
        let room = options.limit.saturating_sub(frame);
        let short = format!("<b>{}{TRUNCATION_MARKER}</b>{tail}", cut_markup(&title, room));
        truncate_chars(&short, options.limit).to_string()
    };

    FormattedMessage {
        text,
        target_url: url.to_string(),
        truncated: true,
    }
}

/// Cut markup to at most `max` characters without splitting a tag or an
/// entity, closing any inline tag left open.
fn cut_markup(markup: &str, max: usize) -> String {
    let mut budget = max;
    loop {
        let mut cut = truncate_chars(markup, budget);
        if let Some(lt) = cut.rfind('<') {
            if !cut[lt..].contains('>') {
                cut = &cut[..lt];
            }
        }
        if let Some(amp) = cut.rfind('&') {
            if !cut[amp..].contains(';') {
                cut = &cut[..amp];
            }
        }

        let closers = closing_tags(cut);
        let len = char_len(cut) + char_len(&closers);
        if len <= max || budget == 0 {
            return format!("{cut}{closers}");
        }
        budget = budget.saturating_sub(len - max);
    }
}

/// Closing tags for inline tags still open at the end of `markup`.
fn closing_tags(markup: &str) -> String {
    let mut open: Vec<String> = Vec::new();
    for caps in INLINE_TAG.captures_iter(markup) {
        let name = caps[2].to_ascii_lowercase();
        if &caps[1] == "/" {
            if let Some(pos) = open.iter().rposition(|t| *t == name) {
                open.truncate(pos);
            }
        } else {
            open.push(name);
        }
    }
    open.iter().rev().map(|t| format!("</{t}>")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://news.example/a/1";

    fn options(limit: usize) -> MessageOptions {
        MessageOptions {
            limit,
            source_label: "Source".to_string(),
        }
    }

    #[test]
    fn test_sanitize_strips_wrappers_and_keeps_inline() {
        let input = "<h2>Lead</h2><div class=\"x\">Text with <b>bold</b> and \
                     <a href=\"https://x.example\">link</a></div>\
                     <script>alert(1)</script><style>p{}</style>\
                     <table><tr><td>cell</td></tr></table><img src=\"a.png\">";
        let out = sanitize(input);
        assert!(out.starts_with("Lead\n"));
        assert!(out.contains("<b>bold</b>"));
        assert!(out.contains("<a href=\"https://x.example\">link</a>"));
        assert!(out.contains("cell"));
        assert!(!out.contains("alert"));
        assert!(!out.contains("<div"));
        assert!(!out.contains("<img"));
        assert!(!out.contains("\n\n\n"));
    }

    #[test]
    fn test_sanitize_leaves_escaped_text_alone() {
        let escaped = escape_text("1 < 2 & \"quotes\"");
        assert_eq!(escaped, "1 &lt; 2 &amp; \"quotes\"");
        assert_eq!(sanitize(&escaped), escaped);
    }

    #[test]
    fn test_sanitize_escapes_stray_characters() {
        let out = sanitize("<h3>Skor</h3>Fener & Cimbom: 2 > 1 <b>bitti</b> &amp; <blink>x</blink>");
        assert_eq!(
            out,
            "Skor\nFener &amp; Cimbom: 2 &gt; 1 <b>bitti</b> &amp; &lt;blink&gt;x&lt;/blink&gt;"
        );
    }

    #[test]
    fn test_render_segments_bolds_headings() {
        let segments = vec![
            Segment::paragraph("Lead & intro"),
            Segment::heading("Maç sonu"),
            Segment::paragraph("2 > 1"),
        ];
        assert_eq!(
            render_segments(&segments),
            "Lead &amp; intro\n\n<b>Maç sonu</b>\n\n2 &gt; 1"
        );
    }

    #[test]
    fn test_format_message_layout() {
        let msg = format_message("Fener & Cimbom", "P1\n\nP2", URL, &options(4096));
        assert_eq!(
            msg.text,
            "<b>Fener &amp; Cimbom</b>\n\nP1\n\nP2\n\n<a href=\"https://news.example/a/1\">Source</a>"
        );
        assert!(!msg.truncated);
        assert_eq!(msg.target_url, URL);
    }

    #[test]
    fn test_long_body_is_truncated_within_limit() {
        let body = "Ağır bir paragraf. ".repeat(600);
        let msg = format_message("Title X", &body, URL, &options(CHANNEL_MESSAGE_LIMIT));

        assert!(msg.truncated);
        assert!(char_len(&msg.text) <= CHANNEL_MESSAGE_LIMIT);
        assert!(msg.text.starts_with("<b>Title X</b>\n\n"));
        assert!(msg.text.ends_with("<a href=\"https://news.example/a/1\">Source</a>"));
        assert!(msg.text.contains(&format!("{TRUNCATION_MARKER}\n\n<a href")));
    }

    #[test]
    fn test_truncation_never_splits_tags_or_entities() {
        let body = "x".repeat(40) + "<b>bold text here</b> &amp; more";
        for limit in 80..130 {
            let msg = format_message("T", &body, URL, &options(limit));
            assert!(char_len(&msg.text) <= limit, "limit {limit}");
            let body_part = &msg.text[msg.text.find("\n\n").unwrap()..];
            let opens = body_part.matches("<b>").count();
            let closes = body_part.matches("</b>").count();
            assert_eq!(opens, closes, "limit {limit}: {}", msg.text);
            assert!(!body_part.contains("&am…"), "limit {limit}");
        }
    }

    #[test]
    fn test_oversized_title_keeps_link() {
        let title = "T".repeat(200);
        let msg = format_message(&title, "body", URL, &options(120));
        assert!(char_len(&msg.text) <= 120);
        assert!(msg.text.ends_with("Source</a>"));
        assert!(msg.truncated);
    }

    #[test]
    fn test_closing_tags() {
        assert_eq!(closing_tags("<b>a <i>b"), "</i></b>");
        assert_eq!(closing_tags("<b>a</b> <a href=\"x\">b"), "</a>");
        assert_eq!(closing_tags("plain"), "");
    }
}
