use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node, Selector};

use crate::error::{RegisterError, Result};

/// Phrase every genuine register page carries somewhere in its markup.
pub const MARKER_PHRASE: &str = "FMCSA REGISTER";

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Elements whose text never renders.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Reject markup that is not a register page (error pages, maintenance notices, ...).
pub fn validate(raw: &str) -> Result<()> {
    if raw.to_uppercase().contains(MARKER_PHRASE) {
        Ok(())
    } else {
        Err(RegisterError::InvalidDocument {
            marker: MARKER_PHRASE,
        })
    }
}

/// Flatten markup to its visible text in document order, whitespace collapsed.
pub fn normalize(raw: &str) -> String {
    normalize_text(&visible_text(raw))
}

/// Raw text nodes under `<body>` (or the whole document when there is none),
/// concatenated as-is. Entities are decoded, so the result is no longer markup.
pub fn visible_text(raw: &str) -> String {
    let doc = Html::parse_document(raw);
    let root = doc.select(&BODY).next().unwrap_or_else(|| doc.root_element());
    let mut text = String::with_capacity(raw.len() / 2);

    for node in root.descendants() {
        let Node::Text(t) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_TAGS.contains(&e.name()))
        });
        if !hidden {
            text.push_str(t);
        }
    }
    text
}

/// Text stage: NBSP to space, then `collapse_ws`. Idempotent.
pub fn normalize_text(text: &str) -> String {
    collapse_ws(&text.replace('\u{a0}', " "))
}

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_ws(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}
