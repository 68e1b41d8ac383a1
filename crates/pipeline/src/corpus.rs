//! Speech corpus assembly and cleaning.
//!
//! Source rows frequently carry leftover markup from the transcript feeds.
//! [`clean_corpus`] turns a joined corpus into prompt-ready text: tags become
//! spaces, whitespace runs collapse, and the result is truncated to the
//! configured character budget.

use std::sync::LazyLock;

use regex::Regex;

use crate::SPEECH_SEPARATOR;

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static pattern is valid"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern is valid"));

/// Joins individual speech rows in the order given, dropping blank rows.
pub fn join_speeches<I, S>(rows: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    rows.into_iter()
        .filter(|r| !r.as_ref().trim().is_empty())
        .map(|r| r.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(SPEECH_SEPARATOR)
}

/// Strips markup, normalises whitespace, and truncates to `max_chars`
/// characters. Returns `None` when no text remains.
pub fn clean_corpus(raw: &str, max_chars: usize) -> Option<String> {
    let without_tags = MARKUP_TAG.replace_all(raw, " ");
    let collapsed = WHITESPACE_RUN.replace_all(&without_tags, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_preserves_order_and_skips_blank_rows() {
        let joined = join_speeches(["first", "  ", "second"]);
        assert_eq!(joined, "first\n\n---\n\nsecond");
    }

    #[test]
    fn clean_strips_tags_and_collapses_whitespace() {
        let cleaned = clean_corpus("<p>We must   act</p>\n\n<b>on climate</b> policy.", 100);
        assert_eq!(cleaned.as_deref(), Some("We must act on climate policy."));
    }

    #[test]
    fn clean_truncates_by_characters_not_bytes() {
        let cleaned = clean_corpus("ååååå", 3).unwrap();
        assert_eq!(cleaned, "ååå");
    }

    #[test]
    fn clean_returns_none_for_markup_only_input() {
        assert_eq!(clean_corpus("<div></div>\n\t<br/>", 100), None);
    }
}
