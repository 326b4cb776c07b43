//! Recovery of partial reply text from stopped candidates.
//!
//! When Gemini stops a candidate early the error still renders the candidate
//! content, e.g. `content { parts { text: "..." } }`. The text is scraped back
//! out of that rendering. This depends on the exact error layout and is kept
//! in one place so a format change only breaks this module and its tests.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// Match the first text part inside a rendered candidate
static RE_CANDIDATE_TEXT: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"content\s*\{\s*parts\s*\{\s*text:\s*"([^"]+)""#);

/// Extracts the first quoted text part from a rendered stopped candidate,
/// turning literal `\n` sequences into newlines.
///
/// Returns `None` when no non-empty text part is present.
///
/// # Examples
///
/// ```
/// use gemini_bot_core::salvage::salvage_candidate_text;
/// let rendered = r#"content { parts { text: "Hello\nWorld" } } finish_reason: SAFETY"#;
/// assert_eq!(salvage_candidate_text(rendered).as_deref(), Some("Hello\nWorld"));
/// ```
#[must_use]
pub fn salvage_candidate_text(error_text: &str) -> Option<String> {
    RE_CANDIDATE_TEXT
        .captures(error_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace("\\n", "\n"))
}
