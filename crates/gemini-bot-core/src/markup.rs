//! Markdown to Telegram markup conversion.
//!
//! Model replies are markdown; Telegram accepts a small HTML subset. The
//! converter is best-effort: it reports [`Rendered::Degraded`] instead of
//! producing markup it cannot stand behind, and the caller then sends the
//! raw text.
//!
//! Patterns are compiled lazily through `lazy_regex!`, which also validates
//! them at compile time.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use uuid::Uuid;

/// Telegram's hard limit on message length, in characters
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Marker prepended to level-1 headings
pub const HEADING_MARKER: &str = "📌";
/// Marker prepended to links
pub const LINK_MARKER: &str = "🔗";

/// Match code blocks: ```...```
static RE_CODE_BLOCK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"```[\s\S]*?```");

/// Match code blocks with optional language: ```language\ncode```
static RE_CODE_BLOCK_FENCE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"```(\w*)\n?([\s\S]*?)```");

/// Match level-1 headings: # Title
static RE_HEADING_1: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?m)^#[ \t]+(.+?)[ \t]*$");

/// Match level 2-6 headings: ## Title
static RE_HEADING_N: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?m)^#{2,6}[ \t]+(.+?)[ \t]*$");

/// Match links: [label](http://...)
static RE_LINK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"\[([^\]\n]+)\]\((https?://[^)\s]+)\)");

/// Match bullet points at start of line: *
static RE_BULLET: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?m)^\* ");

/// Match bold text: **text**
static RE_BOLD: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\*\*(.*?)\*\*");

/// Match italic text: *text*
static RE_ITALIC: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\*(.*?)\*");

/// Match inline code: `code`
static RE_INLINE_CODE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"`(.*?)`");

/// Match 3+ consecutive newlines
static RE_MULTI_NEWLINE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\n{3,}");

/// Outcome of a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Telegram HTML ready to send with HTML parse mode
    Formatted(String),
    /// Conversion was refused; send the original text unformatted
    Degraded(DegradeReason),
}

/// Why a conversion was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// A ``` fence is opened but never closed
    UnbalancedCodeFence,
    /// The converted text does not fit in one message
    TooLong,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnbalancedCodeFence => f.write_str("unbalanced code fence"),
            Self::TooLong => f.write_str("formatted text exceeds message limit"),
        }
    }
}

/// Converts reply text into transport markup
pub trait MarkupConverter: Send + Sync {
    /// Convert `text`, or report why it cannot be converted
    fn convert(&self, text: &str) -> Rendered;
}

/// Markdown to Telegram HTML converter
#[derive(Debug, Default, Clone, Copy)]
pub struct TelegramHtml;

impl MarkupConverter for TelegramHtml {
    fn convert(&self, text: &str) -> Rendered {
        if text.matches("```").count() % 2 != 0 {
            return Rendered::Degraded(DegradeReason::UnbalancedCodeFence);
        }
        let html = format_text(text);
        if html.chars().count() > TELEGRAM_MESSAGE_LIMIT {
            return Rendered::Degraded(DegradeReason::TooLong);
        }
        Rendered::Formatted(html)
    }
}

/// Replace naked angle brackets with HTML entities, preserving Telegram-allowed HTML tags.
fn escape_angle_brackets(text: &str) -> String {
    // Whitelist of HTML tags supported by Telegram
    const TELEGRAM_ALLOWED_TAGS: &[&str] = &[
        "b", "i", "u", "s", "code", "pre", "a", "/b", "/i", "/u", "/s", "/code", "/pre", "/a",
    ];

    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut tag_name = String::new();

                if let Some(slash) = chars.next_if_eq(&'/') {
                    tag_name.push(slash);
                }
                while let Some(next_char) = chars.next_if(char::is_ascii_alphanumeric) {
                    tag_name.push(next_char);
                }

                if TELEGRAM_ALLOWED_TAGS.contains(&tag_name.as_str()) {
                    result.push('<');
                    in_tag = true;
                } else {
                    result.push_str("&lt;");
                }
                result.push_str(&tag_name);
            }
            '>' if in_tag => {
                result.push(c);
                in_tag = false;
            }
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escapes naked angle brackets while preserving code blocks and Telegram-supported tags.
///
/// # Examples
///
/// ```
/// use gemini_bot_core::markup::clean_html;
/// let cleaned = clean_html("Check this: 1 < 2 but <b>bold</b> works");
/// assert_eq!(cleaned, "Check this: 1 &lt; 2 but <b>bold</b> works");
/// ```
#[must_use]
pub fn clean_html(text: &str) -> String {
    // UUID placeholders so user text like "__CODE_BLOCK_0__" is never substituted
    let mut code_blocks: Vec<(String, String)> = Vec::new();

    let mut protected = String::with_capacity(text.len());
    let mut last_end = 0;
    for mat in RE_CODE_BLOCK.find_iter(text) {
        protected.push_str(&text[last_end..mat.start()]);
        let placeholder = format!("__CODE_BLOCK_{}__", Uuid::new_v4().as_simple());
        code_blocks.push((placeholder.clone(), mat.as_str().to_string()));
        protected.push_str(&placeholder);
        last_end = mat.end();
    }
    protected.push_str(&text[last_end..]);

    let mut cleaned = escape_angle_brackets(&protected);
    for (placeholder, block) in code_blocks {
        cleaned = cleaned.replace(&placeholder, &block);
    }
    cleaned
}

/// Rendered code spans held out of the inline passes
#[derive(Default)]
struct CodeStash {
    entries: Vec<(String, String)>,
}

impl CodeStash {
    /// Store rendered `html` and return the placeholder standing in for it
    fn stash(&mut self, html: String) -> String {
        let placeholder = format!("__CODE_SPAN_{}__", Uuid::new_v4().as_simple());
        self.entries.push((placeholder.clone(), html));
        placeholder
    }

    fn restore(self, mut text: String) -> String {
        for (placeholder, html) in self.entries {
            text = text.replace(&placeholder, &html);
        }
        text
    }
}

/// Formats markdown-like text into Telegram-compatible HTML.
///
/// Supported formatting:
/// - Code blocks: ` ```language\ncode``` ` -> `<pre><code class="language">code</code></pre>`
/// - Headings: `# Title` -> `📌 <b>Title</b>`, deeper levels -> `<b>Title</b>`
/// - Links: `[label](https://...)` -> `🔗 <a href="https://...">label</a>`
/// - Bullets: `* ` at the start of a line -> `• `
/// - Bold: `**text**` -> `<b>text</b>`
/// - Italic: `*text*` -> `<i>text</i>`
/// - Inline code: `` `code` `` -> `<code>code</code>`
/// - Multiple newlines (3+) are collapsed into two.
///
/// Code blocks and inline code are rendered first and kept verbatim; no
/// other rule applies inside them.
///
/// # Examples
///
/// ```
/// use gemini_bot_core::markup::format_text;
/// let formatted = format_text("**Bold** and *italic* with `a*b*c`");
/// assert_eq!(formatted, "<b>Bold</b> and <i>italic</i> with <code>a*b*c</code>");
/// ```
#[must_use]
pub fn format_text(text: &str) -> String {
    let mut stash = CodeStash::default();

    let out = RE_CODE_BLOCK_FENCE.replace_all(text, |caps: &regex::Captures| {
        let lang = caps.get(1).map_or("", |m| m.as_str());
        let code = html_escape::encode_text(caps.get(2).map_or("", |m| m.as_str()).trim());
        let html = if lang.is_empty() {
            format!("<pre><code>{code}</code></pre>")
        } else {
            format!("<pre><code class=\"{lang}\">{code}</code></pre>")
        };
        stash.stash(html)
    });

    let out = RE_INLINE_CODE.replace_all(&out, |caps: &regex::Captures| {
        let code = caps.get(1).map_or("", |m| m.as_str());
        stash.stash(format!("<code>{}</code>", html_escape::encode_text(code)))
    });

    let mut out = clean_html(&out);

    out = RE_HEADING_1
        .replace_all(&out, format!("{HEADING_MARKER} <b>$1</b>").as_str())
        .to_string();
    out = RE_HEADING_N.replace_all(&out, "<b>$1</b>").to_string();

    out = RE_LINK
        .replace_all(&out, |caps: &regex::Captures| {
            let label = caps.get(1).map_or("", |m| m.as_str());
            let url = caps.get(2).map_or("", |m| m.as_str());
            let href = html_escape::encode_double_quoted_attribute(url);
            format!("{LINK_MARKER} <a href=\"{href}\">{label}</a>")
        })
        .to_string();

    out = RE_BULLET.replace_all(&out, "• ").to_string();
    out = RE_BOLD.replace_all(&out, "<b>$1</b>").to_string();
    out = RE_ITALIC.replace_all(&out, "<i>$1</i>").to_string();

    out = RE_MULTI_NEWLINE.replace_all(&out, "\n\n").to_string();

    stash.restore(out).trim().to_string()
}
