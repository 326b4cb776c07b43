//! Utility functions for text handling and transport retries.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

const CODE_FENCE: &str = "```";

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use gemini_bot_core::utils::truncate_str;
/// assert_eq!(truncate_str("Привет, мир!", 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Accumulates message parts, closing and reopening code fences at part boundaries.
#[derive(Default)]
struct PartBuilder {
    parts: Vec<String>,
    current: String,
    current_len: usize,
    body_lines: usize,
    in_code: bool,
}

impl PartBuilder {
    fn push_line(&mut self, line: &str, line_len: usize) {
        self.current.push_str(line);
        self.current.push('\n');
        self.current_len += line_len + 1;
        self.body_lines += 1;
    }

    fn flush(&mut self) {
        if self.body_lines == 0 {
            return;
        }
        if self.in_code {
            self.current.push_str(CODE_FENCE);
        }
        self.parts.push(self.current.trim_end().to_string());
        self.current.clear();
        self.current_len = 0;
        if self.in_code {
            self.push_line(CODE_FENCE, CODE_FENCE.len());
        }
        self.body_lines = 0;
    }
}

/// Splits a message into parts of at most `max_chars` characters.
///
/// Splits on line boundaries where possible and falls back to grapheme
/// boundaries for oversized lines. A code block cut at a part boundary is
/// closed and reopened so every part keeps balanced fences.
///
/// # Examples
///
/// ```
/// use gemini_bot_core::utils::split_long_message;
/// let long_msg = "A very long message...\n".repeat(300);
/// let parts = split_long_message(&long_msg, 4000);
/// assert!(parts.len() > 1);
/// assert!(parts.iter().all(|p| p.chars().count() <= 4000));
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_chars: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    // Room for a closing and a reopening fence in every part
    let budget = max_chars.saturating_sub(2 * (CODE_FENCE.len() + 1)).max(1);
    let mut builder = PartBuilder::default();

    for line in message.lines() {
        let line_len = line.chars().count();

        if line_len > budget {
            builder.flush();
            let mut chunk = String::new();
            let mut chunk_len = 0;
            for grapheme in line.graphemes(true) {
                let grapheme_len = grapheme.chars().count();
                if chunk_len + grapheme_len > budget && !chunk.is_empty() {
                    builder.push_line(&chunk, chunk_len);
                    builder.flush();
                    chunk.clear();
                    chunk_len = 0;
                }
                chunk.push_str(grapheme);
                chunk_len += grapheme_len;
            }
            builder.push_line(&chunk, chunk_len);
            continue;
        }

        let closes_block = builder.in_code && line.starts_with(CODE_FENCE);
        if !closes_block && builder.current_len + line_len + 1 > budget {
            builder.flush();
        }
        if line.starts_with(CODE_FENCE) {
            builder.in_code = !builder.in_code;
        }
        builder.push_line(line, line_len);
    }

    builder.flush();
    builder.parts
}

/// Retry a transport operation with exponential backoff.
///
/// Meant for idempotent chat API calls such as `get_file` + `download_file`
/// that may fail on transient network errors. Backoff starts at 500ms, is
/// capped at 4s and jittered; at most 3 attempts are made.
///
/// # Errors
///
/// Returns the last error if every attempt fails.
///
/// # Examples
///
/// ```no_run
/// use gemini_bot_core::utils::retry_transport_operation;
///
/// # async fn example() -> anyhow::Result<()> {
/// let bytes: Vec<u8> = retry_transport_operation(|| async { Ok(vec![1, 2, 3]) }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_transport_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    // The first attempt is not part of the strategy
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES.saturating_sub(1));

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Transport operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_split_long_message_simple() {
        let input = "Line 1\nLine 2\nLine 3";
        assert_eq!(split_long_message(input, 100), vec![input.to_string()]);
        // 8 characters are reserved for fences, leaving room for one line per part
        let parts = split_long_message(input, 15);
        assert_eq!(parts, vec!["Line 1", "Line 2", "Line 3"]);
        assert!(split_long_message("", 10).is_empty());
    }

    #[test]
    fn test_split_long_message_reopens_code_block() {
        let input = "Start\n```rust\nlet a = 1;\nlet b = 2;\n```\nEnd";
        let parts = split_long_message(input, 30);

        assert!(parts.len() > 1);
        for part in &parts {
            assert_eq!(part.matches("```").count() % 2, 0, "unbalanced part: {part:?}");
            assert!(part.chars().count() <= 30);
        }
        let joined = parts.join("\n");
        assert!(joined.contains("let a = 1;"));
        assert!(joined.contains("let b = 2;"));
        assert!(joined.ends_with("End"));
    }

    #[test]
    fn test_split_long_message_breaks_oversized_line() {
        let input = "ж".repeat(25);
        let parts = split_long_message(&input, 18);
        assert_eq!(parts, vec!["ж".repeat(10), "ж".repeat(10), "ж".repeat(5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failure() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = retry_transport_operation(move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("connection reset");
            }
            Ok(7)
        })
        .await;

        assert_eq!(result.expect("second attempt succeeds"), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = retry_transport_operation(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("still down")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
