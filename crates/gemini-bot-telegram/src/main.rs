use dotenvy::dotenv;
use gemini_bot_core::config::GeminiSettings;
use gemini_bot_transport_telegram::config::{BotSettings, TelegramSettings};
use gemini_bot_transport_telegram::runner::run_bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Secrets masked in every log line, as (pattern, replacement) pairs
const REDACTION_RULES: &[(&str, &str)] = &[
    (
        r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)",
        "$1[TELEGRAM_TOKEN]$3",
    ),
    (r"([0-9]{8,10}:[A-Za-z0-9_-]{35})", "[TELEGRAM_TOKEN]"),
    (r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+", "$1[TELEGRAM_TOKEN]"),
    (r"([?&]key=)[^\s&]+", "$1[MASKED]"),
    (r"(?i)(x-goog-api-key[:=]\s*)[^\s,]+", "$1[MASKED]"),
    (r"GOOGLE_GEMINI_KEY=[^\s&]+", "GOOGLE_GEMINI_KEY=[MASKED]"),
];

/// Compiled redaction rules
struct RedactionPatterns {
    rules: Vec<(Regex, &'static str)>,
}

impl RedactionPatterns {
    /// Compile every rule
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        let rules = REDACTION_RULES
            .iter()
            .map(|(pattern, replacement)| Ok((Regex::new(pattern)?, *replacement)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, (re, replacement)| {
                re.replace_all(&acc, *replacement).into_owned()
            })
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller's buffer was consumed in full even if the redacted length differs
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Before logging, so nothing is written unredacted
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Gemini TG Bot...");

    let settings = init_settings();

    run_bot(settings).await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "gemini_bot_core=info,gemini_bot_transport_telegram=info,gemini_bot_telegram=info,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let gemini_settings = match GeminiSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load Gemini configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    if gemini_settings.google_gemini_key.is_none() {
        tracing::warn!("GOOGLE_GEMINI_KEY is not set; Gemini requests will be rejected");
    }

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(gemini_settings, telegram_settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedactionPatterns {
        RedactionPatterns::new().expect("patterns compile")
    }

    #[test]
    fn test_redacts_telegram_token_in_url() {
        let line = "GET https://api.telegram.org/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw/getUpdates";
        let redacted = patterns().redact(line);
        assert!(!redacted.contains("AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw"));
        assert!(redacted.contains("[TELEGRAM_TOKEN]"));
    }

    #[test]
    fn test_redacts_gemini_key() {
        let p = patterns();
        let query = p.redact("POST /v1beta/models/gemini-pro:generateContent?key=AIzaSySecret&alt=json");
        assert_eq!(
            query,
            "POST /v1beta/models/gemini-pro:generateContent?key=[MASKED]&alt=json"
        );
        let header = p.redact("x-goog-api-key: AIzaSySecret");
        assert_eq!(header, "x-goog-api-key: [MASKED]");
        assert_eq!(
            p.redact("GOOGLE_GEMINI_KEY=AIzaSySecret"),
            "GOOGLE_GEMINI_KEY=[MASKED]"
        );
    }

    #[test]
    fn test_leaves_plain_lines_alone() {
        let line = "Gemini text request: 'what is a monad'";
        assert_eq!(patterns().redact(line), line);
    }

    #[test]
    fn test_writer_reports_full_buffer_consumed() -> io::Result<()> {
        let mut writer = RedactingWriter::new(Vec::new(), Arc::new(patterns()));
        let input = b"key=abc in ?key=abc";
        assert_eq!(writer.write(input)?, input.len());
        let written = String::from_utf8_lossy(&writer.inner).to_string();
        assert_eq!(written, "key=abc in ?key=[MASKED]");
        Ok(())
    }
}
