//! Message adapter
//!
//! Bridges chat messages to the generative model. Text requests run through
//! a per-user [`ConversationHandle`]; photo requests are one-shot calls to the
//! vision model and never touch the session registry.

use crate::config::{
    GeminiSettings, ANSWER_CHUNK_CHARS, CAPTION_TRIGGER_PREFIXES, CLEAR_COMMAND, DEFAULT_VISION_PROMPT,
    TEXT_TRIGGER_PREFIX, TRIGGER_COMMAND, VISION_MIME_TYPE,
};
use crate::llm::{GenerativeModel, LlmError, ModelSpec};
use crate::markup::{MarkupConverter, Rendered, TelegramHtml};
use crate::salvage::salvage_candidate_text;
use crate::session::{ConversationHandle, SessionRegistry};
use crate::transport::{ChatTransport, IncomingMessage, PhotoVariant, ReplyFormat, TransportError};
use crate::utils::{split_long_message, truncate_str};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix of a formatted text answer
pub const TEXT_ANSWER_PREFIX: &str = "Gemini answer:\n";
/// Prefix of an unformatted text answer
pub const FALLBACK_ANSWER_PREFIX: &str = "Gemini answer:\n\n";
/// Prefix of a vision answer
pub const VISION_ANSWER_PREFIX: &str = "Gemini vision answer:\n";
/// Reply confirming a history reset
pub const CLEAR_CONFIRMATION: &str = "just clear you gemini messages history";
/// Reply when a stopped candidate carries no recoverable text
pub const GENERATION_ERROR_MESSAGE: &str =
    "Google gemini encountered an error while generating an answer. Please check the log.";
/// Placeholder shown while a vision answer is generated
pub const VISION_PLACEHOLDER: &str = "Generating google gemini vision answer please wait.";
/// Reply to a trigger without a question
pub const USAGE_MESSAGE: &str =
    "Usage: /gemini <question> or gemini: <question>. Send \"/gemini clear\" to reset history.";

/// Errors that escape the adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Model call failed with an unrecoverable error
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// Chat transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A photo request arrived without any photo attached
    #[error("Message has no photo attached")]
    MissingPhoto,
}

/// Result of a handled text message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOutcome {
    /// History was reset; no model call was made
    Cleared,
    /// The trigger carried no question
    MissingPrompt,
    /// An answer was delivered in the given format
    Answered(ReplyFormat),
    /// The model stopped without recoverable text; the user was notified
    GenerationFailed,
}

/// Returns the question behind a text trigger.
///
/// Strips a leading `/gemini` (with an optional `@botname`) or `gemini:`
/// and surrounding whitespace. Text without a trigger is only trimmed.
///
/// # Examples
///
/// ```
/// use gemini_bot_core::adapter::strip_text_trigger;
/// assert_eq!(strip_text_trigger("/gemini@my_bot  hi "), "hi");
/// assert_eq!(strip_text_trigger("gemini: clear"), "clear");
/// assert_eq!(strip_text_trigger("clear"), "clear");
/// ```
#[must_use]
pub fn strip_text_trigger(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = strip_command(text) {
        return rest.trim();
    }
    text.strip_prefix(TEXT_TRIGGER_PREFIX)
        .map_or(text, str::trim)
}

/// Whether `text` starts with the text-mode prefix (`gemini:`)
#[must_use]
pub fn is_text_trigger(text: &str) -> bool {
    text.starts_with(TEXT_TRIGGER_PREFIX)
}

/// Whether a photo caption requests a vision answer
#[must_use]
pub fn caption_matches_trigger(caption: &str) -> bool {
    CAPTION_TRIGGER_PREFIXES
        .iter()
        .any(|prefix| caption.starts_with(prefix))
}

/// Returns the prompt of a photo caption, with the trigger removed
#[must_use]
pub fn caption_prompt(caption: &str) -> &str {
    let prompt = strip_text_trigger(caption);
    if prompt.is_empty() {
        DEFAULT_VISION_PROMPT
    } else {
        prompt
    }
}

/// Strips `/gemini` or `/gemini@bot`, requiring a word boundary after it
fn strip_command(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?.strip_prefix(TRIGGER_COMMAND)?;
    let rest = match rest.strip_prefix('@') {
        Some(mention) => mention.find(char::is_whitespace).map_or("", |i| &mention[i..]),
        None => rest,
    };
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

/// Picks the variant with the largest file size
#[must_use]
pub fn select_largest_photo(variants: &[PhotoVariant]) -> Option<&PhotoVariant> {
    variants.iter().max_by_key(|p| p.file_size)
}

/// Message adapter between a chat transport and a generative model
pub struct MessageAdapter {
    model: Arc<dyn GenerativeModel>,
    markup: Arc<dyn MarkupConverter>,
    sessions: SessionRegistry,
    chat_model: ModelSpec,
    vision_model: ModelSpec,
}

impl MessageAdapter {
    /// Create an adapter using the models named in `settings`
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>, settings: &GeminiSettings) -> Self {
        Self::with_markup(model, Arc::new(TelegramHtml), settings)
    }

    /// Create an adapter with a custom markup converter
    #[must_use]
    pub fn with_markup(
        model: Arc<dyn GenerativeModel>,
        markup: Arc<dyn MarkupConverter>,
        settings: &GeminiSettings,
    ) -> Self {
        Self {
            model,
            markup,
            sessions: SessionRegistry::new(),
            chat_model: ModelSpec::chat(&settings.gemini_chat_model),
            vision_model: ModelSpec::vision(&settings.gemini_vision_model),
        }
    }

    /// Per-user conversation handles
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handles a text trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if the model fails with anything other than a
    /// stopped candidate, or if the transport fails to deliver the reply.
    pub async fn handle_text(
        &self,
        message: &IncomingMessage,
        transport: &dyn ChatTransport,
    ) -> Result<TextOutcome, AdapterError> {
        let prompt = strip_text_trigger(message.text.as_deref().unwrap_or_default());
        let user_key = message.user_key();

        if prompt.is_empty() {
            transport
                .reply(message, USAGE_MESSAGE, ReplyFormat::Plain)
                .await?;
            return Ok(TextOutcome::MissingPrompt);
        }

        info!(
            user = %user_key,
            "Gemini text request: '{}'",
            truncate_str(prompt, 100)
        );

        let handle = self
            .sessions
            .get_or_create(&user_key, || ConversationHandle::new(self.chat_model.clone()))
            .await;
        let mut conversation = handle.lock().await;

        if prompt == CLEAR_COMMAND {
            conversation.clear();
            drop(conversation);
            info!(user = %user_key, "Cleared Gemini history");
            transport
                .reply(message, CLEAR_CONFIRMATION, ReplyFormat::Plain)
                .await?;
            return Ok(TextOutcome::Cleared);
        }

        conversation.trim_history();

        let reply_text = match conversation.send_message(self.model.as_ref(), prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(err @ LlmError::StopCandidate { .. }) => {
                let Some(text) = salvage_candidate_text(&err.to_string()) else {
                    drop(conversation);
                    warn!(user = %user_key, error = %err, "No meaningful text was extracted from the stopped candidate");
                    transport
                        .reply(message, GENERATION_ERROR_MESSAGE, ReplyFormat::Plain)
                        .await?;
                    return Ok(TextOutcome::GenerationFailed);
                };
                info!(user = %user_key, "Recovered partial answer from stopped candidate");
                text
            }
            Err(err) => return Err(err.into()),
        };
        drop(conversation);

        self.deliver_answer(message, transport, &reply_text).await
    }

    /// Sends the answer formatted, falling back to raw text on any failure.
    ///
    /// Long answers go out as several replies. Each part falls back on its
    /// own, and only the first one carries the answer prefix.
    async fn deliver_answer(
        &self,
        message: &IncomingMessage,
        transport: &dyn ChatTransport,
        text: &str,
    ) -> Result<TextOutcome, AdapterError> {
        let mut parts = split_long_message(text, ANSWER_CHUNK_CHARS);
        if parts.is_empty() {
            parts.push(String::new());
        }
        let mut format = ReplyFormat::Html;

        for (index, part) in parts.iter().enumerate() {
            let first = index == 0;
            if !self.deliver_part(message, transport, part, first).await? {
                format = ReplyFormat::Plain;
            }
        }

        Ok(TextOutcome::Answered(format))
    }

    /// Sends one answer part, returning whether it went out as HTML.
    async fn deliver_part(
        &self,
        message: &IncomingMessage,
        transport: &dyn ChatTransport,
        part: &str,
        first: bool,
    ) -> Result<bool, AdapterError> {
        match self.markup.convert(part) {
            Rendered::Formatted(markup) => {
                let formatted = if first {
                    format!("{TEXT_ANSWER_PREFIX}{markup}")
                } else {
                    markup
                };
                match transport.reply(message, &formatted, ReplyFormat::Html).await {
                    Ok(_) => return Ok(true),
                    Err(e) => warn!(error = %e, "Wrong markdown format, sending plain text"),
                }
            }
            Rendered::Degraded(reason) => {
                warn!(%reason, "Markup conversion degraded, sending plain text");
            }
        }

        let plain = if first {
            format!("{FALLBACK_ANSWER_PREFIX}{part}")
        } else {
            part.to_string()
        };
        transport.reply(message, &plain, ReplyFormat::Plain).await?;
        Ok(false)
    }

    /// Handles a photo with a trigger caption.
    ///
    /// A placeholder reply is shown while the answer is generated and is
    /// deleted exactly once afterwards, whether or not generation succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the message has no photo, the download or model
    /// call fails, or the transport fails to deliver a reply.
    pub async fn handle_photo(
        &self,
        message: &IncomingMessage,
        transport: &dyn ChatTransport,
    ) -> Result<(), AdapterError> {
        let variant = select_largest_photo(&message.photo).ok_or(AdapterError::MissingPhoto)?;
        let prompt = caption_prompt(message.caption.as_deref().unwrap_or_default());

        info!(
            user = %message.user_key(),
            file_size = variant.file_size,
            "Gemini vision request: '{}'",
            truncate_str(prompt, 100)
        );

        let placeholder = transport
            .reply(message, VISION_PLACEHOLDER, ReplyFormat::Plain)
            .await?;

        let result = self.answer_photo(message, transport, variant, prompt).await;

        if let Err(e) = transport.delete_message(&placeholder).await {
            warn!(error = %e, "Failed to delete vision placeholder");
        }
        result
    }

    async fn answer_photo(
        &self,
        message: &IncomingMessage,
        transport: &dyn ChatTransport,
        variant: &PhotoVariant,
        prompt: &str,
    ) -> Result<(), AdapterError> {
        let image = transport.download_file(&variant.file_id).await?;
        debug!(bytes = image.len(), "Downloaded photo");

        let answer = self
            .model
            .analyze_image(&self.vision_model, image, VISION_MIME_TYPE, prompt)
            .await?;

        transport
            .reply(
                message,
                &format!("{VISION_ANSWER_PREFIX}{answer}"),
                ReplyFormat::Plain,
            )
            .await?;
        Ok(())
    }
}
