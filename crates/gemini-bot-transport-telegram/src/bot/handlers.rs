use crate::bot::transport::{incoming_from_telegram, TelegramTransport};
use anyhow::Result;
use gemini_bot_core::adapter::{caption_matches_trigger, is_text_trigger, MessageAdapter};
use std::sync::Arc;
use teloxide::{prelude::*, utils::command::BotCommands};
use tracing::info;

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Ask Gemini; `/gemini clear` resets the conversation
    #[command(description = "Ask Google Gemini (\"/gemini clear\" resets history).")]
    Gemini(String),
}

/// Whether a plain text message uses the `gemini:` prefix.
///
/// # Examples
///
/// ```
/// use gemini_bot_transport_telegram::bot::handlers::text_has_trigger;
/// assert!(text_has_trigger(Some("gemini: hi")));
/// assert!(!text_has_trigger(Some("hello")));
/// assert!(!text_has_trigger(None));
/// ```
#[must_use]
pub fn text_has_trigger(text: Option<&str>) -> bool {
    text.is_some_and(is_text_trigger)
}

/// Whether a photo caption asks for a vision answer
#[must_use]
pub fn caption_has_trigger(caption: Option<&str>) -> bool {
    caption.is_some_and(caption_matches_trigger)
}

/// Handle a `/gemini` command or a `gemini:` text message
///
/// # Errors
///
/// Returns an error if the model call or the reply fails.
pub async fn handle_text(
    transport: TelegramTransport,
    msg: Message,
    adapter: Arc<MessageAdapter>,
) -> Result<()> {
    let incoming = incoming_from_telegram(&msg);
    let outcome = adapter.handle_text(&incoming, &transport).await?;
    info!(
        user_id = incoming.sender_id,
        chat_id = incoming.chat_id,
        ?outcome,
        "Text request handled"
    );
    Ok(())
}

/// Handle a photo whose caption carries a trigger
///
/// # Errors
///
/// Returns an error if the download, the model call, or the reply fails.
pub async fn handle_photo(
    transport: TelegramTransport,
    msg: Message,
    adapter: Arc<MessageAdapter>,
) -> Result<()> {
    let incoming = incoming_from_telegram(&msg);
    adapter.handle_photo(&incoming, &transport).await?;
    info!(
        user_id = incoming.sender_id,
        chat_id = incoming.chat_id,
        "Photo request handled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_trigger_filter() {
        assert!(caption_has_trigger(Some("/gemini what is it")));
        assert!(caption_has_trigger(Some("gemini:")));
        assert!(!caption_has_trigger(Some("a photo")));
        assert!(!caption_has_trigger(None));
    }

    #[test]
    fn test_command_parses_argument() {
        assert_eq!(
            Command::parse("/gemini what is rust", "bot").ok(),
            Some(Command::Gemini("what is rust".to_string()))
        );
        assert_eq!(
            Command::parse("/gemini", "bot").ok(),
            Some(Command::Gemini(String::new()))
        );
    }
}
