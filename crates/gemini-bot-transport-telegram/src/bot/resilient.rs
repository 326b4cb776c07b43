//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Wrappers around idempotent-enough Telegram calls that retry transient
//! network failures using exponential backoff with jitter.
//!
//! # Usage
//!
//! ```ignore
//! use gemini_bot_transport_telegram::bot::resilient::{delete_message_resilient, send_message_resilient};
//!
//! let msg = send_message_resilient(&bot, chat_id, "Please wait", Some(msg.id)).await?;
//! delete_message_resilient(&bot, chat_id, msg.id).await?;
//! ```

use anyhow::Result;
use gemini_bot_core::utils::retry_transport_operation;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, Message, MessageId, ReplyParameters};
use tracing::debug;

/// Send a message with automatic retry on network failures.
///
/// # Arguments
///
/// * `bot` - The Telegram bot instance
/// * `chat_id` - Target chat ID
/// * `text` - Message text to send
/// * `reply_to` - Message to reply to, if any
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let text = text.into();
    retry_transport_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(id));
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Delete a message with automatic retry on network failures.
///
/// A message that is already gone counts as deleted.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn delete_message_resilient(bot: &Bot, chat_id: ChatId, msg_id: MessageId) -> Result<()> {
    const ERROR_NOT_FOUND: &str = "message to delete not found";

    retry_transport_operation(|| async {
        match bot.delete_message(chat_id, msg_id).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains(ERROR_NOT_FOUND) => {
                debug!("Message delete skipped: {e}");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("Telegram delete error: {e}")),
        }
    })
    .await
}

/// Download a file into memory with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn download_file_resilient(bot: &Bot, file_id: &str) -> Result<Vec<u8>> {
    retry_transport_operation(|| async {
        let file = bot.get_file(FileId(file_id.to_owned())).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok(buf)
    })
    .await
}
