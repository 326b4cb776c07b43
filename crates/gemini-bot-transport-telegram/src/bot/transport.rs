use crate::bot::resilient::{
    delete_message_resilient, download_file_resilient, send_message_resilient,
};
use async_trait::async_trait;
use gemini_bot_core::transport::{
    ChatTransport, IncomingMessage, PhotoVariant, ReplyFormat, SentMessage, TransportError,
};
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ParseMode, ReplyParameters};

/// Telegram-backed [`ChatTransport`].
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Create a transport sending through `bot`.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn reply(
        &self,
        to: &IncomingMessage,
        text: &str,
        format: ReplyFormat,
    ) -> Result<SentMessage, TransportError> {
        let chat_id = ChatId(to.chat_id);
        let reply_to = MessageId(to.message_id);

        let sent = match format {
            // A rejected markup is not transient; fail fast so the caller can fall back
            ReplyFormat::Html => self
                .bot
                .send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .reply_parameters(ReplyParameters::new(reply_to))
                .await
                .map_err(|e| TransportError::Api(e.to_string()))?,
            ReplyFormat::Plain => send_message_resilient(&self.bot, chat_id, text, Some(reply_to))
                .await
                .map_err(|e| TransportError::Api(e.to_string()))?,
        };

        Ok(SentMessage {
            chat_id: sent.chat.id.0,
            message_id: sent.id.0,
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        download_file_resilient(&self.bot, file_id)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))
    }

    async fn delete_message(&self, message: &SentMessage) -> Result<(), TransportError> {
        delete_message_resilient(&self.bot, ChatId(message.chat_id), MessageId(message.message_id))
            .await
            .map_err(|e| TransportError::Api(e.to_string()))
    }
}

/// Converts a teloxide message into the adapter's message type.
#[must_use]
pub fn incoming_from_telegram(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        sender_id: crate::bot::handlers::get_user_id_safe(msg),
        text: msg.text().map(str::to_string),
        caption: msg.caption().map(str::to_string),
        photo: msg
            .photo()
            .unwrap_or_default()
            .iter()
            .map(|p| PhotoVariant {
                file_id: p.file.id.0.clone(),
                file_size: p.file.size,
                width: p.width,
                height: p.height,
            })
            .collect(),
    }
}
