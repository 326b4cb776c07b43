//! Chat transport interface.
//!
//! The adapter only sees the chat surface through [`ChatTransport`]: reply to
//! a message, download an attachment, delete a message it sent. Concrete
//! transports convert their native message type into [`IncomingMessage`].

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a chat transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The chat API rejected or failed a request
    #[error("Transport API error: {0}")]
    Api(String),
    /// An attachment could not be downloaded
    #[error("Download failed: {0}")]
    Download(String),
}

/// One resolution of an attached photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoVariant {
    /// Transport file identifier
    pub file_id: String,
    /// File size in bytes
    pub file_size: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Inbound chat message as seen by the adapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the message arrived in
    pub chat_id: i64,
    /// Message identifier within the chat
    pub message_id: i32,
    /// Sender identifier, 0 when the transport has no sender
    pub sender_id: i64,
    /// Message text, if any
    pub text: Option<String>,
    /// Caption of an attachment, if any
    pub caption: Option<String>,
    /// Available resolutions of an attached photo
    pub photo: Vec<PhotoVariant>,
}

impl IncomingMessage {
    /// Registry key of the sender
    #[must_use]
    pub fn user_key(&self) -> String {
        self.sender_id.to_string()
    }
}

/// Reference to a message the transport has sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    /// Chat of the sent message
    pub chat_id: i64,
    /// Identifier of the sent message
    pub message_id: i32,
}

/// How reply text should be interpreted by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Send as-is
    Plain,
    /// Parse as Telegram HTML
    Html,
}

/// Chat surface used by the adapter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Reply to `to` with `text`
    async fn reply(
        &self,
        to: &IncomingMessage,
        text: &str,
        format: ReplyFormat,
    ) -> Result<SentMessage, TransportError>;

    /// Download the file identified by `file_id` into memory
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError>;

    /// Delete a previously sent message
    async fn delete_message(&self, message: &SentMessage) -> Result<(), TransportError>;
}
