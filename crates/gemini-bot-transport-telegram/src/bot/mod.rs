/// Trigger filters and endpoint logic
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// `ChatTransport` implementation on top of a teloxide `Bot`
pub mod transport;

pub use transport::TelegramTransport;
