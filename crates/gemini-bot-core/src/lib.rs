#![deny(missing_docs)]
//! Gemini bot core library.
//!
//! Transport-agnostic message adapter: per-user conversation sessions,
//! the Gemini client, reply markup conversion and the chat transport seam.

/// Text and photo message handling.
pub mod adapter;
/// Configuration management.
pub mod config;
/// LLM providers and client types.
pub mod llm;
/// Markdown to Telegram markup conversion.
pub mod markup;
/// Recovery of partial text from stopped candidates.
pub mod salvage;
/// Conversation handles and the session registry.
pub mod session;
/// Chat transport interface.
pub mod transport;
/// Utility functions.
pub mod utils;
