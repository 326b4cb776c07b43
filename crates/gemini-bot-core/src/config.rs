//! Configuration and settings management
//!
//! Loads Gemini settings from config files and environment variables and
//! defines the fixed generation constants shared by every conversation.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Sampling temperature for conversational requests
pub const GEMINI_TEMPERATURE: f32 = 0.7;
/// Nucleus sampling threshold for conversational requests
pub const GEMINI_TOP_P: f32 = 1.0;
/// Top-k sampling for conversational requests
pub const GEMINI_TOP_K: u32 = 1;
/// Output token cap for conversational requests
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Harm categories that receive an explicit safety threshold
pub const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
/// Threshold applied to every category in [`SAFETY_CATEGORIES`]
pub const SAFETY_THRESHOLD: &str = "BLOCK_NONE";

/// Maximum number of turns kept in a conversation before trimming
pub const HISTORY_MAX_TURNS: usize = 10;
/// Number of oldest turns dropped once the history exceeds the maximum
pub const HISTORY_TRIM_STEP: usize = 2;

/// Bot command that triggers a text request (`/gemini`)
pub const TRIGGER_COMMAND: &str = "gemini";
/// Plain-text prefix that triggers a text request
pub const TEXT_TRIGGER_PREFIX: &str = "gemini:";
/// Caption prefixes that trigger a vision request
pub const CAPTION_TRIGGER_PREFIXES: &[&str] = &["gemini:", "/gemini"];
/// Literal input that resets a user's history
pub const CLEAR_COMMAND: &str = "clear";

/// MIME type attached to downloaded photos
pub const VISION_MIME_TYPE: &str = "image/jpeg";
/// Prompt used when a photo caption carries only the trigger
pub const DEFAULT_VISION_PROMPT: &str = "Describe this image.";

/// Default conversational model
pub const DEFAULT_CHAT_MODEL: &str = "gemini-pro";
/// Default vision-capable model
pub const DEFAULT_VISION_MODEL: &str = "gemini-pro-vision";
/// Default Generative Language API base URL
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Raw characters per answer part, leaving room for the reply prefix
pub const ANSWER_CHUNK_CHARS: usize = 4000;

/// Default HTTP timeout for model requests
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 60;

// Telegram API retry configuration
/// Maximum attempts for retried transport operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff between attempts
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single backoff
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Get the LLM HTTP timeout from env or default.
///
/// Environment variable: `LLM_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_llm_http_timeout_secs() -> u64 {
    std::env::var("LLM_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LLM_HTTP_TIMEOUT_SECS)
}

/// Build the layered configuration shared by all settings structs.
///
/// Sources, lowest priority first: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__*` variables, then bare environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read or parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Gemini backend settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiSettings {
    /// API key (`GOOGLE_GEMINI_KEY`)
    pub google_gemini_key: Option<String>,
    /// Model used for conversations
    #[serde(default = "default_chat_model")]
    pub gemini_chat_model: String,
    /// Model used for one-shot photo requests
    #[serde(default = "default_vision_model")]
    pub gemini_vision_model: String,
    /// Generative Language API base URL
    #[serde(default = "default_api_base")]
    pub gemini_api_base: String,
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_GEMINI_API_BASE.to_string()
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            google_gemini_key: None,
            gemini_chat_model: default_chat_model(),
            gemini_vision_model: default_vision_model(),
            gemini_api_base: default_api_base(),
        }
    }
}

impl GeminiSettings {
    /// Load settings from config files and the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// API key as sent to the backend. A missing key is sent empty and
    /// rejected by the API on first use.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.google_gemini_key.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("GOOGLE_GEMINI_KEY", "test-key");
        env::set_var("GEMINI_VISION_MODEL", "gemini-1.5-flash");

        let settings = GeminiSettings::new()?;
        assert_eq!(settings.google_gemini_key.as_deref(), Some("test-key"));
        assert_eq!(settings.gemini_vision_model, "gemini-1.5-flash");
        assert_eq!(settings.gemini_chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(settings.gemini_api_base, DEFAULT_GEMINI_API_BASE);

        env::remove_var("GOOGLE_GEMINI_KEY");
        env::remove_var("GEMINI_VISION_MODEL");

        // Empty values are treated as unset
        env::set_var("GOOGLE_GEMINI_KEY", "");
        let settings = GeminiSettings::new()?;
        assert_eq!(settings.google_gemini_key, None);
        assert_eq!(settings.api_key(), "");
        env::remove_var("GOOGLE_GEMINI_KEY");

        Ok(())
    }
}
