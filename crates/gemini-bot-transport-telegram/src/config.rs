//! Telegram transport settings.

use config::ConfigError;
use gemini_bot_core::config::GeminiSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Gemini backend settings.
    pub gemini: Arc<GeminiSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(gemini: GeminiSettings, telegram: TelegramSettings) -> Self {
        Self {
            gemini: Arc::new(gemini),
            telegram: Arc::new(telegram),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the token is missing.
    pub fn new() -> Result<Self, ConfigError> {
        gemini_bot_core::config::build_config()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_token_loaded_from_env() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "123456:ABC-DEF");
        let settings = TelegramSettings::new()?;
        assert_eq!(settings.telegram_token, "123456:ABC-DEF");
        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_bundle_shares_settings() {
        let bundle = BotSettings::new(
            GeminiSettings::default(),
            TelegramSettings {
                telegram_token: "t".to_string(),
            },
        );
        let cloned = bundle.clone();
        assert!(Arc::ptr_eq(&bundle.gemini, &cloned.gemini));
        assert_eq!(cloned.gemini.gemini_chat_model, "gemini-pro");
    }
}
