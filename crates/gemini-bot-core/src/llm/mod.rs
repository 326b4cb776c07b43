//! LLM providers and client types
//!
//! Defines the generative-model seam used by the adapter: the turn types that
//! make up a conversation, the per-request model options, and the
//! error taxonomy shared by all providers.

mod http_utils;
/// Implementations of specific LLM providers
pub mod providers;

use crate::config::{
    GEMINI_MAX_OUTPUT_TOKENS, GEMINI_TEMPERATURE, GEMINI_TOP_K, GEMINI_TOP_P,
    SAFETY_CATEGORIES, SAFETY_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// The model stopped the candidate without a terminal answer.
    ///
    /// `details` holds a text rendering of the stopped candidate, which may
    /// still carry partial content.
    #[error("Candidate stopped with finish reason {finish_reason}: {details}")]
    StopCandidate {
        /// Finish reason reported by the API (e.g. `SAFETY`, `RECITATION`)
        finish_reason: String,
        /// Rendering of the candidate payload
        details: String,
    },
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Turn written by the chat user
    User,
    /// Turn produced by the model
    Model,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One piece of a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Plain text
    Text(String),
    /// Binary payload sent inline
    InlineData {
        /// MIME type of `data`
        mime_type: String,
        /// Raw bytes (base64-encoded on the wire)
        data: Vec<u8>,
    },
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    /// Who authored the turn
    pub role: Role,
    /// Ordered parts of the turn
    pub parts: Vec<Part>,
}

impl Content {
    /// Create a user text turn
    #[must_use]
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.to_string())],
        }
    }

    /// Create a model text turn
    #[must_use]
    pub fn model(text: &str) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.to_string())],
        }
    }
}

/// Sampling parameters sent with a request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Top-k sampling
    pub top_k: u32,
    /// Output token cap
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: GEMINI_TEMPERATURE,
            top_p: GEMINI_TOP_P,
            top_k: GEMINI_TOP_K,
            max_output_tokens: GEMINI_MAX_OUTPUT_TOKENS,
        }
    }
}

/// Safety threshold for one harm category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    /// Harm category name
    pub category: String,
    /// Blocking threshold
    pub threshold: String,
}

/// Returns the fully permissive safety settings applied to conversations
#[must_use]
pub fn permissive_safety_settings() -> Vec<SafetySetting> {
    SAFETY_CATEGORIES
        .iter()
        .map(|category| SafetySetting {
            category: (*category).to_string(),
            threshold: SAFETY_THRESHOLD.to_string(),
        })
        .collect()
}

/// Model and request options for a single call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Model identifier, e.g. `gemini-pro`
    pub model_id: String,
    /// Sampling parameters; `None` leaves the model defaults
    pub generation: Option<GenerationConfig>,
    /// Per-category safety thresholds; empty leaves the model defaults
    pub safety_settings: Vec<SafetySetting>,
}

impl ModelSpec {
    /// Conversational model with the fixed generation parameters and
    /// permissive safety settings.
    #[must_use]
    pub fn chat(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            generation: Some(GenerationConfig::default()),
            safety_settings: permissive_safety_settings(),
        }
    }

    /// Vision model called with the backend defaults.
    #[must_use]
    pub fn vision(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            generation: None,
            safety_settings: Vec::new(),
        }
    }
}

/// Interface for generative model backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Send `user_message` after `history` and return the reply text.
    async fn chat_completion(
        &self,
        model: &ModelSpec,
        history: &[Content],
        user_message: &str,
    ) -> Result<String, LlmError>;

    /// Single-shot request with an image and a text prompt.
    async fn analyze_image(
        &self,
        model: &ModelSpec,
        image_bytes: Vec<u8>,
        mime_type: &str,
        text_prompt: &str,
    ) -> Result<String, LlmError>;
}
