use crate::llm::http_utils::{create_http_client, send_json_request};
use crate::llm::{Content, GenerativeModel, LlmError, ModelSpec, Part};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Finish reasons that mark a candidate as a complete answer
const TERMINAL_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS", "FINISH_REASON_UNSPECIFIED"];

/// LLM provider implementation for Google Gemini
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    api_base: String,
}

impl GeminiProvider {
    /// Create a provider against `api_base`, e.g. the public
    /// `https://generativelanguage.googleapis.com/v1beta`
    #[must_use]
    pub fn with_api_base(api_key: String, api_base: String) -> Self {
        Self {
            http_client: create_http_client(),
            api_key,
            api_base,
        }
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!(
            "{}/models/{model_id}:generateContent",
            self.api_base.trim_end_matches('/')
        )
    }

    async fn generate(&self, model: &ModelSpec, contents: &[Content]) -> Result<String, LlmError> {
        let url = self.endpoint(&model.model_id);
        let body = build_request_body(model, contents);
        let res_json = send_json_request(
            &self.http_client,
            &url,
            &body,
            &[("x-goog-api-key", self.api_key.as_str())],
        )
        .await?;
        parse_generate_response(&res_json)
    }
}

#[async_trait]
impl GenerativeModel for GeminiProvider {
    async fn chat_completion(
        &self,
        model: &ModelSpec,
        history: &[Content],
        user_message: &str,
    ) -> Result<String, LlmError> {
        let mut contents = history.to_vec();
        contents.push(Content::user(user_message));
        debug!(
            model = %model.model_id,
            history_len = history.len(),
            "Sending Gemini chat request"
        );
        self.generate(model, &contents).await
    }

    async fn analyze_image(
        &self,
        model: &ModelSpec,
        image_bytes: Vec<u8>,
        mime_type: &str,
        text_prompt: &str,
    ) -> Result<String, LlmError> {
        debug!(
            model = %model.model_id,
            image_bytes = image_bytes.len(),
            "Sending Gemini vision request"
        );
        let contents = [Content {
            role: crate::llm::Role::User,
            parts: vec![
                Part::InlineData {
                    mime_type: mime_type.to_string(),
                    data: image_bytes,
                },
                Part::Text(text_prompt.to_string()),
            ],
        }];
        self.generate(model, &contents).await
    }
}

fn part_to_json(part: &Part) -> Value {
    match part {
        Part::Text(text) => json!({ "text": text }),
        Part::InlineData { mime_type, data } => json!({
            "inline_data": {
                "mime_type": mime_type,
                "data": BASE64.encode(data)
            }
        }),
    }
}

fn build_request_body(model: &ModelSpec, contents: &[Content]) -> Value {
    let contents: Vec<Value> = contents
        .iter()
        .map(|c| {
            json!({
                "role": c.role.as_str(),
                "parts": c.parts.iter().map(part_to_json).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if let Some(generation) = &model.generation {
        body["generationConfig"] = json!(generation);
    }
    if !model.safety_settings.is_empty() {
        body["safetySettings"] = json!(model.safety_settings);
    }
    body
}

/// Extracts the reply text of the first candidate.
///
/// A candidate whose finish reason is not terminal is reported as
/// `LlmError::StopCandidate` carrying a rendering of the candidate.
fn parse_generate_response(response: &Value) -> Result<String, LlmError> {
    let Some(candidate) = response.get("candidates").and_then(|c| c.get(0)) else {
        if let Some(reason) = response
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            return Err(LlmError::ApiError(format!("Prompt blocked: {reason}")));
        }
        return Err(LlmError::ApiError("Empty response: no candidates".to_string()));
    };

    let finish_reason = candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .unwrap_or("FINISH_REASON_UNSPECIFIED");

    if !TERMINAL_FINISH_REASONS.contains(&finish_reason) {
        warn!(finish_reason, "Gemini stopped the candidate early");
        return Err(LlmError::StopCandidate {
            finish_reason: finish_reason.to_string(),
            details: render_candidate(candidate, finish_reason),
        });
    }

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::ApiError(
            "Response candidate contained no text".to_string(),
        ));
    }
    Ok(text)
}

/// Renders a candidate in the protobuf text layout used by Google client
/// libraries, e.g. `content { parts { text: "..." } role: "model" }`.
fn render_candidate(candidate: &Value, finish_reason: &str) -> String {
    let mut out = String::new();

    if let Some(content) = candidate.get("content") {
        out.push_str("content {\n");
        let parts = content
            .get("parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for text in parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
        {
            let _ = write!(
                out,
                "  parts {{\n    text: \"{}\"\n  }}\n",
                escape_proto_string(text)
            );
        }
        if let Some(role) = content.get("role").and_then(Value::as_str) {
            let _ = writeln!(out, "  role: \"{role}\"");
        }
        out.push_str("}\n");
    }

    let _ = write!(out, "finish_reason: {finish_reason}");
    out
}

fn escape_proto_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}
