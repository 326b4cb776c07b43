//! HTTP utilities for LLM providers
//!
//! Request/response handling shared by provider implementations.

use crate::config::get_llm_http_timeout_secs;
use crate::llm::LlmError;
use crate::utils::truncate_str;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Maximum number of characters of an error body kept in `LlmError::ApiError`
const ERROR_BODY_LIMIT: usize = 500;

/// Creates an HTTP client configured with the standard LLM timeout.
///
/// Uses `LLM_HTTP_TIMEOUT_SECS` environment variable or the default.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_llm_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends an HTTP POST request with JSON body and returns parsed JSON response.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::ApiError` on non-success status codes,
/// or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
    extra_headers: &[(&str, &str)],
) -> Result<Value, LlmError> {
    let mut request = client.post(url).json(body);

    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError(describe_error_body(
            status.as_u16(),
            &error_text,
        )));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

/// Formats a non-success response body, hiding HTML error pages from proxies.
fn describe_error_body(status: u16, error_text: &str) -> String {
    let trimmed = error_text.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("{status} (Server returned HTML error page)");
    }

    if error_text.chars().count() > ERROR_BODY_LIMIT {
        format!(
            "{status} - {}... (truncated)",
            truncate_str(error_text, ERROR_BODY_LIMIT)
        )
    } else {
        format!("{status} - {error_text}")
    }
}
