//! OpenAI-compatible chat completion client.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::suggestion::{AiSuggestion, parse_suggestion};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f64 = 0.7;

/// Upper bound on the completion response body.
pub const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Errors from the scraper and the completion client.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// AI is switched off or no API key is configured.
    #[error("AI enrichment is disabled")]
    Disabled,

    /// The endpoint rejected the API key (HTTP 401).
    #[error("AI authentication failed: check AI_API_KEY")]
    Authentication,

    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Reading the response body failed.
    #[error("Failed to read response body: {0}")]
    Body(#[source] std::io::Error),

    /// The API answered but not with a usable completion.
    #[error("AI API error: {message}")]
    Api { message: String },

    /// The completion or page could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for EnrichmentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e)
        } else {
            Self::Network(e)
        }
    }
}

impl EnrichmentError {
    /// True when retrying with the same credentials cannot succeed.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication)
    }
}

/// Builder for constructing [`AiClient`] instances.
///
/// # Examples
///
/// ```
/// use marks::ai::AiClientBuilder;
///
/// let client = AiClientBuilder::new()
///     .api_key("sk-test")
///     .model("gpt-4o-mini")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.model(), "gpt-4o-mini");
/// ```
#[derive(Debug, Default)]
pub struct AiClientBuilder {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl AiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Full chat-completions URL, e.g. `https://api.openai.com/v1/chat/completions`.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// Unset fields fall back to `AI_API_KEY`, `AI_ENDPOINT` and `AI_MODEL`,
    /// then to the OpenAI defaults.
    ///
    /// # Errors
    ///
    /// [`EnrichmentError::Disabled`] without an API key,
    /// [`EnrichmentError::InvalidUrl`] for a malformed endpoint.
    pub fn build(self) -> Result<AiClient, EnrichmentError> {
        let api_key = self
            .api_key
            .or_else(|| non_empty_env("AI_API_KEY"))
            .unwrap_or_default();
        if api_key.is_empty() {
            return Err(EnrichmentError::Disabled);
        }

        let endpoint = self
            .endpoint
            .or_else(|| non_empty_env("AI_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        reqwest::Url::parse(&endpoint)
            .map_err(|e| EnrichmentError::InvalidUrl(format!("{endpoint}: {e}")))?;

        let model = self
            .model
            .or_else(|| non_empty_env("AI_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()
            .map_err(EnrichmentError::Network)?;

        Ok(AiClient {
            client,
            api_key,
            endpoint,
            model,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Synchronous client for an OpenAI-compatible chat completions endpoint.
pub struct AiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("api_key", &crate::utils::mask_secret(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl AiClient {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `prompt` as a single user message and returns the first choice's text.
    pub fn chat(&self, prompt: &str) -> Result<String, EnrichmentError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EnrichmentError::Authentication);
        }
        if status != reqwest::StatusCode::OK {
            return Err(EnrichmentError::Http {
                status: status.as_u16(),
            });
        }

        let mut raw = Vec::new();
        response
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut raw)
            .map_err(EnrichmentError::Body)?;

        let parsed: ChatResponse = serde_json::from_slice(&raw)
            .map_err(|e| EnrichmentError::Parse(format!("completion envelope: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| EnrichmentError::Api {
                message: "response contained no choices".to_string(),
            })
    }

    /// Requests a completion and decodes it as a bookmark suggestion.
    pub fn complete(&self, prompt: &str) -> Result<AiSuggestion, EnrichmentError> {
        let content = self.chat(prompt)?;
        parse_suggestion(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::run_blocking;
    use serial_test::serial;
    use std::error::Error as _;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COMPLETIONS_PATH: &str = "/v1/chat/completions";

    fn client_for(url: &str) -> AiClient {
        AiClientBuilder::new()
            .api_key("sk-test-abcd")
            .endpoint(url)
            .model("test-model")
            .build()
            .unwrap()
    }

    #[test]
    #[serial]
    fn build_without_key_is_disabled() {
        // SAFETY: serialized with the other env-reading tests.
        unsafe { std::env::remove_var("AI_API_KEY") };
        let err = AiClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, EnrichmentError::Disabled));
    }

    #[test]
    #[serial]
    fn build_reads_env_fallbacks() {
        // SAFETY: serialized with the other env-reading tests.
        unsafe {
            std::env::set_var("AI_API_KEY", "sk-env");
            std::env::set_var("AI_MODEL", "env-model");
            std::env::remove_var("AI_ENDPOINT");
        }
        let client = AiClientBuilder::new().build().unwrap();
        unsafe {
            std::env::remove_var("AI_API_KEY");
            std::env::remove_var("AI_MODEL");
        }

        assert_eq!(client.model(), "env-model");
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn build_rejects_bad_endpoint() {
        let err = AiClientBuilder::new()
            .api_key("k")
            .endpoint("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidUrl(_)));
    }

    #[test]
    fn debug_masks_api_key() {
        let client = client_for("http://127.0.0.1:9/");
        let debug = format!("{client:?}");
        assert!(debug.contains("***abcd"));
        assert!(!debug.contains("sk-test"));
    }

    /// Mounts a chat-completions mock answering `status` with `body`.
    async fn completions_server(status: u16, body: serde_json::Value) -> (MockServer, String) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(header("authorization", "Bearer sk-test-abcd"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("{}{COMPLETIONS_PATH}", server.uri());
        (server, url)
    }

    #[tokio::test]
    async fn complete_sends_bearer_and_parses_fenced_json() {
        // Arrange
        let content = "```json\n{\"title\": \"Rust\", \"description\": \"Lang\", \"tags\": [\"rust\"]}\n```";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(header("authorization", "Bearer sk-test-abcd"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "temperature": 0.7,
                "messages": [{"role": "user", "content": "describe"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let url = format!("{}{COMPLETIONS_PATH}", server.uri());

        // Act
        let suggestion = run_blocking(move || client_for(&url).complete("describe"))
            .await
            .unwrap();

        // Assert
        assert_eq!(suggestion.title, "Rust");
        assert_eq!(suggestion.description, "Lang");
        assert_eq!(suggestion.tags, vec!["rust"]);
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_error() {
        let (_server, url) = completions_server(401, json!({})).await;

        let err = run_blocking(move || client_for(&url).chat("x"))
            .await
            .unwrap_err();

        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn other_status_is_http_error() {
        let (_server, url) = completions_server(503, json!({})).await;

        let err = run_blocking(move || client_for(&url).chat("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, EnrichmentError::Http { status: 503 }));
    }

    #[tokio::test]
    async fn empty_choices_is_api_error() {
        let (_server, url) = completions_server(200, json!({"choices": []})).await;

        let err = run_blocking(move || client_for(&url).chat("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, EnrichmentError::Api { .. }));
    }

    #[tokio::test]
    async fn malformed_envelope_is_parse_error() {
        let (_server, url) = completions_server(200, json!({"unexpected": true})).await;

        let err = run_blocking(move || client_for(&url).chat("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, EnrichmentError::Parse(_)));
    }

    #[test]
    fn network_error_keeps_source() {
        let reqwest_error = reqwest::blocking::Client::new()
            .get("not-a-valid-url")
            .build()
            .unwrap_err();
        let err = EnrichmentError::from(reqwest_error);
        assert!(err.to_string().contains("Network error"));
        assert!(err.source().is_some());
    }
}
