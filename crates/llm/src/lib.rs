//! Cadence language-model adapter.
//!
//! Implements [`pipeline::LanguageModel`] for Anthropic's Messages API. Other
//! providers are added as new types in this crate without any changes to the
//! `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing,
//! and mapping of HTTP status codes onto [`pipeline::LlmError`] live here. The
//! [`pipeline`] crate sees only [`pipeline::LanguageModel`].

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{CompletionRequest, LanguageModel, LlmError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Connection settings for [`AnthropicProvider`].
#[derive(Clone)]
pub struct AnthropicSettings {
    pub api_key: String,
    pub model: String,
    /// Scheme and host; `/v1/messages` is appended.
    pub base_url: String,
    /// Transport-level timeout for one HTTP exchange.
    pub timeout: Duration,
}

impl std::fmt::Debug for AnthropicSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Anthropic Messages API client.
pub struct AnthropicProvider {
    client: Client,
    settings: AnthropicSettings,
    endpoint: String,
}

impl AnthropicProvider {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// [`LlmError::Unavailable`] if the TLS backend cannot be initialised.
    pub fn new(settings: AnthropicSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::Unavailable {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let endpoint = format!("{}/v1/messages", settings.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            settings,
            endpoint,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl LanguageModel for AnthropicProvider {
    fn model(&self) -> &str {
        &self.settings.model
    }

    #[instrument(skip_all, fields(model = %self.settings.model, max_tokens = request.max_tokens))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        after: self.settings.timeout,
                    }
                } else {
                    LlmError::Unavailable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            tracing::warn!(?retry_after, "rate limited");
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthDenied { message },
                _ => LlmError::Unavailable {
                    message: format!("HTTP {}: {message}", status.as_u16()),
                },
            });
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| LlmError::Malformed {
            message: format!("unexpected response body: {e}"),
        })?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(LlmError::Malformed {
                message: "response contained no text".to_string(),
            });
        }

        tracing::debug!(
            chars = text.len(),
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
            "completion received"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(server: &MockServer) -> AnthropicProvider {
        AnthropicProvider::new(AnthropicSettings {
            api_key: "sk-ant-test".to_string(),
            model: "claude-test".to_string(),
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("be brief", "say hi", 64)
    }

    #[tokio::test]
    async fn sends_messages_request_and_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "max_tokens": 64,
                "system": "be brief",
                "messages": [{"role": "user", "content": "say hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Hello"},
                    {"type": "text", "text": " there"}
                ],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server).complete(&request()).await.unwrap();
        assert_eq!(text, "Hello there");
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
            .mount(&server)
            .await;

        let error = provider(&server).complete(&request()).await.unwrap_err();
        assert_eq!(
            error,
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_denied_with_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let error = provider(&server).complete(&request()).await.unwrap_err();
        assert_eq!(
            error,
            LlmError::AuthDenied {
                message: "invalid x-api-key".to_string()
            }
        );
    }

    #[tokio::test]
    async fn overloaded_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let error = provider(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(error, LlmError::Unavailable { message } if message.contains("529")));
    }

    #[tokio::test]
    async fn empty_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let error = provider(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(error, LlmError::Malformed { .. }));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let settings = AnthropicSettings {
            api_key: "sk-ant-secret".to_string(),
            model: "m".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(!format!("{settings:?}").contains("secret"));
    }
}
