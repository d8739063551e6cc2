//! Anthropic Messages API backend.
//!
//! One POST to `/v1/messages` per model turn. Tool definitions travel in the
//! request body as-is; the reply's `tool_use` blocks come back as
//! [`ContentBlock::ToolUse`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, Result, parse_retry_after};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection settings for [`AnthropicBackend`].
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub api_version: String,
    pub timeout: Duration,
    pub max_retries: u32,
    /// First retry delay; doubles per attempt unless the provider sends
    /// `retry-after`.
    pub retry_backoff: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_URL.into(),
            api_version: ANTHROPIC_VERSION.into(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_retry_backoff(self, retry_backoff: Duration) -> Self {
        Self {
            retry_backoff,
            ..self
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let invalid = |what: &str| LlmError::Config(format!("Invalid {} header value", what));

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&self.api_key).map_err(|_| invalid("x-api-key"))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.api_version).map_err(|_| invalid("anthropic-version"))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }
}

/// [`LlmBackend`] over the Anthropic Messages API.
pub struct AnthropicBackend {
    client: Client,
    endpoint: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("Anthropic API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(config.headers()?)
            .build()
            .map_err(|e| LlmError::Config(format!("Could not build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn shared(config: AnthropicConfig) -> Result<Arc<dyn LlmBackend>> {
        Ok(Arc::new(Self::new(config)?))
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, retry_after, &body));
        }

        let reply: MessagesReply = serde_json::from_slice(&response.bytes().await?)?;
        let completion = reply.into_completion();
        completion.validate()?;
        Ok(completion)
    }
}

/// Map a non-2xx reply onto the retry taxonomy. 429 and 529 (overloaded)
/// are the only statuses worth waiting on.
fn classify_failure(status: StatusCode, retry_after: Option<Duration>, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorReply>(body)
        .map(|reply| reply.error.message)
        .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

    match status.as_u16() {
        401 | 403 => LlmError::Auth(message),
        429 | 529 => LlmError::RateLimit {
            message,
            retry_after,
        },
        code if status.is_server_error() => {
            LlmError::Backend(format!("Provider failed with {}: {}", code, message))
        }
        _ => LlmError::Backend(message),
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling Anthropic"
        );

        with_retry(self.max_retries, self.retry_backoff, "anthropic", || {
            self.send_once(&request)
        })
        .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[derive(Debug, serde::Deserialize)]
struct MessagesReply {
    id: String,
    model: String,
    content: Vec<ReplyBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ReplyUsage,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Thinking, citations and anything newer are dropped.
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReplyUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorReply {
    error: ErrorDetail,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    message: String,
}

impl MessagesReply {
    fn into_completion(self) -> CompletionResponse {
        let mut content = Vec::with_capacity(self.content.len());
        for block in self.content {
            match block {
                ReplyBlock::Text { text } => content.push(ContentBlock::Text { text }),
                ReplyBlock::ToolUse { id, name, input } => {
                    content.push(ContentBlock::ToolUse { id, name, input })
                }
                ReplyBlock::Ignored => {}
            }
        }

        // Refusals and future reasons end the turn like a normal stop.
        let stop_reason = self.stop_reason.map(|reason| match reason.as_str() {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        });

        CompletionResponse {
            id: self.id,
            model: self.model,
            content,
            stop_reason,
            usage: Usage::new(self.usage.input_tokens, self.usage.output_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(value: serde_json::Value) -> CompletionResponse {
        serde_json::from_value::<MessagesReply>(value)
            .unwrap()
            .into_completion()
    }

    #[test]
    fn test_config_builder() {
        let config = AnthropicConfig::new("key")
            .with_base_url("http://localhost:9000/")
            .with_max_retries(1);
        assert_eq!(config.api_version, ANTHROPIC_VERSION);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.endpoint(), "http://localhost:9000/v1/messages");
    }

    #[test]
    fn test_blank_or_malformed_key_rejected() {
        assert!(AnthropicBackend::new(AnthropicConfig::new("  ")).is_err());
        assert!(AnthropicBackend::new(AnthropicConfig::new("bad\nkey")).is_err());
        assert!(AnthropicBackend::new(AnthropicConfig::new("sk-ant-test")).is_ok());
    }

    #[test]
    fn test_reply_with_tool_use() {
        let response = reply(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude",
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "tu_1", "name": "explore_field", "input": {"field": "carrier"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }));

        assert_eq!(response.content.len(), 2);
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.usage.total(), 19);
        assert_eq!(response.tool_uses()[0].name, "explore_field");
        assert!(response.validate().is_ok());
    }

    #[test]
    fn test_unrecognized_stop_reason_ends_turn() {
        let response = reply(json!({
            "id": "msg_2",
            "model": "claude",
            "content": [{"type": "text", "text": "done"}],
            "stop_reason": "refusal"
        }));
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn test_classify_failure() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let wait = Some(Duration::from_secs(3));

        let err = classify_failure(StatusCode::from_u16(529).unwrap(), wait, body);
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), wait);

        let err = classify_failure(StatusCode::UNAUTHORIZED, None, body);
        assert!(matches!(err, LlmError::Auth(ref m) if m == "Overloaded"));
        assert!(!err.is_retryable());

        let err = classify_failure(StatusCode::BAD_GATEWAY, None, "<html>");
        assert!(matches!(err, LlmError::Backend(ref m) if m.contains("502")));
        assert!(!err.is_retryable());
    }
}
