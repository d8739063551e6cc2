//! The reasoning backend trait and shared helpers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Run an async operation with exponential backoff.
///
/// Only retryable errors (network, rate limit) are retried. A provider
/// supplied `retry-after` takes precedence over the computed backoff.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let wait = e.retry_after().unwrap_or(backoff);
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A tool-calling language model service.
///
/// Implementations must accept native tool schemas in
/// [`CompletionRequest::tools`] and return structured tool-use blocks.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Check that the backend is reachable and configured.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// A backend shared across requests.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::MockBackend;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use crate::types::{ContentBlock, StopReason, Usage};
    use parking_lot::Mutex;

    /// One scripted reply.
    #[derive(Debug, Clone)]
    enum Reply {
        Response(CompletionResponse),
        Failure(String),
    }

    /// A scripted backend for deterministic tests.
    ///
    /// Replies are returned in order. Once the script runs out the backend
    /// errors, unless it was built with [`MockBackend::repeating`], in which
    /// case the last reply is returned forever.
    #[derive(Debug)]
    pub struct MockBackend {
        replies: Mutex<Vec<Reply>>,
        repeat_last: bool,
        delay: Option<Duration>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockBackend {
        /// Return the given responses in order.
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                replies: Mutex::new(responses.into_iter().map(Reply::Response).collect()),
                repeat_last: false,
                delay: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// A single end-of-turn text response.
        pub fn with_text(text: impl Into<String>) -> Self {
            Self::new(vec![Self::text_response(text)])
        }

        /// Return the same response for every call.
        pub fn repeating(response: CompletionResponse) -> Self {
            let mut backend = Self::new(vec![response]);
            backend.repeat_last = true;
            backend
        }

        /// Fail every call with a backend error.
        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                replies: Mutex::new(vec![Reply::Failure(message.into())]),
                repeat_last: true,
                delay: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Append a failure after the scripted responses.
        pub fn then_fail(self, message: impl Into<String>) -> Self {
            self.replies.lock().push(Reply::Failure(message.into()));
            self
        }

        /// Sleep before answering each call.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Build an end-of-turn text response.
        pub fn text_response(text: impl Into<String>) -> CompletionResponse {
            CompletionResponse::new(
                "mock_msg",
                "mock-model",
                vec![ContentBlock::text(text)],
                StopReason::EndTurn,
                Usage::new(10, 20),
            )
        }

        /// Build a response requesting one tool invocation.
        pub fn tool_response(
            id: impl Into<String>,
            name: impl Into<String>,
            input: serde_json::Value,
        ) -> CompletionResponse {
            CompletionResponse::new(
                "mock_msg",
                "mock-model",
                vec![ContentBlock::tool_use(id, name, input)],
                StopReason::ToolUse,
                Usage::new(10, 20),
            )
        }

        /// All requests received so far.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().clone()
        }

        /// Number of requests received so far.
        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().push(request);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let reply = {
                let mut replies = self.replies.lock();
                if replies.is_empty() {
                    None
                } else if self.repeat_last && replies.len() == 1 {
                    Some(replies[0].clone())
                } else {
                    Some(replies.remove(0))
                }
            };

            match reply {
                Some(Reply::Response(response)) => Ok(response),
                Some(Reply::Failure(message)) => Err(LlmError::Backend(message)),
                None => Err(LlmError::Backend(
                    "MockBackend: no more responses available".to_string(),
                )),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }
}
