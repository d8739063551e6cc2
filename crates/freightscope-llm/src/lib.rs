//! Reasoning backend abstraction for freightscope.
//!
//! The investigation loop talks to a tool-calling language model through the
//! [`LlmBackend`] trait. A request carries a system prompt, the conversation
//! so far and the tool schemas; a response carries text and/or tool-use
//! blocks.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  LlmBackend trait                    │
//! │  - complete() -> CompletionResponse  │
//! └──────────────────────────────────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!    ┌───────────┐      ┌─────────────┐
//!    │ Anthropic │      │ MockBackend │
//!    └───────────┘      └─────────────┘
//! ```

pub mod anthropic;
pub mod backend;
pub mod error;
pub mod types;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use backend::{LlmBackend, SharedBackend, with_retry};
#[cfg(any(test, feature = "testing"))]
pub use backend::MockBackend;
pub use error::{LlmError, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolResultBlock, ToolUseBlock, Usage,
};
