//! Conversation and completion types shared by every backend.
//!
//! Field names and serde tags match the Anthropic Messages API, so a
//! request serializes straight onto the wire. Other backends (the mock
//! included) treat them as plain data.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// One model turn: the conversation, the tools on offer and a token cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            system: None,
            tools: Vec::new(),
        }
    }

    pub fn with_system(self, system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..self
        }
    }

    pub fn with_tools(self, tools: Vec<ToolDefinition>) -> Self {
        Self { tools, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// Echo of a model turn, tool uses included, so the next turn can
    /// answer them.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Blocks(blocks),
        }
    }

    /// Tool outputs travel back in a user turn; order is preserved.
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: Role::User,
            content: Content::Blocks(results.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Either a bare string or a list of blocks; both are valid on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Text only; tool blocks contribute nothing.
    pub fn to_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks.iter().filter_map(ContentBlock::as_text).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A tool invocation pulled out of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Output for one [`ToolUseBlock`], keyed by its id. Failures are sent
/// with `is_error` so the model can correct itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn success(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_status(tool_use_id.into(), content.into(), false)
    }

    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_status(tool_use_id.into(), content.into(), true)
    }

    fn with_status(tool_use_id: String, content: String, is_error: bool) -> Self {
        Self {
            tool_use_id,
            content,
            is_error,
        }
    }
}

impl From<ToolResultBlock> for ContentBlock {
    fn from(result: ToolResultBlock) -> Self {
        let ToolResultBlock {
            tool_use_id,
            content,
            is_error,
        } = result;
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        }
    }
}

/// A tool as the model sees it: name, prose and a JSON Schema for input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// The schema's `required` list; empty when absent.
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// One model turn's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Vec<ContentBlock>,
        stop_reason: StopReason,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            content,
            stop_reason: Some(stop_reason),
            usage,
        }
    }

    /// Requested tool invocations, in the order the model listed them.
    pub fn tool_uses(&self) -> Vec<ToolUseBlock> {
        let mut uses = Vec::new();
        for block in &self.content {
            if let ContentBlock::ToolUse { id, name, input } = block {
                uses.push(ToolUseBlock {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
            }
        }
        uses
    }

    pub fn text_blocks(&self) -> Vec<&str> {
        self.content.iter().filter_map(ContentBlock::as_text).collect()
    }

    pub fn text(&self) -> String {
        self.text_blocks().concat()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }

    /// Check the structural invariants the investigation loop relies on.
    ///
    /// Tool-use ids must be non-empty and unique, names non-empty, and inputs
    /// JSON objects.
    pub fn validate(&self) -> Result<(), LlmError> {
        let mut ids = HashSet::new();
        let uses = self.content.iter().enumerate().filter_map(|(at, block)| match block {
            ContentBlock::ToolUse { id, name, input } => Some((at, id, name, input)),
            _ => None,
        });

        for (at, id, name, input) in uses {
            let problem = if id.trim().is_empty() {
                format!("tool_use block {} has an empty id", at)
            } else if name.trim().is_empty() {
                format!("tool_use '{}' has an empty name", id)
            } else if !ids.insert(id.as_str()) {
                format!("duplicate tool_use id '{}'", id)
            } else if !input.is_object() {
                format!("tool_use '{}' input must be an object", id)
            } else {
                continue;
            };
            return Err(LlmError::InvalidResponse(problem));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_response(blocks: Vec<ContentBlock>) -> CompletionResponse {
        CompletionResponse::new("msg_1", "model", blocks, StopReason::ToolUse, Usage::new(5, 5))
    }

    #[test]
    fn test_content_block_wire_format() {
        let block = ContentBlock::tool_use("tu_1", "preview_aggregation", json!({"metric": "cost"}));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["name"], "preview_aggregation");

        let result: ContentBlock = ToolResultBlock::error("tu_1", "boom").into();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["is_error"], true);
    }

    #[test]
    fn test_response_text_and_tool_uses() {
        let response = tool_response(vec![
            ContentBlock::text("Looking at carriers. "),
            ContentBlock::tool_use("tu_1", "explore_field", json!({"field": "carrier"})),
            ContentBlock::text("Then costs."),
        ]);

        assert!(response.has_tool_use());
        assert_eq!(response.text(), "Looking at carriers. Then costs.");
        assert_eq!(response.text_blocks().len(), 2);
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].name, "explore_field");
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let response = tool_response(vec![
            ContentBlock::tool_use("tu_1", "a", json!({})),
            ContentBlock::tool_use("tu_1", "b", json!({})),
        ]);
        assert!(response.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_object_input() {
        let response = tool_response(vec![ContentBlock::tool_use("tu_1", "a", json!("x"))]);
        let err = response.validate().unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn test_required_fields() {
        let def = ToolDefinition::new(
            "t",
            "d",
            json!({"type": "object", "properties": {}, "required": ["metric", "group_by"]}),
        );
        assert_eq!(def.required_fields(), vec!["metric", "group_by"]);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = Usage::default();
        total += Usage::new(10, 4);
        total += Usage::new(1, 2);
        assert_eq!(total, Usage::new(11, 6));
        assert_eq!(total.total(), 17);
    }

    #[test]
    fn test_tool_results_message_keeps_order() {
        let msg = Message::tool_results(vec![
            ToolResultBlock::success("a", "1"),
            ToolResultBlock::success("b", "2"),
        ]);
        match msg.content {
            Content::Blocks(blocks) => {
                let ids: Vec<_> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
                        _ => None,
                    })
                    .collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            Content::Text(_) => panic!("expected blocks"),
        }
    }
}
