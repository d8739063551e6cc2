//! Request, reasoning trace and result types.

use serde::{Deserialize, Serialize};

use freightscope_llm::Usage;

use crate::classifier::Classification;
use crate::error::{InvestigateError, Result};
use crate::mode::InvestigationMode;
use crate::visualization::Visualization;

/// Answer returned when an investigation fails internally.
pub const FAILURE_ANSWER: &str =
    "I'm sorry, something went wrong while investigating your question. Please try again.";

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// A prior conversation message supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
}

/// One question to investigate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationRequest {
    pub question: String,
    pub customer_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
    /// Skips classification for loop budgeting; the classifier still runs.
    #[serde(default)]
    pub force_mode: Option<InvestigationMode>,
    #[serde(default = "default_show_reasoning")]
    pub show_reasoning: bool,
}

fn default_show_reasoning() -> bool {
    true
}

impl InvestigationRequest {
    pub fn new(question: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            customer_id: customer_id.into(),
            user_id: String::new(),
            conversation_history: Vec::new(),
            force_mode: None,
            show_reasoning: true,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_mode(mut self, mode: InvestigationMode) -> Self {
        self.force_mode = Some(mode);
        self
    }

    pub fn with_show_reasoning(mut self, show: bool) -> Self {
        self.show_reasoning = show;
        self
    }

    /// Reject requests without a question or customer.
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(InvestigateError::InvalidRequest(
                "question is required".to_string(),
            ));
        }
        if self.customer_id.trim().is_empty() {
            return Err(InvestigateError::InvalidRequest(
                "customer_id is required".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reasoning trace
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Routing,
    Thinking,
    ToolCall,
    ToolResult,
}

/// One entry of the reasoning log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ReasoningStep {
    pub fn routing(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Routing,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Thinking,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn tool_call(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::ToolCall,
            content: content.into(),
            tool_name: Some(tool.into()),
        }
    }

    pub fn tool_result(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::ToolResult,
            content: content.into(),
            tool_name: Some(tool.into()),
        }
    }
}

/// Append-only reasoning log.
///
/// `push` consumes and returns the trace so loop turns hand it along by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    steps: Vec<ReasoningStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, step: ReasoningStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<ReasoningStep> {
        self.steps
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub id: String,
    pub question: String,
}

impl FollowUpQuestion {
    /// Ids are `followup_1`, `followup_2`, ...
    pub fn numbered(index: usize, question: impl Into<String>) -> Self {
        Self {
            id: format!("followup_{}", index + 1),
            question: question.into(),
        }
    }
}

/// Why the reasoning loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The backend answered without requesting tools.
    Completed,
    BudgetExhausted,
    TimedOut,
    Cancelled,
    BackendError,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::BudgetExhausted => "budget_exhausted",
            Termination::TimedOut => "timed_out",
            Termination::Cancelled => "cancelled",
            Termination::BackendError => "backend_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl From<Usage> for UsageSummary {
    fn from(usage: Usage) -> Self {
        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationMetadata {
    pub processing_time_ms: u64,
    pub tool_call_count: usize,
    pub mode: InvestigationMode,
    pub classification: Classification,
    /// Backend turns taken.
    pub iterations: u32,
    pub termination: Termination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
    #[serde(default)]
    pub usage: UsageSummary,
}

/// The response to one investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub success: bool,
    pub answer: String,
    pub reasoning: Vec<ReasoningStep>,
    pub follow_up_questions: Vec<FollowUpQuestion>,
    pub visualizations: Vec<Visualization>,
    pub metadata: InvestigationMetadata,
}

impl InvestigationResult {
    /// The fixed failure response: apology answer, empty lists.
    pub fn failure(
        mode: InvestigationMode,
        classification: Classification,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            answer: FAILURE_ANSWER.to_string(),
            reasoning: Vec::new(),
            follow_up_questions: Vec::new(),
            visualizations: Vec::new(),
            metadata: InvestigationMetadata {
                processing_time_ms,
                tool_call_count: 0,
                mode,
                classification,
                iterations: 0,
                termination: Termination::BackendError,
                backend_error: None,
                usage: UsageSummary::default(),
            },
        }
    }
}
