//! Investigation orchestrator for freightscope.
//!
//! Answers natural-language questions about a shipment dataset by letting a
//! tool-calling reasoning backend query an analytical store, then turning
//! the tool results into visualization descriptors and a final answer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Investigator                                               │
//! │  - Classifies the question into a mode                      │
//! │  - Runs the bounded tool-calling loop                       │
//! │  - Synthesizes the response                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌────────────┐  ┌─────────────┐  ┌────────────┐
//!       │ LlmBackend │  │ToolExecutor │  │ Visualiz.  │
//!       │            │  │ (store)     │  │ Mapper     │
//!       └────────────┘  └─────────────┘  └────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`Investigator`]: the loop, built with [`InvestigatorBuilder`]
//! - [`PatternClassifier`]: question to [`InvestigationMode`]
//! - [`tool_catalog`]: tool schemas offered to the backend
//! - [`ToolExecutor`]: runs tools against an [`AnalyticsStore`](freightscope_store::AnalyticsStore)
//! - [`VisualizationMapper`]: tool results to [`Visualization`] descriptors
//! - [`ResponseSynthesizer`]: final answer and follow-up questions

pub mod catalog;
pub mod classifier;
pub mod error;
pub mod mapper;
pub mod mode;
pub mod orchestrator;
pub mod prompt;
pub mod synthesizer;
pub mod tools;
pub mod types;
pub mod visualization;

pub use catalog::{TOOL_CATALOG_VERSION, tool_catalog, tool_definition};
pub use classifier::{Classification, PatternClassifier, QuestionClassifier};
pub use error::{InvestigateError, ParameterError, Result, ToolError, ToolResult};
pub use mapper::{VisualizationMapper, humanize, infer_format};
pub use mode::{InvestigationMode, ModeLimits};
pub use orchestrator::{Conversation, Investigator, InvestigatorBuilder};
pub use prompt::SystemPrompts;
pub use synthesizer::{FollowUpExtractor, LoopOutcome, PatternFollowUps, ResponseSynthesizer};
pub use tools::{ParamExt, ToolContext, ToolExecutor, ToolHandler, percent_change, round2};
pub use types::{
    FAILURE_ANSWER, FollowUpQuestion, HistoryMessage, InvestigationMetadata, InvestigationRequest,
    InvestigationResult, ReasoningStep, StepKind, Termination, Trace, UsageSummary,
};
pub use visualization::{Chart, ChartKind, ValueFormat, Visualization};
