//! The investigation loop.
//!
//! An investigation moves through `Routing -> Turn(1..=N) -> Terminal`.
//! Routing classifies the question and records the decision. Each turn sends
//! the conversation to the reasoning backend, runs any requested tools and
//! appends their results. The loop ends when the backend answers without
//! requesting tools, the mode's turn budget runs out, the request deadline
//! passes, the caller cancels, or the backend fails. Every exit produces an
//! answer; only a malformed request is rejected.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use freightscope_config::{DEFAULT_MODEL, InvestigationConfig};
use freightscope_llm::{
    CompletionRequest, Content, Message, Role, SharedBackend, ToolDefinition, ToolResultBlock,
    ToolUseBlock, Usage,
};
use freightscope_store::SharedStore;
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::catalog::tool_catalog;
use crate::classifier::{Classification, PatternClassifier, QuestionClassifier};
use crate::error::{InvestigateError, Result};
use crate::mapper::VisualizationMapper;
use crate::mode::{InvestigationMode, ModeLimits};
use crate::prompt::SystemPrompts;
use crate::synthesizer::{LoopOutcome, ResponseSynthesizer};
use crate::tools::{ToolContext, ToolExecutor};
use crate::types::{
    HistoryMessage, InvestigationRequest, InvestigationResult, ReasoningStep, Termination, Trace,
};
use crate::visualization::Visualization;

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only message log for one investigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from caller-supplied history followed by the question.
    ///
    /// Leading assistant messages are dropped so the log opens with the
    /// user, and consecutive messages from the same role are merged.
    /// Entries with an unknown role or blank content are skipped.
    pub fn from_history(history: &[HistoryMessage], question: &str) -> Self {
        let mut merged: Vec<(Role, String)> = Vec::new();
        let entries = history
            .iter()
            .filter_map(|m| {
                let role = match m.role.trim().to_ascii_lowercase().as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    _ => return None,
                };
                let content = m.content.trim();
                (!content.is_empty()).then(|| (role, content.to_string()))
            })
            .chain(std::iter::once((Role::User, question.trim().to_string())));

        for (role, content) in entries {
            match merged.last_mut() {
                Some((last_role, text)) if *last_role == role => {
                    text.push_str("\n\n");
                    text.push_str(&content);
                }
                None if role == Role::Assistant => {}
                _ => merged.push((role, content)),
            }
        }

        let messages = merged
            .into_iter()
            .map(|(role, content)| Message {
                role,
                content: Content::Text(content),
            })
            .collect();
        Self { messages }
    }

    #[must_use]
    pub fn push(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything accumulated across turns. Handed from turn to turn by value.
#[derive(Debug, Clone)]
struct LoopState {
    conversation: Conversation,
    trace: Trace,
    visualizations: Vec<Visualization>,
    tool_call_count: usize,
    usage: Usage,
    last_text: Option<String>,
    turns_used: u32,
}

impl LoopState {
    fn new(conversation: Conversation, trace: Trace) -> Self {
        Self {
            conversation,
            trace,
            visualizations: Vec::new(),
            tool_call_count: 0,
            usage: Usage::default(),
            last_text: None,
            turns_used: 0,
        }
    }

    fn record(mut self, step: ReasoningStep) -> Self {
        self.trace = self.trace.push(step);
        self
    }
}

enum Phase {
    Turn(u32, LoopState),
    Terminal {
        state: LoopState,
        termination: Termination,
        backend_error: Option<String>,
    },
}

impl Phase {
    fn end(state: LoopState, termination: Termination) -> Self {
        Phase::Terminal {
            state,
            termination,
            backend_error: None,
        }
    }
}

/// Per-investigation inputs that do not change between turns.
struct RunContext {
    mode: InvestigationMode,
    limits: ModeLimits,
    system: String,
    tools: ToolContext,
    deadline: tokio::time::Instant,
    cancellation: CancellationToken,
}

// ─────────────────────────────────────────────────────────────────────────────
// Investigator
// ─────────────────────────────────────────────────────────────────────────────

/// Runs investigations against one reasoning backend and one store.
///
/// Holds no per-request state, so one instance serves concurrent requests.
pub struct Investigator {
    backend: SharedBackend,
    executor: Arc<ToolExecutor>,
    mapper: VisualizationMapper,
    classifier: Arc<dyn QuestionClassifier>,
    synthesizer: ResponseSynthesizer,
    prompts: SystemPrompts,
    tools: Vec<ToolDefinition>,
    config: InvestigationConfig,
    model: String,
    today: Option<NaiveDate>,
}

impl Investigator {
    pub fn builder() -> InvestigatorBuilder {
        InvestigatorBuilder::new()
    }

    pub fn config(&self) -> &InvestigationConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Tool schemas offered to the reasoning backend.
    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn classify(&self, question: &str) -> Classification {
        self.classifier.classify(question)
    }

    /// Reference date for symbolic periods.
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Run one investigation to completion.
    pub async fn investigate(&self, request: InvestigationRequest) -> Result<InvestigationResult> {
        self.investigate_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run one investigation, stopping early when `cancellation` fires.
    ///
    /// Only request validation can fail. Once the loop starts, backend and
    /// tool failures end in a degraded answer instead.
    pub async fn investigate_with_cancel(
        &self,
        request: InvestigationRequest,
        cancellation: CancellationToken,
    ) -> Result<InvestigationResult> {
        request.validate()?;
        let started = Instant::now();

        let classification = self.classifier.classify(&request.question);
        let mode = request.force_mode.unwrap_or(classification.mode);

        let span = tracing::info_span!(
            "investigation",
            customer_id = %request.customer_id,
            mode = %mode
        );
        let outcome = self
            .run(&request, classification, mode, cancellation)
            .instrument(span)
            .await;

        Ok(self
            .synthesizer
            .synthesize(outcome, request.show_reasoning, started))
    }

    async fn run(
        &self,
        request: &InvestigationRequest,
        classification: Classification,
        mode: InvestigationMode,
        cancellation: CancellationToken,
    ) -> LoopOutcome {
        let today = self.today();
        let limits = ModeLimits::for_mode(mode, &self.config);

        let routing = routing_summary(&classification, mode, request.force_mode.is_some());
        tracing::info!(
            detected = %classification.mode,
            confidence = classification.confidence,
            forced = request.force_mode.is_some(),
            max_turns = limits.max_turns,
            "Investigation started"
        );

        let run = RunContext {
            mode,
            limits,
            system: self.prompts.for_request(mode, today),
            tools: ToolContext::new(request.customer_id.clone(), today)
                .with_cancellation(cancellation.clone()),
            deadline: tokio::time::Instant::now()
                + std::time::Duration::from_secs(self.config.request_timeout_secs),
            cancellation,
        };

        let conversation =
            Conversation::from_history(&request.conversation_history, &request.question);
        let trace = Trace::new().push(ReasoningStep::routing(routing));

        let mut phase = Phase::Turn(1, LoopState::new(conversation, trace));
        let (state, termination, backend_error) = loop {
            phase = match phase {
                Phase::Turn(turn, state) if turn > run.limits.max_turns => {
                    tracing::warn!(
                        turns = state.turns_used,
                        "Turn budget exhausted without a final answer"
                    );
                    Phase::end(state, Termination::BudgetExhausted)
                }
                Phase::Turn(turn, state) => self.turn(turn, state, &run).await,
                Phase::Terminal {
                    state,
                    termination,
                    backend_error,
                } => break (state, termination, backend_error),
            };
        };

        tracing::info!(
            termination = termination.as_str(),
            turns = state.turns_used,
            tool_calls = state.tool_call_count,
            visualizations = state.visualizations.len(),
            input_tokens = state.usage.input_tokens,
            output_tokens = state.usage.output_tokens,
            "Investigation finished"
        );

        LoopOutcome {
            answer: state.last_text.unwrap_or_default(),
            reasoning: state.trace.into_steps(),
            visualizations: state.visualizations,
            tool_call_count: state.tool_call_count,
            turns_used: state.turns_used,
            termination,
            backend_error,
            usage: state.usage.into(),
            mode: run.mode,
            classification,
        }
    }

    /// One round trip to the backend plus the tools it requested.
    async fn turn(&self, turn: u32, state: LoopState, run: &RunContext) -> Phase {
        if run.cancellation.is_cancelled() {
            return Phase::end(state, Termination::Cancelled);
        }

        let request = CompletionRequest::new(
            self.model.clone(),
            state.conversation.messages().to_vec(),
            run.limits.max_tokens,
        )
        .with_system(run.system.clone())
        .with_tools(self.tools.clone());

        tracing::debug!(
            turn,
            messages = state.conversation.len(),
            model = %self.model,
            "Calling reasoning backend"
        );

        let call_start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = run.cancellation.cancelled() => {
                tracing::info!(turn, "Investigation cancelled during backend call");
                return Phase::end(state, Termination::Cancelled);
            }
            _ = tokio::time::sleep_until(run.deadline) => {
                tracing::warn!(turn, "Request deadline passed during backend call");
                return Phase::end(state, Termination::TimedOut);
            }
            result = self.backend.complete(request) => {
                result.and_then(|response| response.validate().map(|()| response))
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(turn, error = %e, "Reasoning backend failed");
                return Phase::Terminal {
                    state,
                    termination: Termination::BackendError,
                    backend_error: Some(e.to_string()),
                };
            }
        };

        tracing::debug!(
            turn,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            duration_ms = call_start.elapsed().as_millis() as u64,
            "Backend response received"
        );

        let mut state = state;
        state.usage += response.usage;
        state.turns_used = turn;
        for text in response.text_blocks() {
            let text = text.trim();
            if !text.is_empty() {
                state.last_text = Some(text.to_string());
                state = state.record(ReasoningStep::thinking(text));
            }
        }

        let uses = response.tool_uses();
        if uses.is_empty() {
            let answer = response.text();
            if !answer.trim().is_empty() {
                state.last_text = Some(answer.trim().to_string());
            }
            return Phase::end(state, Termination::Completed);
        }

        tracing::info!(
            turn,
            tool_count = uses.len(),
            tools = %uses.iter().map(|u| u.name.as_str()).collect::<Vec<_>>().join(", "),
            "Executing tools"
        );

        state.conversation = state
            .conversation
            .push(Message::assistant_blocks(response.content.clone()));
        for tool_use in &uses {
            state = state.record(ReasoningStep::tool_call(
                tool_use.name.clone(),
                tool_use.input.to_string(),
            ));
        }
        state.tool_call_count += uses.len();

        let results = tokio::select! {
            biased;
            _ = run.cancellation.cancelled() => {
                tracing::info!(turn, "Investigation cancelled during tool execution");
                return Phase::end(state, Termination::Cancelled);
            }
            _ = tokio::time::sleep_until(run.deadline) => {
                tracing::warn!(turn, "Request deadline passed during tool execution");
                return Phase::end(state, Termination::TimedOut);
            }
            results = self.run_tools(&uses, &run.tools) => results,
        };

        let mut blocks = Vec::with_capacity(uses.len());
        for (tool_use, result) in uses.iter().zip(results) {
            if let Some(viz) = self.mapper.map(&tool_use.name, &tool_use.input, &result) {
                tracing::debug!(
                    tool = %tool_use.name,
                    chart = ?viz.kind(),
                    "Visualization produced"
                );
                state.visualizations.push(viz);
            }

            let content = result.to_string();
            state = state.record(ReasoningStep::tool_result(
                tool_use.name.clone(),
                truncate_chars(&content, self.config.result_summary_chars),
            ));
            blocks.push(if result.get("error").is_some() {
                ToolResultBlock::error(tool_use.id.clone(), content)
            } else {
                ToolResultBlock::success(tool_use.id.clone(), content)
            });
        }
        state.conversation = state.conversation.push(Message::tool_results(blocks));

        Phase::Turn(turn + 1, state)
    }

    /// Results come back in request order whether or not calls overlap.
    async fn run_tools(&self, uses: &[ToolUseBlock], ctx: &ToolContext) -> Vec<Value> {
        if self.config.parallel_tools {
            return join_all(
                uses.iter()
                    .map(|u| self.executor.execute(&u.name, &u.input, ctx)),
            )
            .await;
        }

        let mut results = Vec::with_capacity(uses.len());
        for tool_use in uses {
            results.push(
                self.executor
                    .execute(&tool_use.name, &tool_use.input, ctx)
                    .await,
            );
        }
        results
    }
}

impl std::fmt::Debug for Investigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Investigator")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn routing_summary(classification: &Classification, mode: InvestigationMode, forced: bool) -> String {
    let detected = format!(
        "{} ({:.0}% confidence): {}",
        classification.mode,
        classification.confidence * 100.0,
        classification.reason
    );
    if forced {
        format!("Mode set to {} by request; classifier suggested {}", mode, detected)
    } else {
        format!("Classified as {}", detected)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`Investigator`].
pub struct InvestigatorBuilder {
    backend: Option<SharedBackend>,
    store: Option<SharedStore>,
    executor: Option<Arc<ToolExecutor>>,
    classifier: Arc<dyn QuestionClassifier>,
    synthesizer: ResponseSynthesizer,
    prompts: Option<SystemPrompts>,
    config: InvestigationConfig,
    model: String,
    today: Option<NaiveDate>,
}

impl InvestigatorBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            store: None,
            executor: None,
            classifier: Arc::new(PatternClassifier::new()),
            synthesizer: ResponseSynthesizer::new(),
            prompts: None,
            config: InvestigationConfig::default(),
            model: DEFAULT_MODEL.to_string(),
            today: None,
        }
    }

    pub fn with_backend(mut self, backend: SharedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use `store` with every built-in tool.
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a prepared executor. Takes precedence over [`with_store`](Self::with_store).
    pub fn with_executor(mut self, executor: Arc<ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn QuestionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: ResponseSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Override the system prompts. Otherwise `prompt_file` from the config
    /// is used when set.
    pub fn with_prompts(mut self, prompts: SystemPrompts) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn with_config(mut self, config: InvestigationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fix the reference date instead of reading the clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn build(self) -> Result<Investigator> {
        let backend = self
            .backend
            .ok_or_else(|| InvestigateError::Config("reasoning backend is required".to_string()))?;

        let executor = match (self.executor, self.store) {
            (Some(executor), _) => executor,
            (None, Some(store)) => Arc::new(ToolExecutor::with_default_tools(store)),
            (None, None) => {
                return Err(InvestigateError::Config(
                    "analytical store is required".to_string(),
                ));
            }
        };

        let prompts = match (self.prompts, &self.config.prompt_file) {
            (Some(prompts), _) => prompts,
            (None, Some(path)) => SystemPrompts::from_file(path)?,
            (None, None) => SystemPrompts::new(),
        };

        let tools = tool_catalog().to_vec();
        let mapper = VisualizationMapper::new();
        check_consistency(&tools, &executor, &mapper)?;

        tracing::debug!(
            backend = %backend.name(),
            store = %executor.store().name(),
            tools = tools.len(),
            "Investigator ready"
        );

        Ok(Investigator {
            backend,
            executor,
            mapper,
            classifier: self.classifier,
            synthesizer: self.synthesizer,
            prompts,
            tools,
            config: self.config,
            model: self.model,
            today: self.today,
        })
    }
}

impl Default for InvestigatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Every catalog entry needs a handler and a mapping rule, and every
/// handler needs a catalog entry.
fn check_consistency(
    tools: &[ToolDefinition],
    executor: &ToolExecutor,
    mapper: &VisualizationMapper,
) -> Result<()> {
    let mut problems = Vec::new();
    for def in tools {
        if !executor.contains(&def.name) {
            problems.push(format!("'{}' has no handler", def.name));
        }
        if !mapper.has_rule(&def.name) {
            problems.push(format!("'{}' has no visualization rule", def.name));
        }
    }
    for name in executor.names() {
        if !tools.iter().any(|def| def.name == name) {
            problems.push(format!("handler '{}' is not in the catalog", name));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(InvestigateError::Inconsistent(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepKind;
    use crate::visualization::ChartKind;
    use freightscope_llm::{CompletionResponse, ContentBlock, MockBackend, StopReason};
    use freightscope_store::{MockStore, StoreCall};
    use serde_json::json;
    use std::time::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn investigator(backend: Arc<MockBackend>, store: Arc<MockStore>) -> Investigator {
        Investigator::builder()
            .with_backend(backend)
            .with_store(store)
            .with_today(today())
            .build()
            .unwrap()
    }

    fn carriers() -> Value {
        json!({"groups": [
            {"group": "UPS", "value": 500.0, "count": 10},
            {"group": "FedEx", "value": 300.0, "count": 6}
        ]})
    }

    fn multi_tool_response(uses: Vec<(&str, &str, Value)>) -> CompletionResponse {
        CompletionResponse::new(
            "msg",
            "mock-model",
            uses.into_iter()
                .map(|(id, name, input)| ContentBlock::tool_use(id, name, input))
                .collect(),
            StopReason::ToolUse,
            Usage::new(5, 5),
        )
    }

    #[test]
    fn test_builder_requires_backend_and_store() {
        let missing_backend = Investigator::builder()
            .with_store(Arc::new(MockStore::new()))
            .build();
        assert!(matches!(missing_backend, Err(InvestigateError::Config(_))));

        let missing_store = Investigator::builder()
            .with_backend(Arc::new(MockBackend::with_text("hi")))
            .build();
        assert!(matches!(missing_store, Err(InvestigateError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_incomplete_executor() {
        let executor = Arc::new(ToolExecutor::new(Arc::new(MockStore::new())));
        let result = Investigator::builder()
            .with_backend(Arc::new(MockBackend::with_text("hi")))
            .with_executor(executor)
            .build();
        match result {
            Err(InvestigateError::Inconsistent(message)) => {
                assert!(message.contains("'get_trend' has no handler"));
            }
            other => panic!("expected inconsistency, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_conversation_from_history() {
        let history = vec![
            HistoryMessage {
                role: "assistant".into(),
                content: "Welcome!".into(),
            },
            HistoryMessage {
                role: "user".into(),
                content: "Costs in Texas?".into(),
            },
            HistoryMessage {
                role: "assistant".into(),
                content: "$1,200.".into(),
            },
            HistoryMessage {
                role: "system".into(),
                content: "ignored".into(),
            },
            HistoryMessage {
                role: "assistant".into(),
                content: "Anything else?".into(),
            },
        ];
        let conversation = Conversation::from_history(&history, "And in Ohio?");
        let messages = conversation.messages();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content.to_text(), "$1,200.\n\nAnything else?");
        assert_eq!(messages[2].content.to_text(), "And in Ohio?");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let backend = Arc::new(MockBackend::with_text("You shipped 42 loads."));
        let store = Arc::new(MockStore::new());
        let result = investigator(backend.clone(), store.clone())
            .investigate(InvestigationRequest::new("How many shipments last month?", "acme"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.answer, "You shipped 42 loads.");
        assert_eq!(result.metadata.mode, InvestigationMode::Quick);
        assert_eq!(result.metadata.iterations, 1);
        assert_eq!(result.metadata.termination, Termination::Completed);
        assert_eq!(result.metadata.tool_call_count, 0);
        assert_eq!(result.reasoning[0].kind, StepKind::Routing);
        assert_eq!(store.call_count(), 0);

        let request = &backend.requests()[0];
        assert_eq!(request.tools.len(), tool_catalog().len());
        assert_eq!(request.max_tokens, 2048);
        assert!(
            request
                .system
                .as_deref()
                .unwrap()
                .ends_with("Today's date: 2024-03-15")
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_request() {
        let backend = Arc::new(MockBackend::with_text("x"));
        let result = investigator(backend.clone(), Arc::new(MockStore::new()))
            .investigate(InvestigationRequest::new("", "acme"))
            .await;
        assert!(matches!(result, Err(InvestigateError::InvalidRequest(_))));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_quick_budget_is_respected() {
        let backend = Arc::new(MockBackend::repeating(MockBackend::tool_response(
            "call",
            "preview_aggregation",
            json!({"group_by": "carrier"}),
        )));
        let store = Arc::new(MockStore::new().with_aggregate(carriers()));
        let result = investigator(backend.clone(), store)
            .investigate(InvestigationRequest::new("How many shipments?", "acme"))
            .await
            .unwrap();

        assert_eq!(backend.request_count(), 3);
        assert_eq!(result.metadata.iterations, 3);
        assert_eq!(result.metadata.termination, Termination::BudgetExhausted);
        assert_eq!(result.metadata.tool_call_count, 3);
        assert_eq!(result.answer, "");
        assert_eq!(result.visualizations.len(), 3);
    }

    #[tokio::test]
    async fn test_forced_mode_changes_budget_but_keeps_classification() {
        let backend = Arc::new(MockBackend::repeating(MockBackend::tool_response(
            "call",
            "explore_field",
            json!({"field": "carrier"}),
        )));
        let result = investigator(backend.clone(), Arc::new(MockStore::new()))
            .investigate(
                InvestigationRequest::new("How many shipments?", "acme")
                    .with_mode(InvestigationMode::Deep),
            )
            .await
            .unwrap();

        assert_eq!(backend.request_count(), 8);
        assert_eq!(result.metadata.mode, InvestigationMode::Deep);
        assert_eq!(result.metadata.classification.mode, InvestigationMode::Quick);
        assert!(result.reasoning[0].content.contains("by request"));
    }

    #[tokio::test]
    async fn test_budget_falls_back_to_last_text() {
        let response = CompletionResponse::new(
            "msg",
            "mock-model",
            vec![
                ContentBlock::text("Checking carriers first."),
                ContentBlock::tool_use("call", "explore_field", json!({"field": "carrier"})),
            ],
            StopReason::ToolUse,
            Usage::new(1, 1),
        );
        let backend = Arc::new(MockBackend::repeating(response));
        let result = investigator(backend, Arc::new(MockStore::new()))
            .investigate(InvestigationRequest::new("How many shipments?", "acme"))
            .await
            .unwrap();

        assert_eq!(result.answer, "Checking carriers first.");
        assert_eq!(result.metadata.usage.input_tokens, 3);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_partial_answer() {
        let backend = Arc::new(
            MockBackend::new(vec![CompletionResponse::new(
                "msg",
                "mock-model",
                vec![
                    ContentBlock::text("Looking at the carriers."),
                    ContentBlock::tool_use("call", "preview_aggregation", json!({"group_by": "carrier"})),
                ],
                StopReason::ToolUse,
                Usage::new(1, 1),
            )])
            .then_fail("overloaded"),
        );
        let store = Arc::new(MockStore::new().with_aggregate(carriers()));
        let result = investigator(backend, store)
            .investigate(InvestigationRequest::new("Show cost by carrier chart", "acme"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.metadata.termination, Termination::BackendError);
        assert!(result.metadata.backend_error.as_deref().unwrap().contains("overloaded"));
        assert_eq!(result.answer, "Looking at the carriers.");
        assert_eq!(result.visualizations.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_backend_response_is_backend_error() {
        let response = multi_tool_response(vec![
            ("dup", "explore_field", json!({"field": "carrier"})),
            ("dup", "explore_field", json!({"field": "mode"})),
        ]);
        let store = Arc::new(MockStore::new());
        let result = investigator(Arc::new(MockBackend::new(vec![response])), store.clone())
            .investigate(InvestigationRequest::new("How many shipments?", "acme"))
            .await
            .unwrap();

        assert_eq!(result.metadata.termination, Termination::BackendError);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_partial_result() {
        let backend = Arc::new(
            MockBackend::with_text("too late").with_delay(Duration::from_secs(600)),
        );
        let config = InvestigationConfig {
            request_timeout_secs: 5,
            ..Default::default()
        };
        let investigator = Investigator::builder()
            .with_backend(backend)
            .with_store(Arc::new(MockStore::new()))
            .with_config(config)
            .with_today(today())
            .build()
            .unwrap();

        let result = investigator
            .investigate(InvestigationRequest::new("How many shipments?", "acme"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.metadata.termination, Termination::TimedOut);
        assert_eq!(result.answer, "");
        assert_eq!(result.metadata.iterations, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let backend = Arc::new(MockBackend::with_text("never"));
        let token = CancellationToken::new();
        token.cancel();
        let result = investigator(backend.clone(), Arc::new(MockStore::new()))
            .investigate_with_cancel(InvestigationRequest::new("How many shipments?", "acme"), token)
            .await
            .unwrap();

        assert_eq!(result.metadata.termination, Termination::Cancelled);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_mid_call() {
        let backend = Arc::new(MockBackend::with_text("never").with_delay(Duration::from_secs(30)));
        let investigator = investigator(backend, Arc::new(MockStore::new()));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = investigator
            .investigate_with_cancel(InvestigationRequest::new("How many shipments?", "acme"), token)
            .await
            .unwrap();
        assert_eq!(result.metadata.termination, Termination::Cancelled);
    }

    #[tokio::test]
    async fn test_sibling_results_keep_request_order() {
        let backend = Arc::new(
            MockBackend::new(vec![
                multi_tool_response(vec![
                    ("a", "preview_aggregation", json!({"group_by": "carrier", "metric": "cost"})),
                    ("b", "no_such_tool", json!({})),
                    ("c", "get_hierarchical_data", json!({"group_by": "carrier", "metric": "cost"})),
                ]),
                MockBackend::text_response("Done."),
            ]),
        );
        let store = Arc::new(MockStore::new().with_aggregate(carriers()));
        let result = investigator(backend.clone(), store)
            .investigate(InvestigationRequest::new("Show me cost by carrier", "acme"))
            .await
            .unwrap();

        let kinds: Vec<ChartKind> = result.visualizations.iter().map(|v| v.kind()).collect();
        assert_eq!(kinds, vec![ChartKind::Bar, ChartKind::Treemap]);
        assert_eq!(result.metadata.tool_call_count, 3);

        let second = &backend.requests()[1];
        let last = second.messages.last().unwrap();
        let Content::Blocks(blocks) = &last.content else {
            panic!("expected tool result blocks");
        };
        let ids: Vec<(&str, bool)> = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    is_error,
                    ..
                } => Some((tool_use_id.as_str(), *is_error)),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![("a", false), ("b", true), ("c", false)]);

        let results: Vec<&ReasoningStep> = result
            .reasoning
            .iter()
            .filter(|s| s.kind == StepKind::ToolResult)
            .collect();
        assert_eq!(results[1].tool_name.as_deref(), Some("no_such_tool"));
        assert!(results[1].content.contains("Unknown tool: no_such_tool"));
    }

    #[tokio::test]
    async fn test_sequential_tools_when_parallel_disabled() {
        let backend = Arc::new(MockBackend::new(vec![
            multi_tool_response(vec![
                ("a", "explore_field", json!({"field": "carrier"})),
                ("b", "explore_field", json!({"field": "mode"})),
            ]),
            MockBackend::text_response("Done."),
        ]));
        let store = Arc::new(MockStore::new());
        let investigator = Investigator::builder()
            .with_backend(backend)
            .with_store(store.clone())
            .with_config(InvestigationConfig {
                parallel_tools: false,
                ..Default::default()
            })
            .with_today(today())
            .build()
            .unwrap();

        investigator
            .investigate(InvestigationRequest::new("How many carriers?", "acme"))
            .await
            .unwrap();

        let fields: Vec<String> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Explore(q) => Some(q.field),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["carrier", "mode"]);
    }

    #[tokio::test]
    async fn test_history_precedes_question() {
        let backend = Arc::new(MockBackend::with_text("Same as before."));
        investigator(backend.clone(), Arc::new(MockStore::new()))
            .investigate(
                InvestigationRequest::new("And last week?", "acme").with_history(vec![
                    HistoryMessage {
                        role: "user".into(),
                        content: "How many shipments yesterday?".into(),
                    },
                    HistoryMessage {
                        role: "assistant".into(),
                        content: "Twelve.".into(),
                    },
                ]),
            )
            .await
            .unwrap();

        let messages = &backend.requests()[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content.to_text(), "And last week?");
    }

    #[tokio::test]
    async fn test_result_summaries_are_truncated() {
        let backend = Arc::new(MockBackend::new(vec![
            MockBackend::tool_response("a", "preview_aggregation", json!({"group_by": "carrier"})),
            MockBackend::text_response("Done."),
        ]));
        let investigator = Investigator::builder()
            .with_backend(backend.clone())
            .with_store(Arc::new(MockStore::new().with_aggregate(carriers())))
            .with_config(InvestigationConfig {
                result_summary_chars: 20,
                ..Default::default()
            })
            .with_today(today())
            .build()
            .unwrap();

        let result = investigator
            .investigate(InvestigationRequest::new("How many by carrier?", "acme"))
            .await
            .unwrap();
        let summary = result
            .reasoning
            .iter()
            .find(|s| s.kind == StepKind::ToolResult)
            .unwrap();
        assert_eq!(summary.content.chars().count(), 23);
        assert!(summary.content.ends_with("..."));

        // The backend still receives the full result.
        let last = backend.requests()[1].messages.last().unwrap().clone();
        let Content::Blocks(blocks) = last.content else {
            panic!("expected tool result blocks");
        };
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolResult { content, .. } if content.contains("FedEx")
        ));
    }
}
