//! Final answer packaging.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;

use crate::classifier::Classification;
use crate::mode::InvestigationMode;
use crate::types::{
    FollowUpQuestion, InvestigationMetadata, InvestigationResult, ReasoningStep, Termination,
    UsageSummary,
};
use crate::visualization::Visualization;

/// Shorter candidates are list debris, not questions.
const MIN_FOLLOW_UP_CHARS: usize = 10;
const MAX_FOLLOW_UPS: usize = 5;

const FALLBACK_FOLLOW_UPS: [&str; 3] = [
    "How does this compare to the previous period?",
    "Which carriers contribute the most to this?",
    "Are there any unusual patterns I should look into?",
];

/// Everything the reasoning loop produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub answer: String,
    pub reasoning: Vec<ReasoningStep>,
    pub visualizations: Vec<Visualization>,
    pub tool_call_count: usize,
    pub turns_used: u32,
    pub termination: Termination,
    pub backend_error: Option<String>,
    pub usage: UsageSummary,
    pub mode: InvestigationMode,
    pub classification: Classification,
}

// ─────────────────────────────────────────────────────────────────────────────
// Follow-up extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Strategy separating follow-up questions from an answer.
pub trait FollowUpExtractor: Send + Sync {
    /// Split `answer` into the answer body and follow-up questions.
    ///
    /// When no follow-ups are found the answer is returned unchanged.
    fn extract(&self, answer: &str) -> (String, Vec<String>);
}

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t#>*_]*(?:suggested )?follow[- ]?up questions?[*_ \t]*:[*_ \t]*")
        .expect("follow-up header pattern must compile")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").expect("list marker pattern must compile")
});

/// Finds a "Follow-up questions:" section by pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternFollowUps;

impl FollowUpExtractor for PatternFollowUps {
    fn extract(&self, answer: &str) -> (String, Vec<String>) {
        let Some(header) = HEADER.find(answer) else {
            return (answer.to_string(), Vec::new());
        };

        let mut questions = Vec::new();
        for line in answer[header.end()..].lines() {
            let line = line.trim();
            if line.is_empty() {
                if questions.is_empty() {
                    continue;
                }
                break;
            }
            let candidate = LIST_MARKER
                .replace(line, "")
                .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
                .to_string();
            if candidate.chars().count() >= MIN_FOLLOW_UP_CHARS {
                questions.push(candidate);
            }
            if questions.len() == MAX_FOLLOW_UPS {
                break;
            }
        }

        if questions.is_empty() {
            return (answer.to_string(), questions);
        }
        (answer[..header.start()].trim_end().to_string(), questions)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer
// ─────────────────────────────────────────────────────────────────────────────

/// Turns a loop outcome into the response payload. Never fails.
#[derive(Clone)]
pub struct ResponseSynthesizer {
    extractor: Arc<dyn FollowUpExtractor>,
}

impl Default for ResponseSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSynthesizer").finish_non_exhaustive()
    }
}

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self {
            extractor: Arc::new(PatternFollowUps),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FollowUpExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Assemble the result.
    ///
    /// A panic inside assembly yields a minimal result that still carries
    /// the answer.
    pub fn synthesize(
        &self,
        outcome: LoopOutcome,
        show_reasoning: bool,
        started: Instant,
    ) -> InvestigationResult {
        let assembled = catch_unwind(AssertUnwindSafe(|| {
            self.assemble(&outcome, show_reasoning, started)
        }));
        match assembled {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Response assembly panicked; returning minimal result");
                minimal(outcome, started)
            }
        }
    }

    fn assemble(
        &self,
        outcome: &LoopOutcome,
        show_reasoning: bool,
        started: Instant,
    ) -> InvestigationResult {
        let (answer, extracted) = self.extractor.extract(&outcome.answer);
        let follow_ups: Vec<FollowUpQuestion> = if extracted.is_empty() {
            FALLBACK_FOLLOW_UPS
                .iter()
                .enumerate()
                .map(|(i, q)| FollowUpQuestion::numbered(i, *q))
                .collect()
        } else {
            extracted
                .into_iter()
                .enumerate()
                .map(|(i, q)| FollowUpQuestion::numbered(i, q))
                .collect()
        };

        InvestigationResult {
            success: true,
            answer,
            reasoning: if show_reasoning {
                outcome.reasoning.clone()
            } else {
                Vec::new()
            },
            follow_up_questions: follow_ups,
            visualizations: outcome.visualizations.clone(),
            metadata: metadata(outcome, started),
        }
    }
}

fn metadata(outcome: &LoopOutcome, started: Instant) -> InvestigationMetadata {
    InvestigationMetadata {
        processing_time_ms: started.elapsed().as_millis() as u64,
        tool_call_count: outcome.tool_call_count,
        mode: outcome.mode,
        classification: outcome.classification.clone(),
        iterations: outcome.turns_used,
        termination: outcome.termination,
        backend_error: outcome.backend_error.clone(),
        usage: outcome.usage,
    }
}

fn minimal(outcome: LoopOutcome, started: Instant) -> InvestigationResult {
    let metadata = metadata(&outcome, started);
    InvestigationResult {
        success: true,
        answer: outcome.answer,
        reasoning: Vec::new(),
        follow_up_questions: Vec::new(),
        visualizations: Vec::new(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{PatternClassifier, QuestionClassifier};
    use crate::types::ReasoningStep;

    fn outcome(answer: &str) -> LoopOutcome {
        LoopOutcome {
            answer: answer.to_string(),
            reasoning: vec![ReasoningStep::routing("quick")],
            visualizations: Vec::new(),
            tool_call_count: 1,
            turns_used: 2,
            termination: Termination::Completed,
            backend_error: None,
            usage: UsageSummary::default(),
            mode: InvestigationMode::Quick,
            classification: PatternClassifier.classify("how many"),
        }
    }

    #[test]
    fn test_extracts_and_strips_section() {
        let answer = "You shipped 42 loads last month.\n\n**Follow-up questions:**\n\
                      1. Which carrier moved the most loads?\n\
                      2. How does that compare to February?\n\
                      - ok?\n";
        let (body, questions) = PatternFollowUps.extract(answer);
        assert_eq!(body, "You shipped 42 loads last month.");
        assert_eq!(
            questions,
            vec![
                "Which carrier moved the most loads?",
                "How does that compare to February?"
            ]
        );
    }

    #[test]
    fn test_caps_follow_ups() {
        let mut answer = String::from("Answer.\nFollow-up questions:\n");
        for i in 0..8 {
            answer.push_str(&format!("- Question number {} about lanes?\n", i));
        }
        let (_, questions) = PatternFollowUps.extract(&answer);
        assert_eq!(questions.len(), MAX_FOLLOW_UPS);
    }

    #[test]
    fn test_no_section_keeps_answer() {
        let (body, questions) = PatternFollowUps.extract("Just 42.");
        assert_eq!(body, "Just 42.");
        assert!(questions.is_empty());
    }

    #[test]
    fn test_fallback_follow_ups() {
        let result = ResponseSynthesizer::new().synthesize(outcome("42 shipments."), true, Instant::now());
        assert_eq!(result.follow_up_questions.len(), 3);
        assert_eq!(result.follow_up_questions[0].id, "followup_1");
        assert!(result.success);
        assert_eq!(result.metadata.iterations, 2);
    }

    #[test]
    fn test_hides_reasoning() {
        let result = ResponseSynthesizer::new().synthesize(outcome("42."), false, Instant::now());
        assert!(result.reasoning.is_empty());
    }

    struct Exploding;

    impl FollowUpExtractor for Exploding {
        fn extract(&self, _answer: &str) -> (String, Vec<String>) {
            panic!("extractor failure");
        }
    }

    #[test]
    fn test_panic_yields_minimal_result() {
        let synthesizer = ResponseSynthesizer::new().with_extractor(Arc::new(Exploding));
        let result = synthesizer.synthesize(outcome("The answer is 42."), true, Instant::now());
        assert_eq!(result.answer, "The answer is 42.");
        assert!(result.follow_up_questions.is_empty());
        assert!(result.reasoning.is_empty());
    }
}
