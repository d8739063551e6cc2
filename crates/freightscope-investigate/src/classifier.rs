//! Question classification.
//!
//! Pattern families are tested in a fixed order: quick factual patterns,
//! then visualization intent, then deep analysis. The first match wins.
//! Visualization intent is tested before deep analysis because chart
//! requests often carry analytical words such as "compare".

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

use crate::mode::InvestigationMode;

/// Questions longer than this fall back to deep mode at reduced confidence.
const LONG_QUESTION_CHARS: usize = 150;

/// Outcome of classifying a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "detected")]
    pub mode: InvestigationMode,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
}

/// Strategy mapping question text to a mode.
///
/// Implementations must be deterministic for identical input.
pub trait QuestionClassifier: Send + Sync {
    fn classify(&self, question: &str) -> Classification;
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern Classifier
// ─────────────────────────────────────────────────────────────────────────────

struct PatternFamily {
    mode: InvestigationMode,
    confidence: f64,
    reason: &'static str,
    patterns: RegexSet,
}

fn family(
    mode: InvestigationMode,
    confidence: f64,
    reason: &'static str,
    patterns: &[&str],
) -> PatternFamily {
    PatternFamily {
        mode,
        confidence,
        reason,
        patterns: RegexSet::new(patterns).expect("classifier patterns must compile"),
    }
}

static FAMILIES: LazyLock<Vec<PatternFamily>> = LazyLock::new(|| {
    vec![
        family(
            InvestigationMode::Quick,
            0.9,
            "matched a quick factual pattern",
            &[
                r"^how (many|much)\b",
                r"^what(?:'s| is| was| were| are) (?:the |our |my )?(total|number|count|top|average|avg|highest|lowest|most|least|sum)\b",
                r"^(count|total|sum)\b",
                r"^which (carrier|lane|state|city|mode|customer|shipper|origin|destination|warehouse|facility)s?\b.*\b(most|highest|lowest|least|top|best|worst|cheapest|fastest|slowest)\b",
                r"^(list|name|give me|show) the top \d*",
                r"^who (ships|shipped|moved|carried) the most\b",
            ],
        ),
        family(
            InvestigationMode::Visual,
            0.85,
            "matched a visualization pattern",
            &[
                r"\b(chart|graph|plot|visuali[sz]e|visuali[sz]ation|diagram)\b",
                r"\b(map|heatmap|heat map|treemap|tree map|choropleth|radar|sankey)\b",
                r"\b(trend|trends|trending|over time)\b",
                r"\b(compare|comparison|versus|vs\.?)\b",
                r"\b(breakdown|break down|distribution)\b",
                r"^show me\b",
                r"\b(flows?|lanes? between)\b",
            ],
        ),
        family(
            InvestigationMode::Deep,
            0.85,
            "matched a deep analysis pattern",
            &[
                r"^why\b",
                r"\bwhy (did|is|are|was|were|do|does|has|have)\b",
                r"\broot cause\b",
                r"\b(investigate|analy[sz]e|analysis|explain|diagnos\w*|deep dive)\b",
                r"\bwhat (caused|drove|is driving|is causing)\b",
                r"\b(anomal\w*|outliers?|unusual|spike|drop)\b",
            ],
        ),
    ]
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));

/// Regex-based classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl QuestionClassifier for PatternClassifier {
    fn classify(&self, question: &str) -> Classification {
        let normalized = WHITESPACE
            .replace_all(question.trim(), " ")
            .to_lowercase();

        for family in FAMILIES.iter() {
            if family.patterns.is_match(&normalized) {
                return Classification {
                    mode: family.mode,
                    confidence: family.confidence,
                    reason: family.reason.to_string(),
                };
            }
        }

        if normalized.chars().count() > LONG_QUESTION_CHARS {
            Classification {
                mode: InvestigationMode::Deep,
                confidence: 0.6,
                reason: "long question without a specific pattern".to_string(),
            }
        } else {
            Classification {
                mode: InvestigationMode::Deep,
                confidence: 0.5,
                reason: "no pattern matched, defaulting to deep analysis".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(q: &str) -> Classification {
        PatternClassifier::new().classify(q)
    }

    #[test]
    fn test_quick_patterns() {
        for q in [
            "How many shipments last month?",
            "how much did we spend on freight in Q1",
            "What is the total cost for UPS?",
            "What's the average transit time?",
            "Which carrier has the highest on-time rate?",
            "Count of shipments to Texas",
            "List the top 5 lanes by volume",
        ] {
            let c = classify(q);
            assert_eq!(c.mode, InvestigationMode::Quick, "question: {}", q);
            assert_eq!(c.confidence, 0.9);
        }
    }

    #[test]
    fn test_visual_patterns() {
        for q in [
            "Show me a treemap of cost by carrier",
            "Plot weekly volume",
            "Cost trend over time for FedEx",
            "Compare carriers on cost and transit time",
            "Give me a map of shipments by destination state",
        ] {
            assert_eq!(classify(q).mode, InvestigationMode::Visual, "question: {}", q);
        }
    }

    #[test]
    fn test_deep_patterns() {
        for q in [
            "Why did costs go up in March?",
            "Investigate late deliveries in the northeast",
            "What caused the spike in accessorial charges?",
            "Explain the anomalies in detention fees",
        ] {
            let c = classify(q);
            assert_eq!(c.mode, InvestigationMode::Deep, "question: {}", q);
            assert_eq!(c.confidence, 0.85);
        }
    }

    #[test]
    fn test_visual_checked_before_deep() {
        let c = classify("why did volume drop, show me a chart");
        assert_eq!(c.mode, InvestigationMode::Visual);
    }

    #[test]
    fn test_fallbacks() {
        let short = classify("freight stuff");
        assert_eq!(short.mode, InvestigationMode::Deep);
        assert_eq!(short.confidence, 0.5);

        let long = classify(&"tell me about our freight network in general ".repeat(5));
        assert_eq!(long.mode, InvestigationMode::Deep);
        assert_eq!(long.confidence, 0.6);
    }

    #[test]
    fn test_deterministic() {
        let q = "How many pallets shipped yesterday?";
        assert_eq!(classify(q), classify(q));
    }

    #[test]
    fn test_serializes_detected() {
        let json = serde_json::to_value(classify("how many loads")).unwrap();
        assert_eq!(json["detected"], "quick");
        assert!(json["reason"].is_string());
    }
}
