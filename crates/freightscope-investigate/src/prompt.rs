//! System prompt assembly.
//!
//! One prompt per mode is built at construction and reused; only the date
//! line is added per request.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::{InvestigateError, Result};
use crate::mode::InvestigationMode;

const DEFAULT_PREAMBLE: &str = "You are a logistics analyst answering questions about a \
customer's shipment data. You cannot see the data directly: use the provided tools to query it, \
then answer from the tool results only. Never invent numbers. If a tool returns an error, read \
the message, adjust the inputs and try again or choose a different tool.";

const TOOL_GUIDANCE: &str = "## Using tools

- Periods are symbolic: today, yesterday, last7, last30, last90, this_month, last_month, \
this_year, all.
- Use explore_field before grouping by an unfamiliar field.
- Several independent tools may be requested in one turn.
- Charts are generated automatically from tool results; do not describe chart markup.";

const ANSWER_FORMAT: &str = "## Answer format

Lead with the direct answer and the key numbers, formatted for reading (currency with $, \
percentages with %). Keep it concise. End with a section headed exactly \
\"Follow-up questions:\" listing two or three short questions the user could ask next, one \
per line.";

fn mode_guidance(mode: InvestigationMode) -> &'static str {
    match mode {
        InvestigationMode::Quick => {
            "## Mode: quick\n\nThis is a factual question. Call the single most relevant tool, \
             usually preview_aggregation, and answer in one or two sentences. You have very few \
             turns."
        }
        InvestigationMode::Visual => {
            "## Mode: visual\n\nThe user wants to see the data. Prefer tools that produce \
             charts: get_trend for time series, get_hierarchical_data for treemaps, \
             get_geographic_data for maps, get_flow_data for lanes, get_daily_activity for \
             heatmaps, compare_metrics for radar charts. Summarize what the chart shows."
        }
        InvestigationMode::Deep => {
            "## Mode: deep\n\nThis question needs analysis. Establish the baseline, compare \
             periods, look for anomalies and break changes down by dimension with \
             analyze_root_cause before concluding. Explain the reasoning behind the answer."
        }
    }
}

/// Cached per-mode system prompts.
#[derive(Debug, Clone)]
pub struct SystemPrompts {
    prompts: HashMap<InvestigationMode, String>,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPrompts {
    /// Prompts with the built-in preamble.
    pub fn new() -> Self {
        Self::with_preamble(DEFAULT_PREAMBLE)
    }

    /// Prompts with a custom preamble in place of the built-in one.
    pub fn with_preamble(preamble: &str) -> Self {
        let prompts = InvestigationMode::ALL
            .iter()
            .map(|&mode| {
                let sections = [preamble.trim(), mode_guidance(mode), TOOL_GUIDANCE, ANSWER_FORMAT];
                (mode, sections.join("\n\n"))
            })
            .collect();
        Self { prompts }
    }

    /// Prompts whose preamble is read from `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let preamble =
            std::fs::read_to_string(path).map_err(|source| InvestigateError::PromptFile {
                path: path.display().to_string(),
                source,
            })?;
        if preamble.trim().is_empty() {
            return Err(InvestigateError::Config(format!(
                "prompt file '{}' is empty",
                path.display()
            )));
        }
        Ok(Self::with_preamble(&preamble))
    }

    /// The cached prompt for `mode`.
    pub fn base(&self, mode: InvestigationMode) -> &str {
        self.prompts.get(&mode).map(String::as_str).unwrap_or(DEFAULT_PREAMBLE)
    }

    /// The prompt for one request.
    pub fn for_request(&self, mode: InvestigationMode, today: NaiveDate) -> String {
        format!(
            "{}\n\nToday's date: {}",
            self.base(mode),
            today.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_prompts_per_mode() {
        let prompts = SystemPrompts::new();
        assert!(prompts.base(InvestigationMode::Quick).contains("Mode: quick"));
        assert!(prompts.base(InvestigationMode::Deep).contains("analyze_root_cause"));
        for mode in InvestigationMode::ALL {
            assert!(prompts.base(mode).contains("Follow-up questions:"));
        }
    }

    #[test]
    fn test_date_appended() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let prompt = SystemPrompts::new().for_request(InvestigationMode::Visual, today);
        assert!(prompt.ends_with("Today's date: 2024-03-15"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "You are the ACME freight desk.").unwrap();
        let prompts = SystemPrompts::from_file(file.path()).unwrap();
        assert!(prompts.base(InvestigationMode::Quick).starts_with("You are the ACME"));

        let missing = SystemPrompts::from_file(Path::new("/nonexistent/prompt.md"));
        assert!(matches!(missing, Err(InvestigateError::PromptFile { .. })));
    }
}
