//! Investigation modes and their resource limits.

use std::fmt;
use std::str::FromStr;

use freightscope_config::InvestigationConfig;
use serde::{Deserialize, Serialize};

/// Processing strategy chosen for a question.
///
/// The mode bounds how many reasoning turns the loop may take and how many
/// tokens each turn may generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestigationMode {
    /// Single factual answers: counts, totals, top-N.
    Quick,
    /// Multi-step analysis: root causes, anomalies, explanations.
    Deep,
    /// Chart, map and comparison requests.
    Visual,
}

impl InvestigationMode {
    pub const ALL: [InvestigationMode; 3] = [
        InvestigationMode::Quick,
        InvestigationMode::Deep,
        InvestigationMode::Visual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationMode::Quick => "quick",
            InvestigationMode::Deep => "deep",
            InvestigationMode::Visual => "visual",
        }
    }
}

impl fmt::Display for InvestigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(InvestigationMode::Quick),
            "deep" => Ok(InvestigationMode::Deep),
            "visual" => Ok(InvestigationMode::Visual),
            other => Err(format!(
                "unknown mode '{}' (expected quick, deep or visual)",
                other
            )),
        }
    }
}

/// Turn and token budget for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeLimits {
    pub max_turns: u32,
    pub max_tokens: u32,
}

impl ModeLimits {
    pub fn for_mode(mode: InvestigationMode, config: &InvestigationConfig) -> Self {
        let (max_turns, max_tokens) = match mode {
            InvestigationMode::Quick => (config.quick_turns, config.quick_max_tokens),
            InvestigationMode::Visual => (config.visual_turns, config.visual_max_tokens),
            InvestigationMode::Deep => (config.deep_turns, config.deep_max_tokens),
        };
        Self {
            max_turns: max_turns.max(1),
            max_tokens: max_tokens.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let config = InvestigationConfig::default();
        assert_eq!(
            ModeLimits::for_mode(InvestigationMode::Quick, &config).max_turns,
            3
        );
        assert_eq!(
            ModeLimits::for_mode(InvestigationMode::Visual, &config).max_turns,
            5
        );
        let deep = ModeLimits::for_mode(InvestigationMode::Deep, &config);
        assert_eq!(deep.max_turns, 8);
        assert_eq!(deep.max_tokens, 8192);
    }

    #[test]
    fn test_zero_turns_clamped() {
        let config = InvestigationConfig {
            quick_turns: 0,
            ..Default::default()
        };
        assert_eq!(
            ModeLimits::for_mode(InvestigationMode::Quick, &config).max_turns,
            1
        );
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!("Visual".parse::<InvestigationMode>().unwrap(), InvestigationMode::Visual);
        assert!("slow".parse::<InvestigationMode>().is_err());
        assert_eq!(
            serde_json::to_string(&InvestigationMode::Deep).unwrap(),
            "\"deep\""
        );
    }
}
