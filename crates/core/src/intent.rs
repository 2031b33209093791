//! Query intent: the coarse analytical purpose of a question.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Intent categories, in tie-break order.
///
/// When two intents score identically, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Aggregation,
    Trend,
    Comparison,
    Detail,
    Exploratory,
    Operational,
    Analytical,
}

impl IntentType {
    /// All variants in declaration (tie-break) order.
    pub const ALL: [IntentType; 7] = [
        IntentType::Aggregation,
        IntentType::Trend,
        IntentType::Comparison,
        IntentType::Detail,
        IntentType::Exploratory,
        IntentType::Operational,
        IntentType::Analytical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregation => "aggregation",
            Self::Trend => "trend",
            Self::Comparison => "comparison",
            Self::Detail => "detail",
            Self::Exploratory => "exploratory",
            Self::Operational => "operational",
            Self::Analytical => "analytical",
        }
    }

    /// Lenient parse: case-insensitive, surrounding whitespace and quotes ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == cleaned)
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,

    /// Confidence in [0, 1].
    pub confidence: f64,

    /// Question words that supported this intent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl Intent {
    pub fn new(intent_type: IntentType, confidence: f64) -> Self {
        Self {
            intent_type,
            confidence: crate::scoring::clamp_unit(confidence),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }
}
