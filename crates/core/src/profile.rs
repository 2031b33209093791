//! The business-context profile produced for every analysed question.
//!
//! A profile is built once by the orchestrator and never mutated
//! afterwards; downstream consumers only read it.

use crate::domain::Domain;
use crate::entity::Entity;
use crate::intent::{Intent, IntentType};
use crate::time::TimeRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Markers describing how a profile was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFlag {
    /// The validator replaced a low-confidence intent or domain.
    FallbackApplied,
    /// A pipeline branch failed or the question was unusable.
    FallbackAnalysis,
    /// An entity was kept despite failing validation.
    CrossValidationWarning,
    /// User preferences altered the result.
    Personalized,
    /// The caller cancelled the analysis before it completed.
    Cancelled,
}

/// Immutable analysis result for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessContextProfile {
    /// Opaque correlation key.
    pub analysis_id: String,
    pub question: String,
    pub user_id: String,
    pub intent: Intent,
    pub domain: Domain,
    pub entities: Vec<Entity>,
    pub business_terms: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,

    /// Relevance in [0, 1] per business term.
    #[serde(default)]
    pub term_relevance: BTreeMap<String, f64>,

    /// Overall confidence in [0, 1].
    pub confidence: f64,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub flags: BTreeSet<AnalysisFlag>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ValidationResult>,
}

impl BusinessContextProfile {
    pub fn intent_type(&self) -> IntentType {
        self.intent.intent_type
    }

    pub fn has_flag(&self, flag: AnalysisFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// True when the profile came from a degraded analysis.
    pub fn is_fallback(&self) -> bool {
        self.has_flag(AnalysisFlag::FallbackAnalysis)
    }

    /// Entity names followed by business terms, deduplicated case-insensitively.
    pub fn focus_terms(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entities
            .iter()
            .map(|e| e.name.clone())
            .chain(self.business_terms.iter().cloned())
            .filter(|t| seen.insert(t.to_lowercase()))
            .collect()
    }
}

/// Which part of the profile a validation concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    Intent,
    Entity,
    Domain,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Entity => "entity",
            Self::Domain => "domain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ConfidenceThreshold,
    HistoricalAccuracy,
    Consistency,
    Contextual,
}

impl CheckKind {
    /// Weight of this check in the overall validation score.
    pub fn weight(&self) -> f64 {
        match self {
            Self::ConfidenceThreshold => 0.30,
            Self::HistoricalAccuracy => 0.25,
            Self::Consistency => 0.25,
            Self::Contextual => 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub kind: CheckKind,
    pub passed: bool,
    /// Score in [0, 1].
    pub score: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl ValidationCheck {
    pub fn new(kind: CheckKind, passed: bool, score: f64, detail: impl Into<String>) -> Self {
        Self {
            kind,
            passed,
            score: crate::scoring::clamp_unit(score),
            detail: detail.into(),
        }
    }
}

/// Transient validation metadata attached to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validation_type: ValidationType,
    /// The validated value, e.g. "aggregation" or "deposit".
    pub subject: String,
    pub original_confidence: f64,
    pub adjusted_confidence: f64,
    pub validation_score: f64,
    pub historical_accuracy: f64,
    pub is_valid: bool,
    pub checks: Vec<ValidationCheck>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, ExtractionMethod};

    fn profile() -> BusinessContextProfile {
        BusinessContextProfile {
            analysis_id: "a-1".into(),
            question: "total deposits by country".into(),
            user_id: "u".into(),
            intent: Intent::new(IntentType::Aggregation, 0.8),
            domain: Domain::new("Banking", 0.7),
            entities: vec![Entity::new(
                "deposit",
                EntityType::Metric,
                "deposits",
                1,
                0.9,
                ExtractionMethod::BusinessTerm,
            )],
            business_terms: vec!["Deposit".into(), "country".into()],
            time_range: None,
            term_relevance: BTreeMap::new(),
            confidence: 0.8,
            created_at: Utc::now(),
            flags: BTreeSet::new(),
            validations: Vec::new(),
        }
    }

    #[test]
    fn focus_terms_deduplicate() {
        assert_eq!(profile().focus_terms(), vec!["deposit".to_string(), "country".to_string()]);
    }

    #[test]
    fn check_weights_sum_to_one() {
        let total: f64 = [
            CheckKind::ConfidenceThreshold,
            CheckKind::HistoricalAccuracy,
            CheckKind::Consistency,
            CheckKind::Contextual,
        ]
        .iter()
        .map(|k| k.weight())
        .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flags_serialize_snake_case() {
        let mut p = profile();
        p.flags.insert(AnalysisFlag::FallbackAnalysis);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("fallback_analysis"));
        assert!(p.is_fallback());
    }
}
