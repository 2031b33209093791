//! Declarative business knowledge: domain keyword profiles, dictionary
//! terms, regex families and rule tables.
//!
//! The scoring code in `querylens-analysis` is generic over this data.
//! A built-in copy ships with the crate (`defaults/knowledge.toml`).

use crate::ConfigError;
use querylens_core::{EntityType, IntentType};
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_KNOWLEDGE: &str = include_str!("../defaults/knowledge.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub domains: Vec<DomainProfile>,

    #[serde(default)]
    pub disambiguation: Vec<DisambiguationRule>,

    #[serde(default)]
    pub business_terms: Vec<BusinessTermEntry>,

    #[serde(default)]
    pub entity_patterns: Vec<EntityPatternFamily>,

    #[serde(default)]
    pub contextual_indicators: Vec<ContextualIndicators>,

    #[serde(default)]
    pub intent_patterns: Vec<IntentPatternFamilies>,

    #[serde(default)]
    pub intent_keywords: Vec<IntentKeywords>,

    #[serde(default)]
    pub structural_rules: Vec<StructuralRule>,

    #[serde(default)]
    pub fallback_cues: Vec<FallbackCue>,
}

/// Weighted keyword profile of one business domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProfile {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub related_tables: Vec<String>,

    /// Keywords weighted 3.0.
    #[serde(default)]
    pub high_priority: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Terms that each add `bonus_per_term` (total capped at 0.3).
    #[serde(default)]
    pub bonus_terms: Vec<String>,

    #[serde(default)]
    pub bonus_per_term: f64,
}

impl DomainProfile {
    /// All keywords paired with their weight, high-priority terms first.
    pub fn weighted_keywords(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = Vec::new();
        for k in &self.high_priority {
            out.push((k.to_lowercase(), 3.0));
        }
        for k in &self.keywords {
            let lower = k.to_lowercase();
            if out.iter().any(|(existing, _)| *existing == lower) {
                continue;
            }
            let weight = if lower.contains(' ') || lower.chars().count() > 6 {
                2.0
            } else {
                1.0
            };
            out.push((lower, weight));
        }
        out
    }
}

/// Tie-break override between close-scoring domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisambiguationRule {
    pub prefer: String,
    pub over: Vec<String>,
    /// Strong terms; any one present triggers the override.
    pub when_any: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessTermEntry {
    pub term: String,
    pub entity_type: EntityType,
    /// Entity name to emit; defaults to `term`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

impl BusinessTermEntry {
    pub fn entity_name(&self) -> &str {
        self.canonical.as_deref().unwrap_or(&self.term)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPatternFamily {
    pub entity_type: EntityType,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualIndicators {
    pub entity_type: EntityType,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPatternFamilies {
    pub intent: IntentType,
    pub families: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentKeywords {
    pub intent: IntentType,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralRule {
    pub intent: IntentType,
    pub confidence: f64,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackCue {
    pub intent: IntentType,
    pub phrases: Vec<String>,
}

impl KnowledgeBase {
    /// The knowledge shipped with QueryLens.
    ///
    /// # Panics
    ///
    /// Panics if the embedded file is malformed, which is a build defect.
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_KNOWLEDGE)
            .unwrap_or_else(|e| panic!("embedded knowledge.toml is invalid: {e}"))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let kb: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: "knowledge.toml".into(),
            reason: e.to_string(),
        })?;
        kb.validate()?;
        Ok(kb)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let kb: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        kb.validate()?;
        tracing::info!(
            path = %path.display(),
            domains = kb.domains.len(),
            terms = kb.business_terms.len(),
            "Loaded knowledge base"
        );
        Ok(kb)
    }

    pub fn domain(&self, name: &str) -> Option<&DomainProfile> {
        self.domains.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn keywords_for(&self, intent: IntentType) -> &[String] {
        self.intent_keywords
            .iter()
            .find(|k| k.intent == intent)
            .map(|k| k.keywords.as_slice())
            .unwrap_or(&[])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for d in &self.domains {
            if d.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("domain with empty name".into()));
            }
            if d.high_priority.is_empty() && d.keywords.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "domain '{}' has no keywords",
                    d.name
                )));
            }
            if !(0.0..=0.3).contains(&d.bonus_per_term) {
                return Err(ConfigError::ValidationError(format!(
                    "domain '{}': bonus_per_term must be within [0, 0.3]",
                    d.name
                )));
            }
        }
        for rule in &self.disambiguation {
            if self.domain(&rule.prefer).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "disambiguation prefers unknown domain '{}'",
                    rule.prefer
                )));
            }
        }
        for rule in &self.structural_rules {
            if !(0.0..=1.0).contains(&rule.confidence) {
                return Err(ConfigError::ValidationError(format!(
                    "structural rule for {} has confidence outside [0, 1]",
                    rule.intent
                )));
            }
        }
        Ok(())
    }
}
