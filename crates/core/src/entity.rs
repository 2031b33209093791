//! Business entities extracted from a question.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Table,
    Column,
    Metric,
    Dimension,
    TimeReference,
    ComparisonValue,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Table,
        EntityType::Column,
        EntityType::Metric,
        EntityType::Dimension,
        EntityType::TimeReference,
        EntityType::ComparisonValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Metric => "metric",
            Self::Dimension => "dimension",
            Self::TimeReference => "time_reference",
            Self::ComparisonValue => "comparison_value",
        }
    }

    /// Accepts snake_case, camelCase and spaced spellings ("timeReference", "time reference").
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "table" => Some(Self::Table),
            "column" | "field" => Some(Self::Column),
            "metric" | "measure" => Some(Self::Metric),
            "dimension" | "attribute" => Some(Self::Dimension),
            "timereference" | "time" | "date" => Some(Self::TimeReference),
            "comparisonvalue" | "comparison" | "value" => Some(Self::ComparisonValue),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The strategy that produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    BusinessTerm,
    Ai,
    Pattern,
    Fuzzy,
    Contextual,
}

impl ExtractionMethod {
    /// Reliability weight used by the final re-score.
    pub fn reliability(&self) -> f64 {
        match self {
            Self::BusinessTerm => 1.0,
            Self::Ai => 0.95,
            Self::Pattern => 0.9,
            Self::Fuzzy => 0.85,
            Self::Contextual => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessTerm => "business_term",
            Self::Ai => "ai",
            Self::Pattern => "pattern",
            Self::Fuzzy => "fuzzy",
            Self::Contextual => "contextual",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business-meaningful token found in the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// The question text the entity was read from.
    pub original_text: String,

    /// Word index of the entity in the question.
    pub position: usize,

    /// Confidence in [0, 1].
    pub confidence: f64,

    pub extraction_method: ExtractionMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_column: Option<String>,

    /// Distinct strategies that produced this entity (after merge).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmed_by: Vec<ExtractionMethod>,
}

impl Entity {
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        original_text: impl Into<String>,
        position: usize,
        confidence: f64,
        extraction_method: ExtractionMethod,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type,
            original_text: original_text.into(),
            position,
            confidence: crate::scoring::clamp_unit(confidence),
            extraction_method,
            mapped_table: None,
            mapped_column: None,
            confirmed_by: vec![extraction_method],
        }
    }

    /// Merge key: lower-cased name plus type.
    pub fn key(&self) -> (String, EntityType) {
        (self.name.to_lowercase(), self.entity_type)
    }

    /// Number of strategies that agreed on this entity.
    pub fn confirmation_count(&self) -> usize {
        self.confirmed_by.len().max(1)
    }

    pub fn is_schema_linked(&self) -> bool {
        self.mapped_table.is_some()
    }
}
