//! Context categories and token-counting content types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of supporting context in the final prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextCategory {
    Schema,
    BusinessContext,
    Examples,
    Rules,
    Glossary,
}

impl ContextCategory {
    /// Allocation order used by the budget manager.
    pub const ALL: [ContextCategory; 5] = [
        ContextCategory::Schema,
        ContextCategory::BusinessContext,
        ContextCategory::Examples,
        ContextCategory::Rules,
        ContextCategory::Glossary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::BusinessContext => "business_context",
            Self::Examples => "examples",
            Self::Rules => "rules",
            Self::Glossary => "glossary",
        }
    }

    /// Section header used in the rendered prompt.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Schema => "## Database Schema",
            Self::BusinessContext => "## Business Context",
            Self::Examples => "## Example Queries",
            Self::Rules => "## Business Rules",
            Self::Glossary => "## Glossary",
        }
    }

    /// Content type used when counting this category's tokens.
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Schema => ContentType::Schema,
            Self::BusinessContext => ContentType::Business,
            Self::Examples => ContentType::Examples,
            Self::Rules => ContentType::Rules,
            Self::Glossary => ContentType::Glossary,
        }
    }
}

impl fmt::Display for ContextCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of text being counted; each has a fixed token multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Sql,
    Json,
    Schema,
    Examples,
    Rules,
    Business,
    Glossary,
    Text,
}

impl ContentType {
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Sql => 1.3,
            Self::Json => 1.2,
            Self::Schema => 1.1,
            Self::Examples => 1.15,
            Self::Rules => 1.05,
            Self::Business | Self::Glossary | Self::Text => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_content_types() {
        assert_eq!(ContextCategory::Schema.content_type(), ContentType::Schema);
        assert_eq!(ContextCategory::Examples.content_type().multiplier(), 1.15);
        assert_eq!(ContentType::Sql.multiplier(), 1.3);
    }

    #[test]
    fn headers_are_markdown() {
        for c in ContextCategory::ALL {
            assert!(c.header().starts_with("## "));
        }
    }
}
