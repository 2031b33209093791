//! Prompt templates: category order and closing instructions per intent.

use querylens_core::{ContextCategory, IntentType};
use ContextCategory::{BusinessContext, Examples, Glossary, Rules, Schema};

/// System preamble placed at the top of every prompt.
pub const SYSTEM_PREAMBLE: &str = "You are an expert SQL analyst for a business data warehouse. \
Answer the question with a single SQL query that uses only the tables and columns listed below. \
Respect every business rule. If the context is insufficient, say which information is missing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub intent: IntentType,
    /// Categories in the order they are packed and rendered.
    pub categories: &'static [ContextCategory],
    pub closing_instructions: &'static str,
}

const AGGREGATION: &[ContextCategory] = &[Schema, BusinessContext, Rules, Examples, Glossary];
const TREND: &[ContextCategory] = &[Schema, Examples, BusinessContext, Rules, Glossary];
const COMPARISON: &[ContextCategory] = &[Schema, BusinessContext, Examples, Rules, Glossary];
const DETAIL: &[ContextCategory] = &[Schema, Examples, BusinessContext, Rules, Glossary];
const EXPLORATORY: &[ContextCategory] = &[BusinessContext, Glossary, Schema, Examples, Rules];
const OPERATIONAL: &[ContextCategory] = &[Schema, Rules, BusinessContext, Examples, Glossary];
const ANALYTICAL: &[ContextCategory] = &[Schema, BusinessContext, Examples, Rules, Glossary];

impl PromptTemplate {
    pub fn for_intent(intent: IntentType) -> Self {
        let (categories, closing_instructions) = match intent {
            IntentType::Aggregation => (
                AGGREGATION,
                "Aggregate with SUM, COUNT or AVG as appropriate, group by every requested \
                 dimension and apply the time range in the WHERE clause.",
            ),
            IntentType::Trend => (
                TREND,
                "Bucket results by the requested time granularity and order them chronologically.",
            ),
            IntentType::Comparison => (
                COMPARISON,
                "Return the compared groups side by side with the same metric so they can be \
                 compared directly.",
            ),
            IntentType::Detail => (
                DETAIL,
                "Select individual records with the identifying columns, apply all filters and \
                 limit the result to a reasonable number of rows.",
            ),
            IntentType::Exploratory => (
                EXPLORATORY,
                "Favour a query that summarises the data broadly and state any assumptions you \
                 make about ambiguous terms.",
            ),
            IntentType::Operational => (
                OPERATIONAL,
                "Focus on current operational status and apply business rules that exclude \
                 test or invalid records.",
            ),
            IntentType::Analytical => (
                ANALYTICAL,
                "Break the analysis into clear steps using CTEs where helpful and explain the \
                 metric definitions you rely on.",
            ),
        };
        Self {
            intent,
            categories,
            closing_instructions,
        }
    }

    pub fn position(&self, category: ContextCategory) -> Option<usize> {
        self.categories.iter().position(|c| *c == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_covers_every_category_once() {
        for intent in IntentType::ALL {
            let t = PromptTemplate::for_intent(intent);
            assert_eq!(t.categories.len(), ContextCategory::ALL.len());
            for c in ContextCategory::ALL {
                assert!(t.position(c).is_some(), "{intent} misses {c}");
            }
        }
    }

    #[test]
    fn order_follows_intent() {
        assert_eq!(PromptTemplate::for_intent(IntentType::Exploratory).categories[0], BusinessContext);
        assert_eq!(PromptTemplate::for_intent(IntentType::Operational).position(Rules), Some(1));
        assert!(PromptTemplate::for_intent(IntentType::Trend)
            .closing_instructions
            .contains("chronologically"));
    }
}
