//! Feedback-driven re-packing.
//!
//! Each feedback type maps to one strategy that adjusts the budget or the
//! candidate pool before assembly runs again. The original result is left
//! untouched; adaptation always yields a new [`ContextAdaptationResult`].

use crate::budget::TokenBudget;
use crate::builder::{ProgressiveBuildResult, ProgressiveContextBuilder};
use crate::sections::ContextSection;
use querylens_core::ContextCategory;
use serde::{Deserialize, Serialize};
use tracing::info;

const REDUCE_FACTOR: f64 = 0.7;
const EXPAND_FACTOR: f64 = 1.3;
const GROW_FACTOR: f64 = 1.5;
/// Sections below this relevance are discarded when refining.
const REFINE_MIN_RELEVANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    TooMuchContext,
    TooLittleContext,
    IrrelevantContext,
    MissingInformation,
    IncorrectSql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationStrategy {
    Reduce,
    Expand,
    Refine,
    Add,
    ImproveExamples,
}

impl FeedbackType {
    pub fn strategy(&self) -> AdaptationStrategy {
        match self {
            Self::TooMuchContext => AdaptationStrategy::Reduce,
            Self::TooLittleContext => AdaptationStrategy::Expand,
            Self::IrrelevantContext => AdaptationStrategy::Refine,
            Self::MissingInformation => AdaptationStrategy::Add,
            Self::IncorrectSql => AdaptationStrategy::ImproveExamples,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "too_much_context" => Some(Self::TooMuchContext),
            "too_little_context" => Some(Self::TooLittleContext),
            "irrelevant_context" => Some(Self::IrrelevantContext),
            "missing_information" => Some(Self::MissingInformation),
            "incorrect_sql" => Some(Self::IncorrectSql),
            _ => None,
        }
    }
}

/// Feedback on a built prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFeedback {
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Extra candidates offered with `MissingInformation` feedback.
    #[serde(default)]
    pub additional_sections: Vec<ContextSection>,
}

impl ContextFeedback {
    pub fn new(feedback_type: FeedbackType) -> Self {
        Self {
            feedback_type,
            comment: None,
            additional_sections: Vec::new(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<ContextSection>) -> Self {
        self.additional_sections = sections;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAdaptationResult {
    pub feedback_type: FeedbackType,
    pub strategy: AdaptationStrategy,
    pub result: ProgressiveBuildResult,
    /// Change in context tokens versus the original result.
    pub token_delta: i64,
    pub sections_added: Vec<String>,
    pub sections_removed: Vec<String>,
}

impl ProgressiveContextBuilder {
    /// Rebuild `original` according to `feedback`.
    pub fn adapt_context_for_feedback(
        &self,
        question: &str,
        original: &ProgressiveBuildResult,
        feedback: &ContextFeedback,
    ) -> ContextAdaptationResult {
        let strategy = feedback.feedback_type.strategy();
        let (budget, candidates) = adjust(strategy, original, feedback);
        let result = self.build(question, &budget, candidates);

        let before: Vec<&str> = original.accepted.iter().map(|s| s.title.as_str()).collect();
        let after: Vec<&str> = result.accepted.iter().map(|s| s.title.as_str()).collect();
        let sections_added = after
            .iter()
            .filter(|t| !before.contains(*t))
            .map(|t| t.to_string())
            .collect();
        let sections_removed = before
            .iter()
            .filter(|t| !after.contains(*t))
            .map(|t| t.to_string())
            .collect();
        let token_delta = result.context_tokens() as i64 - original.context_tokens() as i64;

        info!(
            feedback = ?feedback.feedback_type,
            strategy = ?strategy,
            token_delta,
            "Context adapted to feedback"
        );

        ContextAdaptationResult {
            feedback_type: feedback.feedback_type,
            strategy,
            result,
            token_delta,
            sections_added,
            sections_removed,
        }
    }
}

fn adjust(
    strategy: AdaptationStrategy,
    original: &ProgressiveBuildResult,
    feedback: &ContextFeedback,
) -> (TokenBudget, Vec<ContextSection>) {
    let budget = &original.budget;
    let candidates = original.candidates();
    match strategy {
        AdaptationStrategy::Reduce => {
            // Cap below what was used so filling cannot restore the old size.
            let cap = (original.context_tokens() as f64 * REDUCE_FACTOR).floor() as usize;
            let capped = TokenBudget {
                available_context_tokens: cap.min(budget.available_context_tokens),
                ..budget.clone()
            };
            (capped.scaled(REDUCE_FACTOR), candidates)
        }
        AdaptationStrategy::Expand => (budget.scaled(EXPAND_FACTOR), candidates),
        AdaptationStrategy::Refine => {
            let refined = candidates
                .into_iter()
                .filter(|s| s.relevance_score >= REFINE_MIN_RELEVANCE)
                .collect();
            (budget.clone(), refined)
        }
        AdaptationStrategy::Add => {
            let mut pool = candidates;
            for extra in &feedback.additional_sections {
                if !pool.iter().any(|s| s.title == extra.title && s.category == extra.category) {
                    pool.push(extra.clone());
                }
            }
            let grown = ContextCategory::ALL.iter().fold(budget.clone(), |b, category| {
                let wants_more = feedback.additional_sections.iter().any(|s| s.category == *category);
                if wants_more {
                    b.shifted_toward(*category, GROW_FACTOR)
                } else {
                    b
                }
            });
            (grown, pool)
        }
        AdaptationStrategy::ImproveExamples => (
            budget.shifted_toward(ContextCategory::Examples, GROW_FACTOR),
            candidates,
        ),
    }
}
