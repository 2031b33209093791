//! Progressive context builder.
//!
//! Packs prioritized sections into the per-category budgets, then tunes the
//! result toward a healthy share of the model context:
//!
//! 1. For each category in template order, accept candidates by descending
//!    relevance while the category total stays within its budget. Rejected
//!    sections are kept.
//! 2. `utilization = (base + accepted) / max_total_tokens`.
//! 3. Below 0.7, pull in the most relevant rejected sections while the
//!    accepted total stays within `available_context_tokens`.
//! 4. Above 0.95, drop the least relevant accepted sections.
//! 5. Render: preamble, a header and sections per category, the question,
//!    then intent-specific closing instructions.
//!
//! Building is deterministic: identical inputs give identical prompts.

use crate::budget::TokenBudget;
use crate::sections::ContextSection;
use crate::template::{PromptTemplate, SYSTEM_PREAMBLE};
use querylens_core::ContextCategory;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Utilization below which rejected sections are pulled back in.
pub const FILL_THRESHOLD: f64 = 0.7;
/// Utilization above which accepted sections are dropped.
pub const TRIM_THRESHOLD: f64 = 0.95;

// ── Types ─────────────────────────────────────────────────────────────────

/// The assembled prompt and everything needed to explain or adapt it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveBuildResult {
    pub prompt: String,
    /// `base_prompt_tokens + sum(accepted token counts)`.
    pub token_count: usize,
    pub utilization: f64,
    pub budget: TokenBudget,
    /// Accepted sections in render order.
    pub accepted: Vec<ContextSection>,
    /// Candidates that did not make it, most relevant first.
    pub rejected: Vec<ContextSection>,
    pub usage: Vec<CategoryUsage>,
    pub drops: Vec<DropInfo>,
    pub trace: Vec<BuildStep>,
}

impl ProgressiveBuildResult {
    /// Every candidate the result was built from.
    pub fn candidates(&self) -> Vec<ContextSection> {
        self.accepted
            .iter()
            .chain(self.rejected.iter())
            .cloned()
            .collect()
    }

    pub fn context_tokens(&self) -> usize {
        self.accepted.iter().map(|s| s.token_count).sum()
    }

    pub fn usage_for(&self, category: ContextCategory) -> Option<&CategoryUsage> {
        self.usage.iter().find(|u| u.category == category)
    }
}

/// Token use of one category after building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub category: ContextCategory,
    pub budget: usize,
    pub tokens: usize,
    pub sections_included: usize,
    pub sections_total: usize,
}

/// Sections of one category left out of the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub category: ContextCategory,
    pub sections_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildAction {
    /// Fit within its category budget.
    Accepted,
    /// Over its category budget.
    Rejected,
    /// Pulled in to raise utilization.
    Filled,
    /// Dropped to lower utilization.
    Trimmed,
}

/// One decision made while building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub action: BuildAction,
    pub category: ContextCategory,
    pub title: String,
    pub tokens: usize,
    pub relevance: f64,
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ProgressiveContextBuilder {
    preamble: String,
    fill_threshold: f64,
    trim_threshold: f64,
}

impl ProgressiveContextBuilder {
    pub fn new() -> Self {
        Self {
            preamble: SYSTEM_PREAMBLE.to_string(),
            fill_threshold: FILL_THRESHOLD,
            trim_threshold: TRIM_THRESHOLD,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn build(
        &self,
        question: &str,
        budget: &TokenBudget,
        candidates: Vec<ContextSection>,
    ) -> ProgressiveBuildResult {
        let template = PromptTemplate::for_intent(budget.intent_type);
        let mut trace = Vec::new();
        let mut accepted: Vec<ContextSection> = Vec::new();
        let mut rejected: Vec<ContextSection> = Vec::new();

        // ── Initial packing per category ──────────────────────────────────
        for category in template.categories {
            let mut pool: Vec<ContextSection> = candidates
                .iter()
                .filter(|s| s.category == *category)
                .cloned()
                .collect();
            pool.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

            let limit = budget.category(*category);
            let mut running = 0;
            for section in pool {
                if running + section.token_count <= limit {
                    running += section.token_count;
                    trace.push(step(BuildAction::Accepted, &section));
                    accepted.push(section);
                } else {
                    trace.push(step(BuildAction::Rejected, &section));
                    rejected.push(section);
                }
            }
        }

        let max = budget.max_total_tokens;
        let utilization = |accepted: &[ContextSection]| {
            if max == 0 {
                return 0.0;
            }
            (budget.base_prompt_tokens + total(accepted)) as f64 / max as f64
        };

        // ── Fill toward the lower threshold ───────────────────────────────
        if utilization(&accepted) < self.fill_threshold && !rejected.is_empty() {
            rejected.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
            let mut kept = Vec::new();
            for section in std::mem::take(&mut rejected) {
                let fits = total(&accepted) + section.token_count <= budget.available_context_tokens;
                if fits && utilization(&accepted) < self.fill_threshold {
                    trace.push(step(BuildAction::Filled, &section));
                    accepted.push(section);
                } else {
                    kept.push(section);
                }
            }
            rejected = kept;
        }

        // ── Trim toward the upper threshold ───────────────────────────────
        if !budget.minimal {
            while utilization(&accepted) > self.trim_threshold && !accepted.is_empty() {
                let weakest = accepted
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.relevance_score.total_cmp(&b.relevance_score))
                    .map(|(i, _)| i);
                let Some(index) = weakest else { break };
                let section = accepted.remove(index);
                trace.push(step(BuildAction::Trimmed, &section));
                rejected.push(section);
            }
        }

        // Render order: template category, then relevance.
        accepted.sort_by(|a, b| {
            template
                .position(a.category)
                .cmp(&template.position(b.category))
                .then_with(|| b.relevance_score.total_cmp(&a.relevance_score))
        });
        rejected.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        let token_count = budget.base_prompt_tokens + total(&accepted);
        let utilization = utilization(&accepted);
        let prompt = self.render(&template, question, &accepted);
        let usage = category_usage(&template, budget, &accepted, &rejected);
        let drops = drop_info(&template, &rejected);

        debug!(
            intent = %budget.intent_type,
            accepted = accepted.len(),
            rejected = rejected.len(),
            token_count,
            utilization,
            minimal = budget.minimal,
            "Prompt assembled"
        );

        ProgressiveBuildResult {
            prompt,
            token_count,
            utilization,
            budget: budget.clone(),
            accepted,
            rejected,
            usage,
            drops,
            trace,
        }
    }

    fn render(&self, template: &PromptTemplate, question: &str, accepted: &[ContextSection]) -> String {
        let mut parts = vec![self.preamble.trim().to_string()];
        for category in template.categories {
            let sections: Vec<String> = accepted
                .iter()
                .filter(|s| s.category == *category)
                .map(ContextSection::render)
                .collect();
            if !sections.is_empty() {
                parts.push(format!("{}\n\n{}", category.header(), sections.join("\n\n")));
            }
        }
        parts.push(format!("## Question\n{}", question.trim()));
        parts.push(format!("## Instructions\n{}", template.closing_instructions));
        parts.join("\n\n")
    }
}

impl Default for ProgressiveContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn total(sections: &[ContextSection]) -> usize {
    sections.iter().map(|s| s.token_count).sum()
}

fn step(action: BuildAction, section: &ContextSection) -> BuildStep {
    BuildStep {
        action,
        category: section.category,
        title: section.title.clone(),
        tokens: section.token_count,
        relevance: section.relevance_score,
    }
}

fn category_usage(
    template: &PromptTemplate,
    budget: &TokenBudget,
    accepted: &[ContextSection],
    rejected: &[ContextSection],
) -> Vec<CategoryUsage> {
    template
        .categories
        .iter()
        .map(|category| {
            let included: Vec<&ContextSection> =
                accepted.iter().filter(|s| s.category == *category).collect();
            let left_out = rejected.iter().filter(|s| s.category == *category).count();
            CategoryUsage {
                category: *category,
                budget: budget.category(*category),
                tokens: included.iter().map(|s| s.token_count).sum(),
                sections_included: included.len(),
                sections_total: included.len() + left_out,
            }
        })
        .collect()
}

fn drop_info(template: &PromptTemplate, rejected: &[ContextSection]) -> Vec<DropInfo> {
    template
        .categories
        .iter()
        .filter_map(|category| {
            let dropped: Vec<&ContextSection> =
                rejected.iter().filter(|s| s.category == *category).collect();
            (!dropped.is_empty()).then(|| DropInfo {
                category: *category,
                sections_dropped: dropped.len(),
                tokens_dropped: dropped.iter().map(|s| s.token_count).sum(),
                reason: "Lowest-relevance sections exceeded the budget".into(),
            })
        })
        .collect()
}
