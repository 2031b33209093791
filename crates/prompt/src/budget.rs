//! Per-category token budgets.
//!
//! `available = max - (system + question + template) - reserved`. Each
//! category receives `floor(available * intent% * domain * user)`, in
//! [`ContextCategory::ALL`] order, truncated to whatever is left so the sum
//! never exceeds `available`. Allocations are not re-normalized, so the total
//! may fall short of `available` when multipliers are below one.
//!
//! When nothing is left for context the fixed minimal budget is returned
//! with `minimal = true`.

use crate::token::count_tokens;
use querylens_config::{BudgetConfig, CategoryWeights, UserPreferences};
use querylens_core::{BusinessContextProfile, ContentType, ContextCategory, IntentType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub intent_type: IntentType,
    pub max_total_tokens: usize,
    /// System preamble, question and template overhead.
    pub base_prompt_tokens: usize,
    pub reserved_response_tokens: usize,
    pub available_context_tokens: usize,
    pub per_category: BTreeMap<ContextCategory, usize>,
    /// Fixed fallback budget; only `sum <= available` is guaranteed.
    #[serde(default)]
    pub minimal: bool,
}

impl TokenBudget {
    pub fn category(&self, category: ContextCategory) -> usize {
        self.per_category.get(&category).copied().unwrap_or(0)
    }

    /// Sum of all category budgets.
    pub fn allocated(&self) -> usize {
        self.per_category.values().sum()
    }

    /// Tokens of `available_context_tokens` no category claimed.
    pub fn unallocated(&self) -> usize {
        self.available_context_tokens.saturating_sub(self.allocated())
    }

    /// A copy with every category scaled by `factor`, truncated in category
    /// order so the total stays within `available_context_tokens`.
    pub fn scaled(&self, factor: f64) -> TokenBudget {
        let per_category = allocate(self.available_context_tokens, |c| {
            self.category(c) as f64 * factor
        });
        TokenBudget {
            per_category,
            ..self.clone()
        }
    }

    /// A copy with `category` scaled by `factor`. Other categories give up
    /// tokens, last category first, when the total would overflow.
    pub fn shifted_toward(&self, category: ContextCategory, factor: f64) -> TokenBudget {
        let mut per_category = self.per_category.clone();
        let grown = (self.category(category) as f64 * factor.max(0.0)).floor() as usize;
        let grown = grown.min(self.available_context_tokens);
        per_category.insert(category, grown);

        let mut overflow = per_category
            .values()
            .sum::<usize>()
            .saturating_sub(self.available_context_tokens);
        for other in ContextCategory::ALL.iter().rev().filter(|c| **c != category) {
            if overflow == 0 {
                break;
            }
            if let Some(tokens) = per_category.get_mut(other) {
                let taken = overflow.min(*tokens);
                *tokens -= taken;
                overflow -= taken;
            }
        }
        TokenBudget {
            per_category,
            ..self.clone()
        }
    }
}

/// Split `available` across categories in allocation order, truncating each
/// share to the remainder.
fn allocate(
    available: usize,
    share: impl Fn(ContextCategory) -> f64,
) -> BTreeMap<ContextCategory, usize> {
    let mut remaining = available;
    ContextCategory::ALL
        .iter()
        .map(|category| {
            let raw = share(*category);
            let wanted = if raw.is_finite() && raw > 0.0 {
                raw.floor() as usize
            } else {
                0
            };
            let granted = wanted.min(remaining);
            remaining -= granted;
            (*category, granted)
        })
        .collect()
}

/// Computes token budgets from the budget configuration and per-user
/// category multipliers.
pub struct BudgetManager {
    config: BudgetConfig,
    users: HashMap<String, UserPreferences>,
}

impl BudgetManager {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            users: HashMap::new(),
        }
    }

    pub fn with_users(mut self, users: HashMap<String, UserPreferences>) -> Self {
        self.users = users;
        self
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn base_prompt_tokens(&self, question: &str) -> usize {
        self.config.system_prompt_tokens
            + count_tokens(question, ContentType::Text)
            + self.config.template_tokens
    }

    /// Budget for answering `profile` within `max_tokens`, keeping
    /// `reserved` tokens free for the response.
    pub fn create_budget(
        &self,
        profile: &BusinessContextProfile,
        max_tokens: usize,
        reserved: usize,
    ) -> TokenBudget {
        self.create_budget_for(&profile.question, profile, max_tokens, reserved)
    }

    /// Like [`create_budget`](Self::create_budget), with the base prompt
    /// sized for `question`, the text that is actually rendered.
    pub fn create_budget_for(
        &self,
        question: &str,
        profile: &BusinessContextProfile,
        max_tokens: usize,
        reserved: usize,
    ) -> TokenBudget {
        let intent = profile.intent_type();
        let base = self.base_prompt_tokens(question);
        let available = max_tokens as i64 - base as i64 - reserved as i64;

        if available <= 0 {
            warn!(
                max_tokens,
                reserved,
                base_prompt_tokens = base,
                "No room for context, using minimal budget"
            );
            return self.minimal_budget(intent, max_tokens, base, reserved);
        }
        let available = available as usize;

        let percentages = self.config.allocation(intent);
        let domain = self.config.domain_multiplier(&profile.domain.name);
        let user = self
            .users
            .get(&profile.user_id)
            .map(|p| p.category_multipliers)
            .unwrap_or(CategoryWeights::NEUTRAL);

        let per_category = allocate(available, |c| {
            available as f64 * percentages.get(c) * domain.get(c) * user.get(c)
        });

        let budget = TokenBudget {
            intent_type: intent,
            max_total_tokens: max_tokens,
            base_prompt_tokens: base,
            reserved_response_tokens: reserved,
            available_context_tokens: available,
            per_category,
            minimal: false,
        };
        debug!(
            intent = %intent,
            domain = %profile.domain.name,
            available,
            allocated = budget.allocated(),
            "Token budget created"
        );
        budget
    }

    fn minimal_budget(
        &self,
        intent: IntentType,
        max_tokens: usize,
        base: usize,
        reserved: usize,
    ) -> TokenBudget {
        let minimal = self.config.minimal;
        TokenBudget {
            intent_type: intent,
            max_total_tokens: max_tokens,
            base_prompt_tokens: base,
            reserved_response_tokens: reserved,
            available_context_tokens: minimal.total(),
            per_category: ContextCategory::ALL
                .iter()
                .map(|c| (*c, minimal.get(*c)))
                .collect(),
            minimal: true,
        }
    }
}
