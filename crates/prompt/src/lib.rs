//! # QueryLens Prompt
//!
//! Turns a [`BusinessContextProfile`](querylens_core::BusinessContextProfile)
//! into a token-budgeted prompt.
//!
//! ## Pipeline
//!
//! | Step | Component | Output |
//! |------|-----------|--------|
//! | 1 | [`BudgetManager`] | per-category [`TokenBudget`] |
//! | 2 | [`ContextCollector`] | candidate [`ContextSection`]s |
//! | 3 | [`ContextPrioritizer`] | sections ranked by relevance |
//! | 4 | [`ProgressiveContextBuilder`] | [`ProgressiveBuildResult`] |
//!
//! [`PromptService`] runs the four steps. Feedback on a result goes through
//! [`ProgressiveContextBuilder::adapt_context_for_feedback`], which rebuilds
//! rather than mutates.

pub mod adaptation;
pub mod budget;
pub mod builder;
pub mod prioritizer;
pub mod sections;
pub mod service;
pub mod template;
pub mod token;

pub use adaptation::{AdaptationStrategy, ContextAdaptationResult, ContextFeedback, FeedbackType};
pub use budget::{BudgetManager, TokenBudget};
pub use builder::{
    BuildAction, BuildStep, CategoryUsage, DropInfo, ProgressiveBuildResult,
    ProgressiveContextBuilder,
};
pub use prioritizer::ContextPrioritizer;
pub use sections::{ContextCollector, ContextSection, SchemaContext};
pub use service::PromptService;
pub use template::PromptTemplate;
pub use token::count_tokens;
