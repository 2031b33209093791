//! Prompt service: budget, collect, prioritize, build.

use crate::adaptation::{ContextAdaptationResult, ContextFeedback};
use crate::budget::BudgetManager;
use crate::builder::{ProgressiveBuildResult, ProgressiveContextBuilder};
use crate::prioritizer::ContextPrioritizer;
use crate::sections::{ContextCollector, SchemaContext};
use querylens_config::AppConfig;
use querylens_core::{BusinessContextProfile, EmbeddingService, MetadataService};
use querylens_telemetry::PerformanceCounters;
use std::sync::Arc;
use tracing::info;

pub struct PromptService {
    budgets: BudgetManager,
    collector: ContextCollector,
    prioritizer: ContextPrioritizer,
    builder: ProgressiveContextBuilder,
    counters: Arc<PerformanceCounters>,
}

impl PromptService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            budgets: BudgetManager::new(config.budget.clone()).with_users(config.users.clone()),
            collector: ContextCollector::new(),
            prioritizer: ContextPrioritizer::new(),
            builder: ProgressiveContextBuilder::new(),
            counters: Arc::new(PerformanceCounters::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.collector = self.collector.with_metadata(metadata);
        self
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingService>) -> Self {
        self.prioritizer = self.prioritizer.with_embeddings(embeddings);
        self
    }

    pub fn with_counters(mut self, counters: Arc<PerformanceCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn budgets(&self) -> &BudgetManager {
        &self.budgets
    }

    /// Assemble a prompt for `question` within `max_tokens`, leaving
    /// `reserved` tokens for the response. Always produces a complete prompt.
    pub async fn build_prompt(
        &self,
        question: &str,
        profile: &BusinessContextProfile,
        schema: &SchemaContext,
        max_tokens: usize,
        reserved: usize,
    ) -> ProgressiveBuildResult {
        let timer = self.counters.start("build_prompt");
        info!(
            analysis_id = %profile.analysis_id,
            max_tokens,
            reserved,
            "Building prompt"
        );

        let budget = self
            .budgets
            .create_budget_for(question, profile, max_tokens, reserved);
        let candidates = self.collector.collect(profile, schema).await;
        let ranked = self.prioritizer.prioritize(profile, candidates).await;
        let result = self.builder.build(question, &budget, ranked);

        info!(
            analysis_id = %profile.analysis_id,
            token_count = result.token_count,
            sections = result.accepted.len(),
            utilization = result.utilization,
            minimal_budget = result.budget.minimal,
            "Prompt built"
        );
        timer.finish(true);
        result
    }

    /// Rebuild a previous result in response to feedback.
    pub fn adapt(
        &self,
        question: &str,
        original: &ProgressiveBuildResult,
        feedback: &ContextFeedback,
    ) -> ContextAdaptationResult {
        let timer = self.counters.start("adapt_context");
        let adapted = self
            .builder
            .adapt_context_for_feedback(question, original, feedback);
        timer.finish(true);
        adapted
    }
}
