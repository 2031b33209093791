//! End-to-end integration tests for the QueryLens pipeline.
//!
//! These tests exercise the full path from a business question to an
//! assembled prompt: analysis with scripted, failing and slow models,
//! profile caching, cancellation, budgeting and progressive assembly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use querylens_analysis::intent::{IntentVote, VoteMethod, combine};
use querylens_analysis::{ContextAnalyzer, IntentEnsemble};
use querylens_config::{AppConfig, KnowledgeBase};
use querylens_core::{
    AnalysisFlag, ContextCategory, EntityType, Granularity, GuardedModel, IntentType,
    LanguageModel, ModelError,
};
use querylens_memory::{InMemoryCatalog, InMemoryFeedbackRepository, MokaCache};
use querylens_prompt::{
    BudgetManager, ContextFeedback, FeedbackType, PromptService, SchemaContext,
};
use querylens_telemetry::PerformanceCounters;
use tokio_util::sync::CancellationToken;

const QUESTION: &str = "What is the total deposit amount for UK players last month?";

// ── Mock Models ──────────────────────────────────────────────────────────

/// Answers intent prompts with `AGGREGATION|0.95` and entity prompts with
/// a fixed JSON array, counting every call.
struct ScriptedModel {
    calls: Mutex<usize>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn complete(&self, prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
        *self.calls.lock().unwrap() += 1;
        if prompt.contains("Classify the analytical intent") {
            Ok("AGGREGATION|0.95".into())
        } else {
            Ok(r#"[
                {"name": "deposit", "type": "metric", "originalText": "deposit", "confidence": 0.9},
                {"name": "UK", "type": "dimension", "originalText": "UK", "confidence": 0.85}
            ]"#
            .into())
        }
    }
}

struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "e2e_failing"
    }

    async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
        Err(ModelError::Api {
            status_code: 503,
            message: "service unavailable".into(),
        })
    }
}

/// Fails the first `failures` calls with a 503, then behaves like [`ScriptedModel`].
struct FlakyModel {
    failures: Mutex<usize>,
    inner: ScriptedModel,
}

impl FlakyModel {
    fn new(failures: usize) -> Self {
        Self {
            failures: Mutex::new(failures),
            inner: ScriptedModel::new(),
        }
    }
}

#[async_trait]
impl LanguageModel for FlakyModel {
    fn name(&self) -> &str {
        "e2e_flaky"
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ModelError::Api {
                    status_code: 503,
                    message: "service unavailable".into(),
                });
            }
        }
        self.inner.complete(prompt, timeout).await
    }
}

/// Never answers within any reasonable timeout.
struct StalledModel;

#[async_trait]
impl LanguageModel for StalledModel {
    fn name(&self) -> &str {
        "e2e_stalled"
    }

    async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("AGGREGATION|0.99".into())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn analyzer_with(model: Arc<dyn LanguageModel>, timeout: Duration) -> ContextAnalyzer {
    let config = AppConfig::default();
    let catalog = Arc::new(InMemoryCatalog::sample());
    ContextAnalyzer::builder(KnowledgeBase::builtin(), &config)
        .with_model(GuardedModel::new(model, timeout))
        .with_metadata(catalog.clone())
        .with_linker(catalog)
        .with_cache(Arc::new(MokaCache::new(1_000)))
        .with_feedback(Arc::new(InMemoryFeedbackRepository::default()))
        .build()
        .unwrap()
}

// ── Analysis ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn scripted_model_analyzes_example_question() {
    let model = Arc::new(ScriptedModel::new());
    let ensemble = IntentEnsemble::new(&KnowledgeBase::builtin())
        .unwrap()
        .with_model(GuardedModel::new(model.clone(), Duration::from_secs(2)));
    let classification = ensemble.classify(QUESTION, &CancellationToken::new()).await;
    assert_eq!(classification.intent.intent_type, IntentType::Aggregation);
    assert!(classification.intent.confidence > 0.7);

    let analyzer = analyzer_with(model, Duration::from_secs(2));
    let profile = analyzer.analyze_question(QUESTION, "analyst").await;

    assert_eq!(profile.intent_type(), IntentType::Aggregation);
    assert_eq!(profile.domain.name, "Banking");
    assert!(profile
        .entities
        .iter()
        .any(|e| e.name == "deposit" && e.entity_type == EntityType::Metric));
    assert!(profile
        .entities
        .iter()
        .any(|e| e.name.eq_ignore_ascii_case("uk") && e.entity_type == EntityType::Dimension));
    assert!(!profile.is_fallback());
    assert!((0.0..=1.0).contains(&profile.confidence));

    let range = profile.time_range.as_ref().expect("last month resolves");
    let now = Utc::now();
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .unwrap();
    assert_eq!(range.granularity, Granularity::Month);
    assert_eq!(range.end, month_start);
    assert_eq!(range.start.day(), 1);
    assert!(range.start < range.end);
}

#[tokio::test]
async fn failing_model_degrades_to_heuristics() {
    let analyzer = analyzer_with(Arc::new(FailingModel), Duration::from_secs(2));
    let profile = analyzer.analyze_question(QUESTION, "analyst").await;

    assert_eq!(profile.intent_type(), IntentType::Aggregation);
    assert_eq!(profile.domain.name, "Banking");
    assert!(profile
        .entities
        .iter()
        .any(|e| e.name == "deposit" && e.entity_type == EntityType::Metric));
    assert!(profile.has_flag(AnalysisFlag::FallbackAnalysis));
    assert!(profile.confidence <= 0.4);

    // Degraded profiles are never served from cache.
    let again = analyzer.analyze_question(QUESTION, "analyst").await;
    assert_ne!(again.analysis_id, profile.analysis_id);
    assert!(again.is_fallback());
}

#[tokio::test]
async fn recovered_model_is_not_shadowed_by_degraded_profile() {
    let model = Arc::new(FlakyModel::new(1));
    let analyzer = analyzer_with(model.clone(), Duration::from_secs(2));

    let degraded = analyzer.analyze_question(QUESTION, "analyst").await;
    assert!(degraded.has_flag(AnalysisFlag::FallbackAnalysis));
    assert!(degraded.confidence <= 0.4);

    let recovered = analyzer.analyze_question(QUESTION, "analyst").await;
    assert_ne!(recovered.analysis_id, degraded.analysis_id);
    assert!(!recovered.is_fallback());
    assert!(recovered.confidence > degraded.confidence);

    // The healthy profile is the one that gets cached.
    let calls = model.inner.calls();
    let cached = analyzer.analyze_question(QUESTION, "analyst").await;
    assert_eq!(cached, recovered);
    assert_eq!(model.inner.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn stalled_model_times_out_and_analysis_completes() {
    let analyzer = analyzer_with(Arc::new(StalledModel), Duration::from_millis(200));
    let profile = analyzer.analyze_question(QUESTION, "analyst").await;

    assert_eq!(profile.domain.name, "Banking");
    assert_eq!(profile.intent_type(), IntentType::Aggregation);
    assert!(profile.intent.confidence < 0.99);
    assert!(!profile.entities.is_empty());
    assert!(profile.has_flag(AnalysisFlag::FallbackAnalysis));
    assert!(profile.confidence <= 0.4);
}

#[tokio::test]
async fn empty_question_yields_general_fallback() {
    let analyzer = analyzer_with(Arc::new(ScriptedModel::new()), Duration::from_secs(2));
    let profile = analyzer.analyze_question("", "analyst").await;

    assert!(profile.entities.is_empty());
    assert!(profile.domain.is_general());
    assert!((0.3..=0.4).contains(&profile.confidence));
    assert!(profile.has_flag(AnalysisFlag::FallbackAnalysis));
}

#[tokio::test]
async fn warm_cache_returns_identical_profile() {
    let model = Arc::new(ScriptedModel::new());
    let analyzer = analyzer_with(model.clone(), Duration::from_secs(2));

    let first = analyzer.analyze_question(QUESTION, "analyst").await;
    let calls = model.calls();
    let second = analyzer.analyze_question(QUESTION, "analyst").await;

    assert_eq!(first, second);
    assert_eq!(model.calls(), calls);
}

#[tokio::test]
async fn cancellation_yields_flagged_best_effort_profile() {
    let analyzer = analyzer_with(Arc::new(StalledModel), Duration::from_secs(60));
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let profile = analyzer
        .analyze_question_with_cancel(QUESTION, "analyst", &token)
        .await;

    assert!(profile.has_flag(AnalysisFlag::Cancelled));
    assert!(profile.is_fallback());
    assert!(profile.confidence <= 0.4);
}

#[test]
fn ensemble_is_independent_of_vote_order() {
    let votes = vec![
        IntentVote::new(IntentType::Aggregation, 0.95, VoteMethod::Ai),
        IntentVote::new(IntentType::Aggregation, 0.8, VoteMethod::Pattern),
        IntentVote::new(IntentType::Comparison, 0.4, VoteMethod::Semantic),
        IntentVote::new(IntentType::Aggregation, 0.54, VoteMethod::Structural),
    ];
    let expected = combine(&votes);
    for shift in 1..votes.len() {
        let mut rotated = votes.clone();
        rotated.rotate_left(shift);
        assert_eq!(combine(&rotated), expected);
    }
    let mut reversed = votes;
    reversed.reverse();
    assert_eq!(combine(&reversed), expected);
}

// ── Prompt assembly ──────────────────────────────────────────────────────

#[tokio::test]
async fn tight_limit_produces_minimal_budget() {
    let analyzer = analyzer_with(Arc::new(FailingModel), Duration::from_secs(2));
    let profile = analyzer.analyze_question(QUESTION, "analyst").await;

    let budget = BudgetManager::new(AppConfig::default().budget).create_budget(&profile, 1000, 800);
    assert!(budget.minimal);
    assert_eq!(budget.category(ContextCategory::Schema), 400);
}

#[tokio::test]
async fn question_to_prompt_round_trip() {
    let config = AppConfig::default();
    let counters = Arc::new(PerformanceCounters::new());
    let catalog = Arc::new(InMemoryCatalog::sample());
    let analyzer = ContextAnalyzer::builder(KnowledgeBase::builtin(), &config)
        .with_model(GuardedModel::new(
            Arc::new(ScriptedModel::new()),
            Duration::from_secs(2),
        ))
        .with_metadata(catalog.clone())
        .with_linker(catalog.clone())
        .with_counters(counters.clone())
        .build()
        .unwrap();
    let prompts = PromptService::new(&config)
        .with_metadata(catalog)
        .with_counters(counters.clone());

    let profile = analyzer.analyze_question(QUESTION, "analyst").await;
    let result = prompts
        .build_prompt(QUESTION, &profile, &SchemaContext::default(), 8192, 1024)
        .await;

    assert!(!result.budget.minimal);
    assert!(result.token_count <= 8192 - 1024);
    assert!(result.prompt.contains("## Database Schema"));
    assert!(result.prompt.contains("### Table deposits"));
    assert!(result.prompt.contains(QUESTION));
    assert!(result.prompt.contains("## Instructions"));
    assert_eq!(
        result.token_count,
        result.budget.base_prompt_tokens + result.context_tokens()
    );

    // Same inputs, same prompt.
    let again = prompts
        .build_prompt(QUESTION, &profile, &SchemaContext::default(), 8192, 1024)
        .await;
    assert_eq!(again.prompt, result.prompt);

    let shorter = prompts.adapt(
        QUESTION,
        &result,
        &ContextFeedback::new(FeedbackType::TooMuchContext),
    );
    assert!(shorter.token_delta <= 0);
    assert!(shorter.result.token_count <= result.token_count);

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.get("analyze_question").map(|s| s.count), Some(1));
    assert_eq!(snapshot.get("build_prompt").map(|s| s.count), Some(2));
    assert_eq!(snapshot.get("adapt_context").map(|s| s.count), Some(1));
}
