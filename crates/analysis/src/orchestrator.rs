//! The analysis orchestrator: fans a question out to every analysis branch,
//! validates and personalizes the result, and caches the finished profile.

use crate::domain::KeywordDomainDetector;
use crate::entity::EntityExtractionPipeline;
use crate::intent::IntentEnsemble;
use crate::personalization::Personalizer;
use crate::temporal::extract_time_range;
use crate::terms::{BusinessTerm, BusinessTermExtractor};
use crate::traits::{Branch, DomainDetector, EntityExtractor, IntentClassifier};
use crate::validator::ConfidenceValidator;
use crate::KnowledgeError;
use async_trait::async_trait;
use chrono::Utc;
use querylens_config::{AppConfig, KnowledgeBase};
use querylens_core::scoring::mean;
use querylens_core::text::{cache_key, question_hash};
use querylens_core::{
    AnalysisFlag, BusinessContextProfile, CacheService, Domain, Entity, FeedbackRepository,
    GuardedModel, Intent, MetadataService, SchemaLinker,
};
use querylens_telemetry::PerformanceCounters;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Confidence ceiling for degraded or cancelled analyses.
const DEGRADED_CONFIDENCE_CAP: f64 = 0.4;
const EMPTY_QUESTION_CONFIDENCE: f64 = 0.35;
const NO_ENTITY_CONFIDENCE: f64 = 0.5;
const BRANCH_FALLBACK_INTENT: f64 = 0.5;
const BRANCH_FALLBACK_DOMAIN: f64 = 0.3;

/// Produces a [`BusinessContextProfile`] for any question. Never fails.
pub struct ContextAnalyzer {
    /// Entity extraction branch
    entities: Arc<dyn EntityExtractor>,

    /// Intent classification branch
    intents: Arc<dyn IntentClassifier>,

    /// Domain detection branch
    domains: Arc<dyn DomainDetector>,

    terms: BusinessTermExtractor,
    validator: ConfidenceValidator,
    personalizer: Personalizer,

    /// Finished-profile cache, keyed by question hash and user
    cache: Option<Arc<dyn CacheService>>,
    cache_ttl: Duration,

    counters: Arc<PerformanceCounters>,
}

impl ContextAnalyzer {
    pub fn builder(knowledge: KnowledgeBase, config: &AppConfig) -> ContextAnalyzerBuilder {
        ContextAnalyzerBuilder::new(knowledge, config)
    }

    pub fn counters(&self) -> &Arc<PerformanceCounters> {
        &self.counters
    }

    pub async fn analyze_question(&self, question: &str, user_id: &str) -> BusinessContextProfile {
        self.analyze_question_with_cancel(question, user_id, &CancellationToken::new())
            .await
    }

    /// Analyze `question`, aborting outstanding model calls when `cancel`
    /// fires. Local results gathered so far still produce a profile.
    pub async fn analyze_question_with_cancel(
        &self,
        question: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> BusinessContextProfile {
        let started = Instant::now();
        let analysis_id = Uuid::new_v4().to_string();
        info!(
            analysis_id = %analysis_id,
            question_len = question.len(),
            user_id,
            "Analyzing question"
        );

        if question.trim().is_empty() {
            warn!(analysis_id = %analysis_id, "Empty question, returning fallback profile");
            self.counters
                .record("analyze_question", started.elapsed(), false);
            return empty_profile(analysis_id, question, user_id);
        }

        let key = cache_key("profile", &question_hash(question), &[user_id]);
        if let Some(profile) = self.cached(&key) {
            debug!(analysis_id = %profile.analysis_id, "Profile cache hit");
            self.counters
                .record("analyze_question.cached", started.elapsed(), true);
            return profile;
        }

        // ── Fan-out ──
        let (entities, intent, domain, terms, time_range) = tokio::join!(
            self.timed("extract_entities", self.entities.extract_entities(question, cancel)),
            self.timed("classify_intent", self.intents.classify_intent(question, cancel)),
            self.timed("detect_domain", self.domains.detect_domain(question)),
            self.timed("extract_terms", self.terms.extract(question)),
            async { extract_time_range(question) },
        );

        let mut degraded = false;
        let entities: Vec<Entity> = match entities {
            Ok(Branch { value, degraded: model_failed }) => {
                if model_failed {
                    warn!(analysis_id = %analysis_id, "Entity extraction fell back to heuristics");
                }
                degraded |= model_failed;
                value
            }
            Err(e) => {
                warn!(analysis_id = %analysis_id, error = %e, "Entity extraction failed");
                degraded = true;
                Vec::new()
            }
        };
        let intent: Intent = match intent {
            Ok(Branch { value, degraded: model_failed }) => {
                if model_failed {
                    warn!(analysis_id = %analysis_id, "Intent classification fell back to heuristics");
                }
                degraded |= model_failed;
                value
            }
            Err(e) => {
                warn!(analysis_id = %analysis_id, error = %e, "Intent classification failed");
                degraded = true;
                Intent::new(self.validator.fallback_intent(question), BRANCH_FALLBACK_INTENT)
            }
        };
        let domain: Domain = domain.unwrap_or_else(|e| {
            warn!(analysis_id = %analysis_id, error = %e, "Domain detection failed");
            degraded = true;
            Domain::general(BRANCH_FALLBACK_DOMAIN)
        });
        let terms: Vec<BusinessTerm> = terms.unwrap_or_else(|e| {
            warn!(analysis_id = %analysis_id, error = %e, "Business term extraction failed");
            degraded = true;
            Vec::new()
        });

        let mut flags = BTreeSet::new();
        let cancelled = cancel.is_cancelled();

        // ── Validation ──
        let (intent, domain, entities, validations) = if cancelled {
            warn!(analysis_id = %analysis_id, "Analysis cancelled, skipping validation");
            flags.insert(AnalysisFlag::Cancelled);
            (intent, domain, entities, Vec::new())
        } else {
            let validated = self
                .validator
                .validate(question, intent, domain, entities)
                .await;
            flags.extend(validated.flags);
            (
                validated.intent,
                validated.domain,
                validated.entities,
                validated.results,
            )
        };

        // ── Personalization ──
        let (domain, replaced) = self.personalizer.personalize_domain(user_id, domain);
        let term_names: Vec<String> = terms.iter().map(|t| t.term.clone()).collect();
        let boosts = self.personalizer.term_boosts(user_id, &term_names);
        if replaced || !boosts.is_empty() {
            flags.insert(AnalysisFlag::Personalized);
        }
        let term_relevance = self.terms.score(&terms, &domain, &boosts);

        // ── Overall confidence ──
        let entity_confidence = mean(&entities.iter().map(|e| e.confidence).collect::<Vec<_>>())
            .unwrap_or(NO_ENTITY_CONFIDENCE);
        let mut confidence =
            0.4 * intent.confidence + 0.3 * domain.relevance_score + 0.3 * entity_confidence;
        if degraded || cancelled {
            flags.insert(AnalysisFlag::FallbackAnalysis);
            confidence = confidence.min(DEGRADED_CONFIDENCE_CAP);
        }

        let profile = BusinessContextProfile {
            analysis_id,
            question: question.to_string(),
            user_id: user_id.to_string(),
            intent,
            domain,
            entities,
            business_terms: term_names,
            time_range,
            term_relevance,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: Utc::now(),
            flags,
            validations,
        };

        if !profile.is_fallback() {
            self.store(key, &profile);
        }
        self.counters
            .record("analyze_question", started.elapsed(), !profile.is_fallback());

        info!(
            analysis_id = %profile.analysis_id,
            intent = %profile.intent.intent_type,
            domain = %profile.domain.name,
            entities = profile.entities.len(),
            confidence = profile.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        profile
    }

    async fn timed<T, E>(&self, operation: &str, work: impl Future<Output = Result<T, E>>) -> Result<T, E> {
        let timer = self.counters.start(operation);
        let outcome = work.await;
        timer.finish(outcome.is_ok());
        outcome
    }

    fn cached(&self, key: &str) -> Option<BusinessContextProfile> {
        let value = self.cache.as_ref()?.get(key)?;
        match serde_json::from_value(value) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Discarding malformed cached profile");
                None
            }
        }
    }

    fn store(&self, key: String, profile: &BusinessContextProfile) {
        let Some(cache) = &self.cache else { return };
        match serde_json::to_value(profile) {
            Ok(value) => cache.set(key, value, self.cache_ttl),
            Err(e) => warn!(error = %e, "Failed to cache profile"),
        }
    }
}

fn empty_profile(analysis_id: String, question: &str, user_id: &str) -> BusinessContextProfile {
    BusinessContextProfile {
        analysis_id,
        question: question.to_string(),
        user_id: user_id.to_string(),
        intent: Intent::new(querylens_core::IntentType::Analytical, 0.3),
        domain: Domain::general(0.0),
        entities: Vec::new(),
        business_terms: Vec::new(),
        time_range: None,
        term_relevance: Default::default(),
        confidence: EMPTY_QUESTION_CONFIDENCE,
        created_at: Utc::now(),
        flags: BTreeSet::from([AnalysisFlag::FallbackAnalysis]),
        validations: Vec::new(),
    }
}

/// Feedback store used when none is configured: no history, nothing kept.
struct NoHistory;

#[async_trait]
impl FeedbackRepository for NoHistory {
    async fn threshold_feedback_score(&self, _key: &str) -> Option<f64> {
        None
    }

    async fn record_threshold_feedback(&self, _key: &str, _score: f64) {}
}

/// Assembles a [`ContextAnalyzer`] from knowledge, configuration and
/// optional collaborators. Branches can be replaced wholesale.
pub struct ContextAnalyzerBuilder {
    knowledge: KnowledgeBase,
    config: AppConfig,
    model: Option<GuardedModel>,
    metadata: Option<Arc<dyn MetadataService>>,
    linker: Option<Arc<dyn SchemaLinker>>,
    cache: Option<Arc<dyn CacheService>>,
    feedback: Option<Arc<dyn FeedbackRepository>>,
    counters: Option<Arc<PerformanceCounters>>,
    entity_extractor: Option<Arc<dyn EntityExtractor>>,
    intent_classifier: Option<Arc<dyn IntentClassifier>>,
    domain_detector: Option<Arc<dyn DomainDetector>>,
}

impl ContextAnalyzerBuilder {
    fn new(knowledge: KnowledgeBase, config: &AppConfig) -> Self {
        Self {
            knowledge,
            config: config.clone(),
            model: None,
            metadata: None,
            linker: None,
            cache: None,
            feedback: None,
            counters: None,
            entity_extractor: None,
            intent_classifier: None,
            domain_detector: None,
        }
    }

    pub fn with_model(mut self, model: GuardedModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_linker(mut self, linker: Arc<dyn SchemaLinker>) -> Self {
        self.linker = Some(linker);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackRepository>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_counters(mut self, counters: Arc<PerformanceCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn with_entity_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.entity_extractor = Some(extractor);
        self
    }

    pub fn with_intent_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.intent_classifier = Some(classifier);
        self
    }

    pub fn with_domain_detector(mut self, detector: Arc<dyn DomainDetector>) -> Self {
        self.domain_detector = Some(detector);
        self
    }

    pub fn build(self) -> Result<ContextAnalyzer, KnowledgeError> {
        let kb = &self.knowledge;
        let analysis = &self.config.analysis;
        let cache_ttl = Duration::from_secs(analysis.cache_ttl_secs);
        let counters = self.counters.unwrap_or_default();

        let entities: Arc<dyn EntityExtractor> = match self.entity_extractor {
            Some(custom) => custom,
            None => {
                let mut pipeline = EntityExtractionPipeline::new(kb)?
                    .with_min_confidence(analysis.min_entity_confidence);
                if let Some(model) = &self.model {
                    pipeline = pipeline.with_model(model.clone());
                }
                if let Some(linker) = &self.linker {
                    pipeline = pipeline.with_linker(linker.clone());
                }
                if let Some(cache) = &self.cache {
                    pipeline = pipeline.with_cache(cache.clone(), cache_ttl);
                }
                Arc::new(pipeline)
            }
        };

        let intents: Arc<dyn IntentClassifier> = match self.intent_classifier {
            Some(custom) => custom,
            None => {
                let mut ensemble = IntentEnsemble::new(kb)?;
                if let Some(model) = &self.model {
                    ensemble = ensemble.with_model(model.clone());
                }
                Arc::new(ensemble)
            }
        };

        let domains: Arc<dyn DomainDetector> = match self.domain_detector {
            Some(custom) => custom,
            None => {
                let mut detector = KeywordDomainDetector::new(kb, analysis)?;
                if let Some(metadata) = &self.metadata {
                    detector = detector.with_metadata(metadata.clone());
                }
                Arc::new(detector)
            }
        };

        let mut terms = BusinessTermExtractor::new(kb);
        if let Some(metadata) = &self.metadata {
            terms = terms.with_metadata(metadata.clone());
        }

        let feedback = self.feedback.unwrap_or_else(|| Arc::new(NoHistory));
        let validator = ConfidenceValidator::new(kb, self.config.validation.clone(), feedback)
            .with_counters(counters.clone());
        let personalizer = Personalizer::new(self.config.users.clone(), kb, analysis);

        info!(
            model = self.model.as_ref().map(|m| m.name()).unwrap_or("none"),
            domains = kb.domains.len(),
            cache = self.cache.is_some(),
            "Context analyzer ready"
        );

        Ok(ContextAnalyzer {
            entities,
            intents,
            domains,
            terms,
            validator,
            personalizer,
            cache: self.cache,
            cache_ttl,
            counters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querylens_config::UserPreferences;
    use querylens_core::{AnalysisError, EntityType, IntentType, LanguageModel, ModelError};
    use querylens_memory::{InMemoryCatalog, InMemoryFeedbackRepository, MokaCache};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const Q: &str = "What is the total deposit amount for UK players last month?";

    /// Answers intent prompts with `reply` and entity prompts with an empty array.
    struct CountingModel {
        reply: String,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LanguageModel for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            if prompt.contains("Classify the analytical intent") {
                Ok(self.reply.clone())
            } else {
                Ok("[]".into())
            }
        }
    }

    struct BrokenIntent;

    #[async_trait]
    impl IntentClassifier for BrokenIntent {
        async fn classify_intent(
            &self,
            _question: &str,
            _cancel: &CancellationToken,
        ) -> Result<Branch<Intent>, AnalysisError> {
            Err(AnalysisError::stage("intent_classification", "classifier offline"))
        }
    }

    fn builder() -> ContextAnalyzerBuilder {
        ContextAnalyzer::builder(KnowledgeBase::builtin(), &AppConfig::default())
    }

    #[tokio::test]
    async fn heuristic_analysis_of_example_question() {
        let analyzer = builder().build().unwrap();
        let profile = analyzer.analyze_question(Q, "u1").await;

        assert_eq!(profile.intent_type(), IntentType::Aggregation);
        assert_eq!(profile.domain.name, "Banking");
        assert!(profile
            .entities
            .iter()
            .any(|e| e.name == "deposit" && e.entity_type == EntityType::Metric));
        assert!(profile.time_range.is_some());
        assert!(!profile.is_fallback());
        assert!((0.0..=1.0).contains(&profile.confidence));
        assert!(profile.validations.len() >= 2 + profile.entities.len());
        assert_eq!(profile.business_terms, vec!["deposit", "uk", "player"]);
        assert!(profile.term_relevance["deposit"] > profile.term_relevance["uk"]);
    }

    #[tokio::test]
    async fn empty_question_is_fallback_profile() {
        let analyzer = builder().build().unwrap();
        let profile = analyzer.analyze_question("   ", "u1").await;
        assert!(profile.entities.is_empty());
        assert!(profile.domain.is_general());
        assert!((0.3..=0.4).contains(&profile.confidence));
        assert!(profile.is_fallback());
    }

    #[tokio::test]
    async fn failed_branch_degrades_without_aborting_others() {
        let analyzer = builder()
            .with_intent_classifier(Arc::new(BrokenIntent))
            .build()
            .unwrap();
        let profile = analyzer.analyze_question(Q, "u1").await;
        assert!(profile.is_fallback());
        assert!(profile.confidence <= 0.4);
        assert_eq!(profile.domain.name, "Banking");
        assert!(!profile.entities.is_empty());
    }

    #[tokio::test]
    async fn profile_cache_serves_repeat_questions() {
        let model = Arc::new(CountingModel {
            reply: "AGGREGATION|0.95".into(),
            calls: Mutex::new(0),
        });
        let analyzer = builder()
            .with_model(GuardedModel::new(model.clone(), Duration::from_secs(1)))
            .with_cache(Arc::new(MokaCache::new(100)))
            .build()
            .unwrap();

        let first = analyzer.analyze_question(Q, "u1").await;
        let calls = *model.calls.lock().unwrap();
        let second = analyzer.analyze_question(Q, "u1").await;
        assert_eq!(first, second);
        assert_eq!(*model.calls.lock().unwrap(), calls);

        let other_user = analyzer.analyze_question(Q, "u2").await;
        assert_ne!(other_user.analysis_id, first.analysis_id);
    }

    #[tokio::test]
    async fn unparseable_model_reply_degrades_and_skips_cache() {
        let model = Arc::new(CountingModel {
            reply: "no idea".into(),
            calls: Mutex::new(0),
        });
        let analyzer = builder()
            .with_model(GuardedModel::new(model.clone(), Duration::from_secs(1)))
            .with_cache(Arc::new(MokaCache::new(100)))
            .build()
            .unwrap();

        let first = analyzer.analyze_question(Q, "u1").await;
        assert!(first.has_flag(AnalysisFlag::FallbackAnalysis));
        assert!(first.confidence <= 0.4);
        assert_eq!(first.intent_type(), IntentType::Aggregation);

        let calls = *model.calls.lock().unwrap();
        let second = analyzer.analyze_question(Q, "u1").await;
        assert_ne!(second.analysis_id, first.analysis_id);
        assert!(*model.calls.lock().unwrap() > calls);
    }

    #[tokio::test]
    async fn preferred_domain_personalizes_weak_questions() {
        let mut config = AppConfig::default();
        config.users.insert(
            "analyst".into(),
            UserPreferences {
                preferred_domain: Some("Gaming".into()),
                term_boosts: HashMap::new(),
                ..Default::default()
            },
        );
        let analyzer = ContextAnalyzer::builder(KnowledgeBase::builtin(), &config)
            .build()
            .unwrap();
        let profile = analyzer.analyze_question("show me the numbers please", "analyst").await;
        assert_eq!(profile.domain.name, "Gaming");
        assert!(profile.has_flag(AnalysisFlag::Personalized));
    }

    #[tokio::test]
    async fn cancelled_analysis_is_flagged() {
        let analyzer = builder()
            .with_feedback(Arc::new(InMemoryFeedbackRepository::default()))
            .with_metadata(Arc::new(InMemoryCatalog::sample()))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let profile = analyzer.analyze_question_with_cancel(Q, "u1", &token).await;
        assert!(profile.has_flag(AnalysisFlag::Cancelled));
        assert!(profile.is_fallback());
        assert!(profile.confidence <= 0.4);
        assert!(profile.validations.is_empty());
    }

    #[tokio::test]
    async fn counters_track_branches() {
        let analyzer = builder().build().unwrap();
        analyzer.analyze_question(Q, "u1").await;
        let snapshot = analyzer.counters().snapshot();
        for op in ["extract_entities", "classify_intent", "detect_domain", "analyze_question"] {
            assert_eq!(snapshot.get(op).map(|s| s.count), Some(1), "{op}");
        }
        assert!(snapshot.get("validate_intent").is_some());
    }
}
