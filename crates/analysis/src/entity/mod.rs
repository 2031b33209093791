//! Entity extraction pipeline.
//!
//! Four strategies run concurrently over the same question:
//!
//! 1. **Pattern**: regex families per entity type
//! 2. **Business term**: exact dictionary lookup plus fuzzy similarity
//! 3. **Model**: a JSON extraction prompt (optional)
//! 4. **Contextual**: neighbour-word indicators
//!
//! Raw results are merged per (name, type), linked to the schema, re-scored,
//! filtered and sorted. Results are cached per question hash.

pub mod contextual;
pub mod dictionary;
pub mod merge;
pub mod model;
pub mod patterns;

use crate::traits::{Branch, EntityExtractor};
use crate::KnowledgeError;
use async_trait::async_trait;
use contextual::ContextualExtractor;
use dictionary::{BusinessTermMatcher, DictionarySimilarity};
use futures::future::join_all;
use merge::{merge_entities, rescore, sort_entities};
use patterns::PatternExtractor;
use querylens_config::KnowledgeBase;
use querylens_core::text::{cache_key, question_hash, word_count};
use querylens_core::{
    AnalysisError, CacheService, Entity, GuardedModel, SchemaLinker, TermSimilarity,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

pub struct EntityExtractionPipeline {
    patterns: PatternExtractor,
    dictionary: BusinessTermMatcher,
    contextual: ContextualExtractor,
    model: Option<GuardedModel>,
    linker: Option<Arc<dyn SchemaLinker>>,
    cache: Option<(Arc<dyn CacheService>, Duration)>,
    min_confidence: f64,
}

impl EntityExtractionPipeline {
    /// Build the heuristic strategies from knowledge data.
    ///
    /// Fuzzy dictionary matching uses [`DictionarySimilarity`] unless
    /// replaced with [`with_similarity`](Self::with_similarity).
    pub fn new(knowledge: &KnowledgeBase) -> Result<Self, KnowledgeError> {
        let similarity: Arc<dyn TermSimilarity> =
            Arc::new(DictionarySimilarity::new(&knowledge.business_terms));
        Ok(Self {
            patterns: PatternExtractor::new(&knowledge.entity_patterns)?,
            dictionary: BusinessTermMatcher::new(knowledge.business_terms.clone(), Some(similarity)),
            contextual: ContextualExtractor::new(&knowledge.contextual_indicators),
            model: None,
            linker: None,
            cache: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        })
    }

    pub fn with_model(mut self, model: GuardedModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_similarity(mut self, knowledge: &KnowledgeBase, similarity: Arc<dyn TermSimilarity>) -> Self {
        self.dictionary = BusinessTermMatcher::new(knowledge.business_terms.clone(), Some(similarity));
        self
    }

    pub fn with_linker(mut self, linker: Arc<dyn SchemaLinker>) -> Self {
        self.linker = Some(linker);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheService>, ttl: Duration) -> Self {
        self.cache = Some((cache, ttl));
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Run all strategies without caching.
    pub async fn extract(&self, question: &str, cancel: &CancellationToken) -> Vec<Entity> {
        self.extract_branch(question, cancel).await.value
    }

    /// Run all strategies, reporting whether the model strategy failed.
    pub async fn extract_branch(&self, question: &str, cancel: &CancellationToken) -> Branch<Vec<Entity>> {
        if question.trim().is_empty() {
            return Branch::clean(Vec::new());
        }

        let model_branch = async {
            match &self.model {
                Some(model) => model::extract_with_model(model, question, cancel).await,
                None => Branch::clean(Vec::new()),
            }
        };
        let (from_patterns, from_dictionary, from_model, from_context) = tokio::join!(
            async { self.patterns.extract(question) },
            async { self.dictionary.extract(question) },
            model_branch,
            async { self.contextual.extract(question) },
        );
        let Branch {
            value: from_model,
            degraded,
        } = from_model;
        debug!(
            pattern = from_patterns.len(),
            dictionary = from_dictionary.len(),
            model = from_model.len(),
            contextual = from_context.len(),
            degraded,
            "Raw entities extracted"
        );

        let raw: Vec<Entity> = from_dictionary
            .into_iter()
            .chain(from_model)
            .chain(from_patterns)
            .chain(from_context)
            .collect();
        let mut entities = merge_entities(raw);

        if let Some(linker) = &self.linker {
            self.link(linker.as_ref(), &mut entities).await;
        }

        let words = word_count(question);
        for entity in &mut entities {
            entity.confidence = rescore(entity, words);
        }
        entities.retain(|e| e.confidence >= self.min_confidence);
        sort_entities(&mut entities);
        Branch::new(entities, degraded)
    }

    async fn link(&self, linker: &dyn SchemaLinker, entities: &mut [Entity]) {
        let links = join_all(entities.iter().map(|e| linker.link(e))).await;
        for (entity, link) in entities.iter_mut().zip(links) {
            match link {
                Ok(Some(link)) => {
                    entity.mapped_table = Some(link.table);
                    entity.mapped_column = link.column;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(entity = %entity.name, error = %e, "Schema linking failed");
                }
            }
        }
    }
}

#[async_trait]
impl EntityExtractor for EntityExtractionPipeline {
    async fn extract_entities(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Branch<Vec<Entity>>, AnalysisError> {
        let key = cache_key("entities", &question_hash(question), &[]);
        if let Some((cache, _)) = &self.cache
            && let Some(value) = cache.get(&key)
        {
            match serde_json::from_value::<Vec<Entity>>(value) {
                Ok(entities) => {
                    debug!(count = entities.len(), "Entity cache hit");
                    return Ok(Branch::clean(entities));
                }
                Err(e) => warn!(error = %e, "Discarding malformed cached entities"),
            }
        }

        let branch = self.extract_branch(question, cancel).await;

        // Heuristic-only results stay out of the cache so a recovered model is asked again.
        if let Some((cache, ttl)) = &self.cache
            && !branch.degraded
            && !cancel.is_cancelled()
        {
            match serde_json::to_value(&branch.value) {
                Ok(value) => cache.set(key, value, *ttl),
                Err(e) => warn!(error = %e, "Failed to cache entities"),
            }
        }
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use querylens_core::{EntityType, ExtractionMethod, LanguageModel, ModelError};
    use querylens_memory::{InMemoryCatalog, MokaCache};
    use std::sync::Mutex;

    const Q: &str = "What is the total deposit amount for UK players last month?";

    struct CountingModel {
        response: String,
        calls: Mutex<usize>,
    }

    impl CountingModel {
        fn new(response: &str) -> Self {
            Self {
                response: response.into(),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LanguageModel for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.response.clone())
        }
    }

    fn pipeline() -> EntityExtractionPipeline {
        EntityExtractionPipeline::new(&KnowledgeBase::builtin()).unwrap()
    }

    #[tokio::test]
    async fn example_question_entities() {
        let entities = pipeline().extract(Q, &CancellationToken::new()).await;

        let deposit = entities
            .iter()
            .find(|e| e.name == "deposit" && e.entity_type == EntityType::Metric)
            .unwrap();
        assert!(deposit.confirmed_by.contains(&ExtractionMethod::BusinessTerm));
        assert!(deposit.confirmed_by.contains(&ExtractionMethod::Pattern));
        assert!(deposit.confirmed_by.contains(&ExtractionMethod::Contextual));
        assert!(deposit.confidence > 0.85);

        assert!(entities
            .iter()
            .any(|e| e.name == "UK" && e.entity_type == EntityType::Dimension));
        assert!(entities
            .iter()
            .any(|e| e.name == "players" && e.entity_type == EntityType::Table));
        assert!(entities.iter().all(|e| e.confidence >= 0.6 && e.confidence <= 1.0));
        assert!(entities
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
    }

    #[tokio::test]
    async fn empty_question_has_no_entities() {
        assert!(pipeline().extract("   ", &CancellationToken::new()).await.is_empty());
    }

    #[tokio::test]
    async fn model_entities_are_merged() {
        let model = Arc::new(CountingModel::new(
            r#"[{"name":"deposit","type":"metric","originalText":"deposit","confidence":0.9}]"#,
        ));
        let p = pipeline().with_model(GuardedModel::new(model.clone(), Duration::from_secs(1)));
        let entities = p.extract(Q, &CancellationToken::new()).await;
        let deposit = entities.iter().find(|e| e.name == "deposit").unwrap();
        assert!(deposit.confirmed_by.contains(&ExtractionMethod::Ai));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn schema_linking_attaches_tables() {
        let p = pipeline().with_linker(Arc::new(InMemoryCatalog::sample()));
        let entities = p.extract(Q, &CancellationToken::new()).await;
        let deposit = entities.iter().find(|e| e.name == "deposit").unwrap();
        assert_eq!(deposit.mapped_table.as_deref(), Some("deposits"));
        let players = entities.iter().find(|e| e.name == "players").unwrap();
        assert_eq!(players.mapped_table.as_deref(), Some("players"));
    }

    #[tokio::test]
    async fn warm_cache_returns_identical_entities() {
        let model = Arc::new(CountingModel::new("[]"));
        let p = pipeline()
            .with_model(GuardedModel::new(model.clone(), Duration::from_secs(1)))
            .with_cache(Arc::new(MokaCache::new(100)), Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let first = p.extract_entities(Q, &cancel).await.unwrap();
        let second = p.extract_entities(Q, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert!(!first.degraded);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn degraded_extraction_is_not_cached() {
        let model = Arc::new(CountingModel::new("no entities here"));
        let p = pipeline()
            .with_model(GuardedModel::new(model.clone(), Duration::from_secs(1)))
            .with_cache(Arc::new(MokaCache::new(100)), Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let first = p.extract_entities(Q, &cancel).await.unwrap();
        assert!(first.degraded);
        assert!(first.value.iter().any(|e| e.name == "deposit"));
        let second = p.extract_entities(Q, &cancel).await.unwrap();
        assert!(second.degraded);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn failed_model_call_marks_branch_degraded() {
        struct Unavailable;

        #[async_trait]
        impl LanguageModel for Unavailable {
            fn name(&self) -> &str {
                "unavailable"
            }

            async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
                Err(ModelError::Api {
                    status_code: 503,
                    message: "service unavailable".into(),
                })
            }
        }

        let p = pipeline().with_model(GuardedModel::new(Arc::new(Unavailable), Duration::from_secs(1)));
        let branch = p.extract_branch(Q, &CancellationToken::new()).await;
        assert!(branch.degraded);
        assert_eq!(branch.value, pipeline().extract(Q, &CancellationToken::new()).await);
    }
}
