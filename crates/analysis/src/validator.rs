//! Confidence validation for intent, entities and domain.
//!
//! Each subject goes through four weighted checks:
//!
//! | Check      | Weight | Score                                         |
//! |------------|--------|-----------------------------------------------|
//! | Threshold  | 0.30   | `min(confidence / threshold, 1)`              |
//! | History    | 0.25   | rolling feedback score for the subject's key  |
//! | Consistency| 0.25   | lexical cues in the question                  |
//! | Contextual | 0.20   | fit with question length or schema linkage    |
//!
//! The subject is valid when the weighted score exceeds the configured
//! `valid_score`. Confidence is then adjusted by
//! `original x (0.7 x score + 0.3 x history)` within [0.1, 0.98], and the
//! score is recorded back as feedback for the key.

use futures::future::join_all;
use querylens_config::knowledge::FallbackCue;
use querylens_config::{KnowledgeBase, ValidationConfig};
use querylens_core::text::{contains_phrase, word_count};
use querylens_core::{
    AnalysisFlag, CheckKind, Domain, Entity, EntityType, FeedbackRepository, Intent, IntentType,
    ValidationCheck, ValidationResult, ValidationType,
};
use querylens_telemetry::PerformanceCounters;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

const MIN_ADJUSTED: f64 = 0.1;
const MAX_ADJUSTED: f64 = 0.98;
const INTENT_FALLBACK_CONFIDENCE: f64 = 0.6;
const DOMAIN_FALLBACK_RELEVANCE: f64 = 0.5;
const ENTITY_PENALTY: f64 = 0.7;
const ENTITY_DROP_BELOW: f64 = 0.4;
const CHECK_PASS: f64 = 0.5;

/// Validated intent, domain and entities plus what happened to them.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnalysis {
    pub intent: Intent,
    pub domain: Domain,
    pub entities: Vec<Entity>,
    pub results: Vec<ValidationResult>,
    pub flags: BTreeSet<AnalysisFlag>,
}

pub struct ConfidenceValidator {
    config: ValidationConfig,
    feedback: Arc<dyn FeedbackRepository>,
    intent_keywords: HashMap<IntentType, Vec<String>>,
    domain_keywords: HashMap<String, Vec<String>>,
    fallback_cues: Vec<FallbackCue>,
    counters: Option<Arc<PerformanceCounters>>,
}

/// Subject-specific inputs to the shared scoring.
struct Subject {
    kind: ValidationType,
    key: String,
    name: String,
    confidence: f64,
    consistency: (f64, String),
    contextual: (f64, String),
}

impl ConfidenceValidator {
    pub fn new(
        knowledge: &KnowledgeBase,
        config: ValidationConfig,
        feedback: Arc<dyn FeedbackRepository>,
    ) -> Self {
        let intent_keywords = knowledge
            .intent_keywords
            .iter()
            .map(|k| (k.intent, k.keywords.clone()))
            .collect();
        let domain_keywords = knowledge
            .domains
            .iter()
            .map(|d| {
                (
                    d.name.to_lowercase(),
                    d.weighted_keywords().into_iter().map(|(k, _)| k).collect(),
                )
            })
            .collect();
        Self {
            config,
            feedback,
            intent_keywords,
            domain_keywords,
            fallback_cues: knowledge.fallback_cues.clone(),
            counters: None,
        }
    }

    pub fn with_counters(mut self, counters: Arc<PerformanceCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Validate everything, apply fallbacks and cross-validate entities.
    pub async fn validate(
        &self,
        question: &str,
        intent: Intent,
        domain: Domain,
        entities: Vec<Entity>,
    ) -> ValidatedAnalysis {
        let entities = cross_validate(entities);

        let (intent_result, domain_result, entity_results) = tokio::join!(
            self.validate_intent(&intent, question),
            self.validate_domain(&domain, question),
            join_all(entities.iter().map(|e| self.validate_entity(e, question))),
        );

        let mut flags = BTreeSet::new();

        let intent = if intent_result.is_valid {
            Intent {
                confidence: intent_result.adjusted_confidence,
                ..intent
            }
        } else {
            let fallback = self.fallback_intent(question);
            warn!(
                rejected = %intent.intent_type,
                fallback = %fallback,
                score = intent_result.validation_score,
                "Intent failed validation"
            );
            flags.insert(AnalysisFlag::FallbackApplied);
            Intent::new(fallback, INTENT_FALLBACK_CONFIDENCE).with_keywords(intent.keywords)
        };

        let domain = if domain_result.is_valid {
            Domain {
                relevance_score: domain_result.adjusted_confidence,
                ..domain
            }
        } else {
            warn!(
                rejected = %domain.name,
                score = domain_result.validation_score,
                "Domain failed validation"
            );
            flags.insert(AnalysisFlag::FallbackApplied);
            Domain::general(DOMAIN_FALLBACK_RELEVANCE)
        };

        let mut kept = Vec::with_capacity(entities.len());
        for (mut entity, result) in entities.into_iter().zip(&entity_results) {
            if result.is_valid {
                entity.confidence = result.adjusted_confidence;
                kept.push(entity);
                continue;
            }
            let penalized = result.adjusted_confidence * ENTITY_PENALTY;
            if penalized < ENTITY_DROP_BELOW {
                debug!(entity = %entity.name, confidence = penalized, "Entity dropped after validation");
                continue;
            }
            entity.confidence = penalized;
            flags.insert(AnalysisFlag::CrossValidationWarning);
            kept.push(entity);
        }

        let mut results = vec![intent_result, domain_result];
        results.extend(entity_results);

        ValidatedAnalysis {
            intent,
            domain,
            entities: kept,
            results,
            flags,
        }
    }

    pub async fn validate_intent(&self, intent: &Intent, question: &str) -> ValidationResult {
        let lower = question.to_lowercase();
        let cue_present = self
            .intent_keywords
            .get(&intent.intent_type)
            .is_some_and(|kws| kws.iter().any(|k| contains_phrase(&lower, k)))
            || !intent.keywords.is_empty();
        let consistency = if cue_present {
            (1.0, "intent keyword present".to_string())
        } else if intent.intent_type == IntentType::Analytical {
            (0.6, "analytical needs no cue".to_string())
        } else {
            (0.3, "no intent keyword in question".to_string())
        };

        let words = word_count(question);
        let contextual = match words {
            0..=1 => (0.3, "question too short"),
            2..=3 => (0.7, "short question"),
            4..=25 => (1.0, "typical length"),
            _ => (0.8, "long question"),
        };

        self.run(Subject {
            kind: ValidationType::Intent,
            key: format!("intent:{}", intent.intent_type),
            name: intent.intent_type.to_string(),
            confidence: intent.confidence,
            consistency,
            contextual: (contextual.0, contextual.1.to_string()),
        })
        .await
    }

    pub async fn validate_entity(&self, entity: &Entity, question: &str) -> ValidationResult {
        let lower = question.to_lowercase();
        let consistency = if !entity.original_text.is_empty()
            && lower.contains(&entity.original_text.to_lowercase())
        {
            (1.0, "text found in question".to_string())
        } else {
            (0.2, "text not found in question".to_string())
        };

        let contextual = if entity.is_schema_linked() {
            (1.0, "linked to schema".to_string())
        } else if entity.confirmation_count() >= 2 {
            (0.9, format!("confirmed by {} strategies", entity.confirmation_count()))
        } else {
            (0.6, "single unlinked strategy".to_string())
        };

        self.run(Subject {
            kind: ValidationType::Entity,
            key: format!("entity:{}:{}", entity.entity_type, entity.name.to_lowercase()),
            name: entity.name.clone(),
            confidence: entity.confidence,
            consistency,
            contextual,
        })
        .await
    }

    pub async fn validate_domain(&self, domain: &Domain, question: &str) -> ValidationResult {
        let lower = question.to_lowercase();
        let keyword_present = self
            .domain_keywords
            .get(&domain.name.to_lowercase())
            .is_some_and(|kws| {
                kws.iter().any(|k| {
                    contains_phrase(&lower, k)
                        || contains_phrase(&lower, &format!("{k}s"))
                        || contains_phrase(&lower, &format!("{k}es"))
                })
            })
            || !domain.key_concepts.is_empty();
        let consistency = if keyword_present {
            (1.0, "domain keyword present".to_string())
        } else if domain.is_general() {
            (0.6, "general domain".to_string())
        } else {
            (0.3, "no domain keyword in question".to_string())
        };

        let contextual = if domain.relevance_score >= 0.3 {
            (1.0, "clear domain signal".to_string())
        } else if word_count(question) >= 4 {
            (0.5, "weak signal in a full question".to_string())
        } else {
            (0.4, "weak signal in a short question".to_string())
        };

        self.run(Subject {
            kind: ValidationType::Domain,
            key: format!("domain:{}", domain.name.to_lowercase()),
            name: domain.name.clone(),
            confidence: domain.relevance_score,
            consistency,
            contextual,
        })
        .await
    }

    /// Rule-derived intent used when the classified one is rejected.
    pub fn fallback_intent(&self, question: &str) -> IntentType {
        let lower = question.to_lowercase();
        self.fallback_cues
            .iter()
            .find(|cue| cue.phrases.iter().any(|p| contains_phrase(&lower, p)))
            .map(|cue| cue.intent)
            .unwrap_or(IntentType::Analytical)
    }

    async fn run(&self, subject: Subject) -> ValidationResult {
        let threshold = self.config.threshold(subject.kind);
        let threshold_score = if threshold > 0.0 {
            (subject.confidence / threshold).min(1.0)
        } else {
            1.0
        };

        let historical = self
            .feedback
            .threshold_feedback_score(&subject.key)
            .await
            .unwrap_or(self.config.default_accuracy);

        let checks = vec![
            ValidationCheck::new(
                CheckKind::ConfidenceThreshold,
                subject.confidence >= threshold,
                threshold_score,
                format!("{:.2} vs threshold {threshold:.2}", subject.confidence),
            ),
            ValidationCheck::new(
                CheckKind::HistoricalAccuracy,
                historical >= CHECK_PASS,
                historical,
                format!("rolling accuracy {historical:.2}"),
            ),
            ValidationCheck::new(
                CheckKind::Consistency,
                subject.consistency.0 >= CHECK_PASS,
                subject.consistency.0,
                subject.consistency.1,
            ),
            ValidationCheck::new(
                CheckKind::Contextual,
                subject.contextual.0 >= CHECK_PASS,
                subject.contextual.0,
                subject.contextual.1,
            ),
        ];

        let score: f64 = checks.iter().map(|c| c.kind.weight() * c.score).sum();
        let is_valid = score > self.config.valid_score;
        let adjusted = (subject.confidence * (0.7 * score + 0.3 * historical))
            .clamp(MIN_ADJUSTED, MAX_ADJUSTED);

        self.feedback
            .record_threshold_feedback(&subject.key, score)
            .await;
        if let Some(counters) = &self.counters {
            counters.record_confidence_delta(
                &format!("validate_{}", subject.kind.as_str()),
                adjusted - subject.confidence,
            );
        }

        debug!(
            key = %subject.key,
            score,
            is_valid,
            original = subject.confidence,
            adjusted,
            "Validated"
        );

        ValidationResult {
            validation_type: subject.kind,
            subject: subject.name,
            original_confidence: subject.confidence,
            adjusted_confidence: adjusted,
            validation_score: score,
            historical_accuracy: historical,
            is_valid,
            checks,
        }
    }
}

/// Reject metrics and columns that have neither a table entity to attach to
/// nor a schema-linked table of their own.
pub fn cross_validate(entities: Vec<Entity>) -> Vec<Entity> {
    let has_table = entities.iter().any(|e| e.entity_type == EntityType::Table);
    entities
        .into_iter()
        .filter(|e| {
            let orphan = matches!(e.entity_type, EntityType::Metric | EntityType::Column)
                && !has_table
                && !e.is_schema_linked();
            if orphan {
                debug!(entity = %e.name, "Entity rejected by cross-validation");
            }
            !orphan
        })
        .collect()
}
