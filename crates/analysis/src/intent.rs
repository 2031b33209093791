//! Weighted four-classifier intent ensemble.
//!
//! | Method     | Weight | Signal                                   |
//! |------------|--------|------------------------------------------|
//! | AI         | 0.4    | `INTENT|confidence` from the model        |
//! | Pattern    | 0.3    | fraction of regex families matched        |
//! | Semantic   | 0.2    | fraction of intent keywords present       |
//! | Structural | 0.1    | first high-precision phrase rule matching |
//!
//! Each classifier degrades to a fixed `Analytical` vote instead of failing.

use crate::traits::{Branch, IntentClassifier};
use crate::{compile, KnowledgeError};
use async_trait::async_trait;
use querylens_config::knowledge::StructuralRule;
use querylens_config::KnowledgeBase;
use querylens_core::scoring::clamp_unit;
use querylens_core::text::{contains_phrase, words};
use querylens_core::{AnalysisError, GuardedModel, Intent, IntentType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const PATTERN_FACTOR: f64 = 0.8;
const PATTERN_CAP: f64 = 0.95;
const SEMANTIC_FACTOR: f64 = 0.7;
const SEMANTIC_SIMILARITY: f64 = 0.8;
const STRUCTURAL_FACTOR: f64 = 0.6;
const MODEL_FALLBACK: f64 = 0.3;
const STRUCTURAL_FALLBACK: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteMethod {
    Ai,
    Pattern,
    Semantic,
    Structural,
}

impl VoteMethod {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Ai => 0.4,
            Self::Pattern => 0.3,
            Self::Semantic => 0.2,
            Self::Structural => 0.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Pattern => "pattern",
            Self::Semantic => "semantic",
            Self::Structural => "structural",
        }
    }
}

/// One classifier's opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentVote {
    pub intent: IntentType,
    pub confidence: f64,
    pub method: VoteMethod,
}

impl IntentVote {
    pub fn new(intent: IntentType, confidence: f64, method: VoteMethod) -> Self {
        Self {
            intent,
            confidence: clamp_unit(confidence),
            method,
        }
    }
}

/// The ensemble's decision together with the votes behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub votes: Vec<IntentVote>,
    /// The model vote is a stand-in because the model call failed.
    #[serde(default)]
    pub degraded: bool,
}

pub struct IntentEnsemble {
    families: Vec<(IntentType, Vec<Regex>)>,
    keywords: Vec<(IntentType, Vec<String>)>,
    structural: Vec<StructuralRule>,
    model: Option<GuardedModel>,
}

impl IntentEnsemble {
    pub fn new(knowledge: &KnowledgeBase) -> Result<Self, KnowledgeError> {
        let mut families = Vec::with_capacity(knowledge.intent_patterns.len());
        for entry in &knowledge.intent_patterns {
            let context = format!("{} intent", entry.intent);
            let compiled = entry
                .families
                .iter()
                .map(|p| compile(&context, &format!("(?i){p}")))
                .collect::<Result<Vec<_>, _>>()?;
            families.push((entry.intent, compiled));
        }

        let keywords = knowledge
            .intent_keywords
            .iter()
            .map(|k| {
                (
                    k.intent,
                    k.keywords.iter().map(|w| w.trim().to_lowercase()).collect(),
                )
            })
            .collect();

        Ok(Self {
            families,
            keywords,
            structural: knowledge.structural_rules.clone(),
            model: None,
        })
    }

    pub fn with_model(mut self, model: GuardedModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Run every classifier and combine their votes.
    pub async fn classify(&self, question: &str, cancel: &CancellationToken) -> IntentClassification {
        let model_vote = async {
            match &self.model {
                Some(model) => self.model_vote(model, question, cancel).await,
                None => (None, false),
            }
        };
        let ((ai, degraded), pattern, semantic, structural) = tokio::join!(
            model_vote,
            async { self.pattern_vote(question) },
            async { self.semantic_vote(question) },
            async { self.structural_vote(question) },
        );

        let votes: Vec<IntentVote> = ai
            .into_iter()
            .chain([pattern, semantic, structural])
            .collect();
        let combined = combine(&votes);
        let keywords = self.matched_keywords(combined.intent_type, question);

        debug!(
            intent = %combined.intent_type,
            confidence = combined.confidence,
            votes = votes.len(),
            degraded,
            "Intent ensemble decided"
        );

        IntentClassification {
            intent: combined.with_keywords(keywords),
            votes,
            degraded,
        }
    }

    /// Fraction of an intent's regex families that match, x 0.8 (cap 0.95).
    pub fn pattern_vote(&self, question: &str) -> IntentVote {
        let mut best: Option<(IntentType, f64)> = None;
        for intent in IntentType::ALL {
            let Some((_, families)) = self.families.iter().find(|(i, _)| *i == intent) else {
                continue;
            };
            if families.is_empty() {
                continue;
            }
            let matched = families.iter().filter(|re| re.is_match(question)).count();
            if matched == 0 {
                continue;
            }
            let score = (matched as f64 / families.len() as f64 * PATTERN_FACTOR).min(PATTERN_CAP);
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((intent, score));
            }
        }
        let (intent, score) = best.unwrap_or((IntentType::Analytical, 0.0));
        IntentVote::new(intent, score, VoteMethod::Pattern)
    }

    /// Fraction of an intent's keywords present, x 0.7.
    pub fn semantic_vote(&self, question: &str) -> IntentVote {
        let mut best: Option<(IntentType, f64)> = None;
        for intent in IntentType::ALL {
            let Some((_, keywords)) = self.keywords.iter().find(|(i, _)| *i == intent) else {
                continue;
            };
            if keywords.is_empty() {
                continue;
            }
            let matched = self.matched_keywords(intent, question).len();
            if matched == 0 {
                continue;
            }
            let score = matched as f64 / keywords.len() as f64 * SEMANTIC_FACTOR;
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((intent, score));
            }
        }
        let (intent, score) = best.unwrap_or((IntentType::Analytical, 0.0));
        IntentVote::new(intent, score, VoteMethod::Semantic)
    }

    /// First matching phrase rule, x 0.6.
    pub fn structural_vote(&self, question: &str) -> IntentVote {
        let lower = question.to_lowercase();
        self.structural
            .iter()
            .find(|rule| rule.phrases.iter().any(|p| contains_phrase(&lower, p)))
            .map(|rule| {
                IntentVote::new(rule.intent, rule.confidence * STRUCTURAL_FACTOR, VoteMethod::Structural)
            })
            .unwrap_or_else(|| {
                IntentVote::new(IntentType::Analytical, STRUCTURAL_FALLBACK, VoteMethod::Structural)
            })
    }

    /// The AI vote and whether it had to fall back.
    ///
    /// An unconfigured model casts no vote at all, like a missing one.
    async fn model_vote(
        &self,
        model: &GuardedModel,
        question: &str,
        cancel: &CancellationToken,
    ) -> (Option<IntentVote>, bool) {
        let fallback = IntentVote::new(IntentType::Analytical, MODEL_FALLBACK, VoteMethod::Ai);
        match model.complete(&classification_prompt(question), cancel).await {
            Ok(response) => match parse_model_intent(&response) {
                Some((intent, confidence)) => {
                    (Some(IntentVote::new(intent, confidence, VoteMethod::Ai)), false)
                }
                None => {
                    warn!(model = %model.name(), "Unparseable intent classification");
                    (Some(fallback), true)
                }
            },
            Err(e) if e.is_not_configured() => {
                debug!(model = %model.name(), "No model configured for intent classification");
                (None, false)
            }
            Err(e) => {
                warn!(model = %model.name(), error = %e, "Model intent classification failed");
                (Some(fallback), true)
            }
        }
    }

    /// Keywords of `intent` present in the question, in list order.
    fn matched_keywords(&self, intent: IntentType, question: &str) -> Vec<String> {
        let Some((_, keywords)) = self.keywords.iter().find(|(i, _)| *i == intent) else {
            return Vec::new();
        };
        let lower = question.to_lowercase();
        let tokens = words(question);
        keywords
            .iter()
            .filter(|k| {
                if k.contains(' ') {
                    return contains_phrase(&lower, k);
                }
                tokens.iter().any(|w| {
                    w.lower == **k || strsim::normalized_levenshtein(&w.lower, k) > SEMANTIC_SIMILARITY
                })
            })
            .cloned()
            .collect()
    }
}

/// Weighted vote: per intent sum `confidence x weight`, divide by the total
/// weight cast, take the argmax. Ties go to the earlier [`IntentType`].
pub fn combine(votes: &[IntentVote]) -> Intent {
    if votes.is_empty() {
        return Intent::new(IntentType::Analytical, 0.0);
    }

    let mut ordered: Vec<&IntentVote> = votes.iter().collect();
    ordered.sort_by(|a, b| a.method.cmp(&b.method).then(a.intent.cmp(&b.intent)));

    let total_weight: f64 = ordered.iter().map(|v| v.method.weight()).sum();
    let mut scores: BTreeMap<IntentType, f64> = BTreeMap::new();
    for vote in &ordered {
        *scores.entry(vote.intent).or_default() += vote.confidence * vote.method.weight();
    }

    let mut best = (IntentType::Analytical, f64::MIN);
    for intent in IntentType::ALL {
        if let Some(score) = scores.get(&intent)
            && *score > best.1
        {
            best = (intent, *score);
        }
    }
    Intent::new(best.0, best.1 / total_weight)
}

pub fn classification_prompt(question: &str) -> String {
    let labels: Vec<&str> = IntentType::ALL
        .iter()
        .map(|i| i.as_str())
        .collect();
    format!(
        "Classify the analytical intent of the business question below.\n\
         Allowed intents: {}.\n\
         Respond with a single line in the form INTENT|confidence, for example AGGREGATION|0.85.\n\n\
         Question: {question}",
        labels.join(", ").to_uppercase()
    )
}

/// Parse `INTENT|confidence` from the first non-empty line.
pub fn parse_model_intent(response: &str) -> Option<(IntentType, f64)> {
    let line = response.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (label, confidence) = line.split_once('|')?;
    let intent = IntentType::parse(label)?;
    let confidence: f64 = confidence.trim().parse().ok()?;
    if !confidence.is_finite() {
        return None;
    }
    Some((intent, clamp_unit(confidence)))
}

#[async_trait]
impl IntentClassifier for IntentEnsemble {
    async fn classify_intent(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Branch<Intent>, AnalysisError> {
        let classification = self.classify(question, cancel).await;
        Ok(Branch::new(classification.intent, classification.degraded))
    }
}
