//! Keyword-profile domain detection with rule-based disambiguation and a
//! glossary fallback for low-signal questions.

use crate::traits::DomainDetector;
use crate::{keyword_regex, KnowledgeError};
use async_trait::async_trait;
use querylens_config::knowledge::{DisambiguationRule, DomainProfile};
use querylens_config::{AnalysisConfig, KnowledgeBase};
use querylens_core::scoring::clamp_unit;
use querylens_core::text::{is_stopword, words};
use querylens_core::{AnalysisError, Domain, MetadataService};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

const BONUS_CAP: f64 = 0.3;
const GLOSSARY_BASE: f64 = 0.3;
const GLOSSARY_PER_HIT: f64 = 0.05;
const GLOSSARY_CAP: f64 = 0.5;

struct CompiledDomain {
    profile: DomainProfile,
    keywords: Vec<(String, f64, Regex)>,
    bonus: Vec<Regex>,
    total_weight: f64,
}

/// Raw keyword score of one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainScore {
    pub name: String,
    pub score: f64,
    pub matched: Vec<String>,
}

pub struct KeywordDomainDetector {
    domains: Vec<CompiledDomain>,
    rules: Vec<(DisambiguationRule, Vec<Regex>)>,
    metadata: Option<Arc<dyn MetadataService>>,
    low_threshold: f64,
    margin: f64,
}

impl KeywordDomainDetector {
    pub fn new(knowledge: &KnowledgeBase, config: &AnalysisConfig) -> Result<Self, KnowledgeError> {
        let mut domains = Vec::with_capacity(knowledge.domains.len());
        for profile in &knowledge.domains {
            let context = format!("{} domain", profile.name);
            let mut keywords = Vec::new();
            for (keyword, weight) in profile.weighted_keywords() {
                let re = keyword_regex(&context, &keyword)?;
                keywords.push((keyword, weight, re));
            }
            let bonus = profile
                .bonus_terms
                .iter()
                .map(|t| keyword_regex(&context, t))
                .collect::<Result<Vec<_>, _>>()?;
            let total_weight = keywords.iter().map(|(_, w, _)| w).sum();
            domains.push(CompiledDomain {
                profile: profile.clone(),
                keywords,
                bonus,
                total_weight,
            });
        }

        let mut rules = Vec::with_capacity(knowledge.disambiguation.len());
        for rule in &knowledge.disambiguation {
            let strong = rule
                .when_any
                .iter()
                .map(|t| keyword_regex("disambiguation", t))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push((rule.clone(), strong));
        }

        Ok(Self {
            domains,
            rules,
            metadata: None,
            low_threshold: config.low_domain_threshold,
            margin: config.disambiguation_margin,
        })
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Score every domain, highest first. Equal scores keep configuration order.
    pub fn score_domains(&self, question: &str) -> Vec<DomainScore> {
        let mut scores: Vec<DomainScore> = self
            .domains
            .iter()
            .map(|d| {
                let matched: Vec<&(String, f64, Regex)> =
                    d.keywords.iter().filter(|(_, _, re)| re.is_match(question)).collect();
                let weight: f64 = matched.iter().map(|(_, w, _)| w).sum();
                let base = if d.total_weight > 0.0 {
                    weight / d.total_weight
                } else {
                    0.0
                };
                let bonus_hits = d.bonus.iter().filter(|re| re.is_match(question)).count();
                let bonus = (bonus_hits as f64 * d.profile.bonus_per_term).min(BONUS_CAP);
                DomainScore {
                    name: d.profile.name.clone(),
                    score: clamp_unit(base + bonus),
                    matched: matched.into_iter().map(|(k, _, _)| k.clone()).collect(),
                }
            })
            .collect();
        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores
    }

    /// Build a [`Domain`] for a configured profile name.
    pub fn named_domain(&self, name: &str, relevance: f64, key_concepts: Vec<String>) -> Domain {
        match self.domains.iter().find(|d| d.profile.name.eq_ignore_ascii_case(name)) {
            Some(d) => Domain {
                name: d.profile.name.clone(),
                description: d.profile.description.clone(),
                key_concepts,
                related_tables: d.profile.related_tables.clone(),
                relevance_score: clamp_unit(relevance),
            },
            None => Domain {
                key_concepts,
                ..Domain::new(name, relevance)
            },
        }
    }

    pub async fn detect(&self, question: &str) -> Domain {
        let scores = self.score_domains(question);
        let Some(top) = self.pick(question, &scores) else {
            return Domain::general(0.0);
        };

        if top.score >= self.low_threshold {
            debug!(domain = %top.name, score = top.score, "Domain detected");
            return self.named_domain(&top.name, top.score, top.matched.clone());
        }

        if let Some(domain) = self.glossary_fallback(question).await {
            debug!(domain = %domain.name, score = domain.relevance_score, "Domain resolved from glossary");
            return domain;
        }

        if top.score > 0.0 {
            debug!(domain = %top.name, score = top.score, "Low-signal domain kept");
            self.named_domain(&top.name, top.score, top.matched.clone())
        } else {
            Domain::general(top.score)
        }
    }

    /// Top domain after disambiguation of near-ties.
    fn pick<'a>(&self, question: &str, scores: &'a [DomainScore]) -> Option<&'a DomainScore> {
        let first = scores.first()?;
        let Some(second) = scores.get(1) else {
            return Some(first);
        };
        if first.score <= 0.0 || first.score - second.score >= self.margin {
            return Some(first);
        }

        for (rule, strong) in &self.rules {
            let other = if rule.prefer.eq_ignore_ascii_case(&first.name) {
                second
            } else if rule.prefer.eq_ignore_ascii_case(&second.name) {
                first
            } else {
                continue;
            };
            if !rule.over.iter().any(|o| o.eq_ignore_ascii_case(&other.name)) {
                continue;
            }
            if strong.iter().any(|re| re.is_match(question)) {
                let preferred = if std::ptr::eq(other, second) { first } else { second };
                debug!(preferred = %preferred.name, over = %other.name, "Domain disambiguation applied");
                return Some(preferred);
            }
        }
        Some(first)
    }

    /// Most frequently referenced glossary domain among the question's terms.
    async fn glossary_fallback(&self, question: &str) -> Option<Domain> {
        let metadata = self.metadata.as_ref()?;
        let terms = lookup_terms(question);
        if terms.is_empty() {
            return None;
        }

        let glossary = match metadata.find_relevant_glossary_terms(&terms).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Glossary lookup failed during domain detection");
                return None;
            }
        };

        let mut counts: Vec<(String, usize, Vec<String>)> = Vec::new();
        for entry in glossary {
            let Some(domain) = entry.domain else { continue };
            match counts.iter_mut().find(|(d, _, _)| d.eq_ignore_ascii_case(&domain)) {
                Some((_, hits, terms)) => {
                    *hits += 1;
                    terms.push(entry.term);
                }
                None => counts.push((domain, 1, vec![entry.term])),
            }
        }

        let mut best: Option<(String, usize, Vec<String>)> = None;
        for candidate in counts {
            if best.as_ref().is_none_or(|(_, hits, _)| candidate.1 > *hits) {
                best = Some(candidate);
            }
        }
        let (name, hits, concepts) = best?;
        let relevance = (GLOSSARY_BASE + GLOSSARY_PER_HIT * hits as f64).min(GLOSSARY_CAP);
        Some(self.named_domain(&name, relevance, concepts))
    }
}

/// Content words plus adjacent content-word pairs.
pub(crate) fn lookup_terms(question: &str) -> Vec<String> {
    let content: Vec<String> = words(question)
        .into_iter()
        .filter(|w| w.lower.chars().count() >= 3 && !is_stopword(&w.lower))
        .map(|w| w.lower)
        .collect();
    let pairs = content.windows(2).map(|p| format!("{} {}", p[0], p[1]));
    let mut terms: Vec<String> = content.iter().cloned().chain(pairs).collect();
    terms.dedup();
    terms
}

#[async_trait]
impl DomainDetector for KeywordDomainDetector {
    async fn detect_domain(&self, question: &str) -> Result<Domain, AnalysisError> {
        Ok(self.detect(question).await)
    }
}
