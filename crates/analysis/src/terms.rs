//! Business-term extraction: dictionary hits, confirmed or extended by the
//! catalog glossary, each with a relevance score.

use crate::domain::lookup_terms;
use crate::entity::dictionary::BusinessTermMatcher;
use querylens_config::KnowledgeBase;
use querylens_core::scoring::clamp_unit;
use querylens_core::{AnalysisError, Domain, EntityType, MetadataService};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

const DICTIONARY_RELEVANCE: f64 = 0.5;
const GLOSSARY_RELEVANCE: f64 = 0.4;
const DOMAIN_BONUS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermSource {
    Dictionary,
    Glossary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessTerm {
    pub term: String,
    pub source: TermSource,
}

pub struct BusinessTermExtractor {
    matcher: BusinessTermMatcher,
    domain_keywords: HashMap<String, Vec<String>>,
    metadata: Option<Arc<dyn MetadataService>>,
}

impl BusinessTermExtractor {
    pub fn new(knowledge: &KnowledgeBase) -> Self {
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
            matcher: BusinessTermMatcher::new(knowledge.business_terms.clone(), None),
            domain_keywords,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataService>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Dictionary terms in question order, then glossary terms not already
    /// covered. Time expressions are left to the time-range extractor.
    pub async fn extract(&self, question: &str) -> Result<Vec<BusinessTerm>, AnalysisError> {
        let mut matched = self.matcher.matched_entries(question);
        matched.sort_by_key(|(_, position, _)| *position);

        let mut terms: Vec<BusinessTerm> = Vec::new();
        for (entry, _, _) in matched {
            if entry.entity_type == EntityType::TimeReference {
                continue;
            }
            push_unique(&mut terms, entry.term.to_lowercase(), TermSource::Dictionary);
        }

        if let Some(metadata) = &self.metadata {
            let lookup = lookup_terms(question);
            if !lookup.is_empty() {
                match metadata.find_relevant_glossary_terms(&lookup).await {
                    Ok(glossary) => {
                        for entry in glossary {
                            push_unique(&mut terms, entry.term.to_lowercase(), TermSource::Glossary);
                        }
                    }
                    Err(e) => warn!(error = %e, "Glossary lookup failed during term extraction"),
                }
            }
        }
        Ok(terms)
    }

    /// Relevance per term given the resolved domain and per-user boosts.
    pub fn score(
        &self,
        terms: &[BusinessTerm],
        domain: &Domain,
        boosts: &HashMap<String, f64>,
    ) -> BTreeMap<String, f64> {
        let keywords = self
            .domain_keywords
            .get(&domain.name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        terms
            .iter()
            .map(|t| {
                let mut relevance = match t.source {
                    TermSource::Dictionary => DICTIONARY_RELEVANCE,
                    TermSource::Glossary => GLOSSARY_RELEVANCE,
                };
                if keywords.iter().any(|k| same_term(k, &t.term)) {
                    relevance += DOMAIN_BONUS;
                }
                relevance += boosts
                    .iter()
                    .filter(|(term, _)| same_term(term, &t.term))
                    .map(|(_, boost)| *boost)
                    .sum::<f64>();
                (t.term.clone(), clamp_unit(relevance))
            })
            .collect()
    }
}

fn push_unique(terms: &mut Vec<BusinessTerm>, term: String, source: TermSource) {
    if !terms.iter().any(|t| t.term == term) {
        terms.push(BusinessTerm { term, source });
    }
}

fn same_term(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a == b || a.trim_end_matches('s') == b.trim_end_matches('s')
}

#[cfg(test)]
mod tests {
    use super::*;
    use querylens_memory::InMemoryCatalog;

    const Q: &str = "What is the total deposit amount for UK players last month?";

    fn names(terms: &[BusinessTerm]) -> Vec<&str> {
        terms.iter().map(|t| t.term.as_str()).collect()
    }

    #[tokio::test]
    async fn dictionary_terms_in_question_order() {
        let extractor = BusinessTermExtractor::new(&KnowledgeBase::builtin());
        let terms = extractor.extract(Q).await.unwrap();
        assert_eq!(names(&terms), vec!["deposit", "uk", "player"]);
        assert!(terms.iter().all(|t| t.source == TermSource::Dictionary));
    }

    #[tokio::test]
    async fn glossary_adds_synonym_terms() {
        let extractor = BusinessTermExtractor::new(&KnowledgeBase::builtin())
            .with_metadata(Arc::new(InMemoryCatalog::sample()));
        let terms = extractor.extract("Total cashout for VIP players").await.unwrap();
        let withdrawal = terms.iter().find(|t| t.term == "withdrawal").unwrap();
        assert_eq!(withdrawal.source, TermSource::Glossary);
        assert!(terms.iter().any(|t| t.term == "player"));
    }

    #[tokio::test]
    async fn relevance_rewards_domain_keywords_and_boosts() {
        let extractor = BusinessTermExtractor::new(&KnowledgeBase::builtin());
        let terms = extractor.extract(Q).await.unwrap();
        let boosts = HashMap::from([("players".to_string(), 0.2)]);
        let scores = extractor.score(&terms, &Domain::new("Banking", 0.4), &boosts);
        assert!((scores["deposit"] - 0.6).abs() < 1e-9);
        assert!((scores["uk"] - 0.5).abs() < 1e-9);
        assert!((scores["player"] - 0.7).abs() < 1e-9);
    }
}
