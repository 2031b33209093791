//! Business-dictionary entity extraction: exact phrase lookup plus fuzzy
//! matching through a [`TermSimilarity`] collaborator.

use querylens_config::knowledge::BusinessTermEntry;
use querylens_core::text::{Word, contains_phrase, is_stopword, words};
use querylens_core::{Entity, ExtractionMethod, TermMatch, TermSimilarity};
use std::sync::Arc;

pub const EXACT_CONFIDENCE: f64 = 0.9;
/// Fuzzy confidence is `similarity x FUZZY_FACTOR`.
pub const FUZZY_FACTOR: f64 = 0.8;
/// Fuzzy matches at or below this similarity are ignored.
pub const FUZZY_THRESHOLD: f64 = 0.8;

/// [`TermSimilarity`] over the single-word dictionary terms using
/// normalized Levenshtein similarity.
pub struct DictionarySimilarity {
    terms: Vec<String>,
}

impl DictionarySimilarity {
    pub fn new(entries: &[BusinessTermEntry]) -> Self {
        let mut terms: Vec<String> = entries
            .iter()
            .filter(|e| !e.term.contains(' '))
            .map(|e| e.term.to_lowercase())
            .collect();
        terms.dedup();
        Self { terms }
    }
}

impl TermSimilarity for DictionarySimilarity {
    fn best_match(&self, word: &str) -> Option<TermMatch> {
        let word = word.to_lowercase();
        self.terms
            .iter()
            .map(|term| TermMatch {
                term: term.clone(),
                similarity: strsim::normalized_levenshtein(&word, term),
            })
            .filter(|m| m.similarity > 0.0)
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
    }
}

pub struct BusinessTermMatcher {
    entries: Vec<BusinessTermEntry>,
    similarity: Option<Arc<dyn TermSimilarity>>,
}

impl BusinessTermMatcher {
    pub fn new(entries: Vec<BusinessTermEntry>, similarity: Option<Arc<dyn TermSimilarity>>) -> Self {
        Self {
            entries,
            similarity,
        }
    }

    /// Dictionary entries present in the question, exact or plural.
    pub fn matched_entries<'a>(&'a self, question: &str) -> Vec<(&'a BusinessTermEntry, usize, String)> {
        let lower = question.to_lowercase();
        let tokens = words(question);
        self.entries
            .iter()
            .filter_map(|entry| {
                let term = entry.term.to_lowercase();
                let surface = [term.clone(), format!("{term}s"), format!("{term}es")]
                    .into_iter()
                    .find(|form| contains_phrase(&lower, form))?;
                let (position, original) = locate(&tokens, &surface);
                Some((entry, position, original))
            })
            .collect()
    }

    pub fn extract(&self, question: &str) -> Vec<Entity> {
        let matched = self.matched_entries(question);
        let mut found: Vec<Entity> = matched
            .iter()
            .map(|(entry, position, original)| {
                Entity::new(
                    entry.entity_name(),
                    entry.entity_type,
                    original.as_str(),
                    *position,
                    EXACT_CONFIDENCE,
                    ExtractionMethod::BusinessTerm,
                )
            })
            .collect();

        let Some(similarity) = &self.similarity else {
            return found;
        };

        let covered: Vec<usize> = matched.iter().map(|(_, position, _)| *position).collect();
        for word in words(question) {
            if covered.contains(&word.index) || word.lower.len() < 4 || is_stopword(&word.lower) {
                continue;
            }
            let Some(hit) = similarity.best_match(&word.lower) else {
                continue;
            };
            if hit.similarity <= FUZZY_THRESHOLD || hit.similarity >= 1.0 {
                continue;
            }
            let Some(entry) = self.entries.iter().find(|e| e.term.eq_ignore_ascii_case(&hit.term)) else {
                continue;
            };
            found.push(Entity::new(
                entry.entity_name(),
                entry.entity_type,
                word.text.as_str(),
                word.index,
                hit.similarity * FUZZY_FACTOR,
                ExtractionMethod::Fuzzy,
            ));
        }
        found
    }
}

/// Word index and original text of the first occurrence of `phrase_lower`.
fn locate(tokens: &[Word], phrase_lower: &str) -> (usize, String) {
    let parts: Vec<&str> = phrase_lower.split_whitespace().collect();
    if parts.is_empty() {
        return (0, String::new());
    }
    for window in tokens.windows(parts.len()) {
        if window.iter().zip(&parts).all(|(w, p)| w.lower == *p) {
            let text = window
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            return (window[0].index, text);
        }
    }
    (0, phrase_lower.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use querylens_config::KnowledgeBase;
    use querylens_core::EntityType;

    fn matcher() -> BusinessTermMatcher {
        let kb = KnowledgeBase::builtin();
        let similarity = Arc::new(DictionarySimilarity::new(&kb.business_terms));
        BusinessTermMatcher::new(kb.business_terms, Some(similarity))
    }

    #[test]
    fn exact_terms_in_example() {
        let found = matcher().extract("What is the total deposit amount for UK players last month?");
        let get = |name: &str| found.iter().find(|e| e.name == name).unwrap();

        let deposit = get("deposit");
        assert_eq!(deposit.entity_type, EntityType::Metric);
        assert_eq!(deposit.confidence, EXACT_CONFIDENCE);
        assert_eq!(deposit.position, 4);

        let uk = get("UK");
        assert_eq!(uk.entity_type, EntityType::Dimension);
        assert_eq!(uk.original_text, "UK");

        let players = get("players");
        assert_eq!(players.entity_type, EntityType::Table);
        assert_eq!(players.original_text, "players");

        assert_eq!(get("last month").entity_type, EntityType::TimeReference);
        assert!(found.iter().all(|e| e.extraction_method == ExtractionMethod::BusinessTerm));
    }

    #[test]
    fn fuzzy_match_discounts_confidence() {
        let found = matcher().extract("sum of withdrawl volume");
        let w = found
            .iter()
            .find(|e| e.extraction_method == ExtractionMethod::Fuzzy)
            .unwrap();
        assert_eq!(w.name, "withdrawal");
        assert_eq!(w.original_text, "withdrawl");
        assert!(w.confidence < FUZZY_FACTOR);
        assert!(w.confidence > FUZZY_THRESHOLD * FUZZY_FACTOR);
    }

    #[test]
    fn weak_similarity_is_rejected() {
        let found = matcher().extract("average ticket resolution");
        assert!(found.iter().all(|e| e.extraction_method != ExtractionMethod::Fuzzy));
    }

    #[test]
    fn best_match_prefers_closest_term() {
        let sim = DictionarySimilarity::new(&KnowledgeBase::builtin().business_terms);
        let hit = sim.best_match("deposti").unwrap();
        assert_eq!(hit.term, "deposit");
    }
}
