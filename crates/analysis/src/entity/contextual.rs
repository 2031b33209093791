//! Neighbour-word heuristics: a word next to "total" is probably a metric,
//! a word after "by" probably a dimension.

use querylens_config::knowledge::ContextualIndicators;
use querylens_core::text::{is_stopword, words};
use querylens_core::{Entity, EntityType, ExtractionMethod};
use std::collections::HashSet;

const BASE_SCORE: f64 = 0.25;
const PER_NEIGHBOUR: f64 = 0.35;
const MAX_SCORE: f64 = 0.8;
/// Only candidates scoring above this are kept.
const ACCEPT_ABOVE: f64 = 0.5;

pub struct ContextualExtractor {
    indicators: Vec<(EntityType, HashSet<String>)>,
    all_indicators: HashSet<String>,
}

impl ContextualExtractor {
    pub fn new(sets: &[ContextualIndicators]) -> Self {
        let indicators: Vec<(EntityType, HashSet<String>)> = sets
            .iter()
            .map(|s| {
                (
                    s.entity_type,
                    s.words.iter().map(|w| w.to_lowercase()).collect(),
                )
            })
            .collect();
        let all_indicators = indicators
            .iter()
            .flat_map(|(_, words)| words.iter().cloned())
            .collect();
        Self {
            indicators,
            all_indicators,
        }
    }

    pub fn score(neighbours: usize) -> f64 {
        (BASE_SCORE + PER_NEIGHBOUR * neighbours as f64).min(MAX_SCORE)
    }

    pub fn extract(&self, question: &str) -> Vec<Entity> {
        let tokens = words(question);
        let mut found = Vec::new();

        for (i, word) in tokens.iter().enumerate() {
            if word.lower.len() < 2
                || is_stopword(&word.lower)
                || self.all_indicators.contains(&word.lower)
            {
                continue;
            }
            let neighbours: Vec<&str> = [i.checked_sub(1), Some(i + 1)]
                .into_iter()
                .flatten()
                .filter_map(|j| tokens.get(j))
                .map(|w| w.lower.as_str())
                .collect();

            let best = self
                .indicators
                .iter()
                .map(|(entity_type, set)| {
                    let hits = neighbours.iter().filter(|n| set.contains(**n)).count();
                    (*entity_type, hits)
                })
                .filter(|(_, hits)| *hits > 0)
                .fold(None::<(EntityType, usize)>, |acc, cand| match acc {
                    Some(best) if best.1 >= cand.1 => Some(best),
                    _ => Some(cand),
                });

            let Some((entity_type, hits)) = best else {
                continue;
            };
            let score = Self::score(hits);
            if score <= ACCEPT_ABOVE {
                continue;
            }
            found.push(Entity::new(
                word.text.as_str(),
                entity_type,
                word.text.as_str(),
                word.index,
                score,
                ExtractionMethod::Contextual,
            ));
        }
        found
    }
}
