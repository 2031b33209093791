//! Regex-family entity extraction.

use crate::{KnowledgeError, compile};
use querylens_config::knowledge::EntityPatternFamily;
use querylens_core::text::{is_stopword, word_index_at, words};
use querylens_core::{Entity, EntityType, ExtractionMethod};
use regex::Regex;

/// Confidence of every pattern match.
pub const PATTERN_CONFIDENCE: f64 = 0.7;

pub struct PatternExtractor {
    families: Vec<(EntityType, Vec<Regex>)>,
}

impl PatternExtractor {
    pub fn new(families: &[EntityPatternFamily]) -> Result<Self, KnowledgeError> {
        let families = families
            .iter()
            .map(|family| {
                let context = format!("{} entity", family.entity_type);
                let compiled = family
                    .patterns
                    .iter()
                    .map(|p| compile(&context, p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((family.entity_type, compiled))
            })
            .collect::<Result<Vec<_>, KnowledgeError>>()?;
        Ok(Self { families })
    }

    pub fn extract(&self, question: &str) -> Vec<Entity> {
        let tokens = words(question);
        let mut found = Vec::new();

        for (entity_type, patterns) in &self.families {
            for pattern in patterns {
                for caps in pattern.captures_iter(question) {
                    let Some(whole) = caps.get(0) else { continue };
                    let name_match = caps.get(1).unwrap_or(whole);
                    let name = name_match.as_str().trim();
                    if name.is_empty() || is_stopword(&name.to_lowercase()) {
                        continue;
                    }
                    found.push(Entity::new(
                        name,
                        *entity_type,
                        whole.as_str().trim(),
                        word_index_at(&tokens, name_match.start()),
                        PATTERN_CONFIDENCE,
                        ExtractionMethod::Pattern,
                    ));
                }
            }
        }
        found
    }
}
