//! Language-model entity extraction.
//!
//! The model is asked for a JSON array; anything it returns that cannot be
//! parsed, or that does not occur in the question, is discarded.

use crate::traits::Branch;
use querylens_core::text::{word_index_at, words};
use querylens_core::{Entity, EntityType, ExtractionMethod, GuardedModel};
use regex::RegexBuilder;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Model-reported confidence is capped here.
pub const MODEL_CONFIDENCE_CAP: f64 = 0.95;

const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default, rename = "originalText", alias = "original_text")]
    original_text: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

pub fn extraction_prompt(question: &str) -> String {
    format!(
        "Extract the business entities from the question below.\n\
         Respond with a JSON array only. Each item must be an object with the keys \
         \"name\", \"type\", \"originalText\" and \"confidence\" (0 to 1). \
         \"type\" is one of: table, column, metric, dimension, time_reference, comparison_value.\n\n\
         Question: {question}"
    )
}

/// Parse a model response into entities positioned within `question`.
pub fn parse_model_entities(question: &str, response: &str) -> Option<Vec<Entity>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end < start {
        return None;
    }
    let raw: Vec<RawEntity> = serde_json::from_str(&response[start..=end]).ok()?;

    let tokens = words(question);
    let entities = raw
        .into_iter()
        .filter_map(|r| {
            let entity_type = EntityType::parse(&r.entity_type)?;
            let name = r.name.trim();
            if name.is_empty() {
                return None;
            }
            let original = r
                .original_text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(name);
            let found = find_ignore_case(question, original)?;
            let confidence = r
                .confidence
                .unwrap_or(DEFAULT_CONFIDENCE)
                .clamp(0.0, MODEL_CONFIDENCE_CAP);
            Some(Entity::new(
                name,
                entity_type,
                found.as_str(),
                word_index_at(&tokens, found.start()),
                confidence,
                ExtractionMethod::Ai,
            ))
        })
        .collect();
    Some(entities)
}

/// Locate `needle` in `haystack` ignoring case, with offsets into `haystack`.
fn find_ignore_case<'h>(haystack: &'h str, needle: &str) -> Option<regex::Match<'h>> {
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?
        .find(haystack)
}

/// Ask the model for entities.
///
/// Every failure yields an empty list. A failed call or an unparseable
/// reply marks the branch degraded; an unconfigured model does not.
pub async fn extract_with_model(
    model: &GuardedModel,
    question: &str,
    cancel: &CancellationToken,
) -> Branch<Vec<Entity>> {
    let response = match model.complete(&extraction_prompt(question), cancel).await {
        Ok(text) => text,
        Err(e) if e.is_not_configured() => {
            debug!(error = %e, "Model entity extraction unavailable");
            return Branch::clean(Vec::new());
        }
        Err(e) => {
            warn!(model = %model.name(), error = %e, "Model entity extraction failed");
            return Branch::new(Vec::new(), true);
        }
    };
    match parse_model_entities(question, &response) {
        Some(entities) => Branch::clean(entities),
        None => {
            warn!(response_len = response.len(), "Unparseable model entity response");
            Branch::new(Vec::new(), true)
        }
    }
}
