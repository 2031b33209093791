//! Re-ranks candidate sections against the profile.
//!
//! `relevance' = 0.7 * relevance + 0.3 * signal`, where the signal is the
//! share of the profile's focus terms found in the section, or the
//! question/section embedding similarity when an embedding service is
//! configured and answers.

use crate::sections::ContextSection;
use querylens_core::text::contains_phrase;
use querylens_core::{BusinessContextProfile, EmbeddingService};
use std::sync::Arc;
use tracing::{debug, warn};

const BASE_WEIGHT: f64 = 0.7;
const SIGNAL_WEIGHT: f64 = 0.3;

pub struct ContextPrioritizer {
    embeddings: Option<Arc<dyn EmbeddingService>>,
}

impl ContextPrioritizer {
    pub fn new() -> Self {
        Self { embeddings: None }
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingService>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Rescore `sections` and sort them by descending relevance. Ties keep
    /// their input order.
    pub async fn prioritize(
        &self,
        profile: &BusinessContextProfile,
        sections: Vec<ContextSection>,
    ) -> Vec<ContextSection> {
        if sections.is_empty() {
            return sections;
        }

        let signals = match self.semantic_signals(profile, &sections).await {
            Some(signals) => signals,
            None => {
                let focus = profile.focus_terms();
                sections.iter().map(|s| term_overlap(&focus, s)).collect()
            }
        };

        let mut ranked: Vec<ContextSection> = sections
            .iter()
            .zip(signals)
            .map(|(s, signal)| s.rescored(BASE_WEIGHT * s.relevance_score + SIGNAL_WEIGHT * signal))
            .collect();
        ranked.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        debug!(sections = ranked.len(), "Sections prioritized");
        ranked
    }

    /// Cosine similarity of each section to the question, `None` when no
    /// embedding service is configured or it fails.
    async fn semantic_signals(
        &self,
        profile: &BusinessContextProfile,
        sections: &[ContextSection],
    ) -> Option<Vec<f64>> {
        let embeddings = self.embeddings.as_ref()?;
        let texts: Vec<String> = sections
            .iter()
            .map(|s| format!("{}\n{}", s.title, s.content))
            .collect();

        let (question, vectors) = tokio::join!(
            embeddings.embed(&profile.question),
            embeddings.embed_batch(&texts)
        );
        let (question, vectors) = match (question, vectors) {
            (Ok(q), Ok(v)) => (q, v),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Embedding failed, falling back to term overlap");
                return None;
            }
        };
        if vectors.len() != sections.len()
            || vectors.iter().any(|v| v.len() != question.len())
        {
            warn!(
                expected = sections.len(),
                received = vectors.len(),
                "Embedding service returned mismatched vectors, falling back to term overlap"
            );
            return None;
        }

        Some(
            vectors
                .iter()
                .map(|v| embeddings.cosine_similarity(&question, v).clamp(0.0, 1.0))
                .collect(),
        )
    }
}

impl Default for ContextPrioritizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of `focus` terms mentioned in the section.
pub fn term_overlap(focus: &[String], section: &ContextSection) -> f64 {
    if focus.is_empty() {
        return 0.0;
    }
    let text = format!("{} {}", section.title, section.content).to_lowercase();
    let found = focus.iter().filter(|t| contains_phrase(&text, t)).count();
    found as f64 / focus.len() as f64
}
