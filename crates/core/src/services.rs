//! Collaborator traits: the boundary to services QueryLens consumes.
//!
//! Implementations live in `querylens-providers` (language models) and
//! `querylens-memory` (cache, feedback, catalog). Tests substitute mocks.

use crate::entity::Entity;
use crate::error::{MetadataError, ModelError};
use crate::profile::BusinessContextProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text-in / text-out language model.
///
/// No retries are expected; callers treat any error as "use the heuristic
/// path".
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name (e.g. "openai", "disabled").
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError>;
}

/// Text embedding service.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Embed several texts. Default implementation embeds one at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Cosine similarity. Panics on mismatched lengths.
    fn cosine_similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        crate::scoring::cosine_similarity(a, b)
    }
}

/// Shared in-process cache. No transactional semantics: concurrent misses
/// may recompute the same value.
pub trait CacheService: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    fn set(&self, key: String, value: serde_json::Value, ttl: Duration);
}

/// Read/append store of per-key validation outcomes.
#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Rolling score for `key`, `None` when nothing was recorded yet.
    async fn threshold_feedback_score(&self, key: &str) -> Option<f64>;

    async fn record_threshold_feedback(&self, key: &str, score: f64);
}

/// Read-only lookups against the business catalog.
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn find_relevant_tables(
        &self,
        profile: &BusinessContextProfile,
        top_k: usize,
    ) -> Result<Vec<TableInfo>, MetadataError>;

    async fn find_relevant_columns(
        &self,
        table_ids: &[String],
        profile: &BusinessContextProfile,
    ) -> Result<Vec<ColumnInfo>, MetadataError>;

    async fn find_relevant_glossary_terms(
        &self,
        terms: &[String],
    ) -> Result<Vec<GlossaryTerm>, MetadataError>;

    /// Worked question/SQL examples. Catalogs without examples return none.
    async fn find_query_examples(
        &self,
        _profile: &BusinessContextProfile,
        _top_k: usize,
    ) -> Result<Vec<QueryExample>, MetadataError> {
        Ok(Vec::new())
    }

    /// Business rules that apply to the profile's domain.
    async fn find_business_rules(
        &self,
        _profile: &BusinessContextProfile,
    ) -> Result<Vec<BusinessRule>, MetadataError> {
        Ok(Vec::new())
    }
}

/// Maps an extracted entity onto a concrete table/column.
#[async_trait]
pub trait SchemaLinker: Send + Sync {
    async fn link(&self, entity: &Entity) -> Result<Option<SchemaLink>, MetadataError>;
}

/// Fuzzy lookup of a word against the business dictionary.
pub trait TermSimilarity: Send + Sync {
    fn best_match(&self, word: &str) -> Option<TermMatch>;
}

// ── Catalog records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub business_purpose: String,
    /// Relevance to the question in [0, 1], set by lookups.
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub table_id: String,
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExample {
    pub question: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<crate::intent::IntentType>,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaLink {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermMatch {
    /// Dictionary term that matched.
    pub term: String,
    /// Similarity in [0, 1].
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingService for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[tokio::test]
    async fn default_batch_embeds_each_text() {
        let e = FixedEmbedder;
        let out = e.embed_batch(&["ab".into(), "abcd".into()]).await.unwrap();
        assert_eq!(out, vec![vec![2.0, 1.0], vec![4.0, 1.0]]);
        assert!((e.cosine_similarity(&out[0], &out[0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn table_info_deserializes_with_defaults() {
        let t: TableInfo = serde_json::from_str(r#"{"id":"t1","name":"deposits"}"#).unwrap();
        assert_eq!(t.name, "deposits");
        assert!(t.domain.is_none());
        assert_eq!(t.relevance, 0.0);
    }
}
