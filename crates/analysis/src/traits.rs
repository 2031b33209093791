//! Capability traits composed by the orchestrator.

use async_trait::async_trait;
use querylens_core::{AnalysisError, Domain, Entity, Intent};
use tokio_util::sync::CancellationToken;

/// A branch result and whether a model call behind it failed.
///
/// A degraded value is heuristic-only and must not be cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Branch<T> {
    pub fn new(value: T, degraded: bool) -> Self {
        Self { value, degraded }
    }

    pub fn clean(value: T) -> Self {
        Self::new(value, false)
    }
}

/// Finds business entities in a question.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Branch<Vec<Entity>>, AnalysisError>;
}

/// Resolves the analytical intent of a question.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify_intent(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Branch<Intent>, AnalysisError>;
}

/// Picks the business domain a question belongs to.
#[async_trait]
pub trait DomainDetector: Send + Sync {
    async fn detect_domain(&self, question: &str) -> Result<Domain, AnalysisError>;
}
