//! # QueryLens Analysis
//!
//! Turns a natural-language business question into a validated
//! [`BusinessContextProfile`](querylens_core::BusinessContextProfile).
//!
//! ## Pipeline
//!
//! ```text
//! question ─┬─ entities ──────┐
//!           ├─ intent ────────┤
//!           ├─ domain ────────┼─► validator ─► personalization ─► profile
//!           ├─ business terms ┤
//!           └─ time range ────┘
//! ```
//!
//! Each branch is a capability trait ([`EntityExtractor`],
//! [`IntentClassifier`], [`DomainDetector`]) so the orchestrator can be
//! assembled from scripted parts in tests. Every branch has a fallback; the
//! orchestrator never fails.

pub mod domain;
pub mod entity;
pub mod intent;
pub mod orchestrator;
pub mod personalization;
pub mod temporal;
pub mod terms;
pub mod traits;
pub mod validator;

pub use domain::KeywordDomainDetector;
pub use entity::EntityExtractionPipeline;
pub use intent::{IntentClassification, IntentEnsemble, IntentVote, VoteMethod};
pub use orchestrator::{ContextAnalyzer, ContextAnalyzerBuilder};
pub use personalization::Personalizer;
pub use temporal::{extract_time_range, extract_time_range_at};
pub use terms::BusinessTermExtractor;
pub use traits::{Branch, DomainDetector, EntityExtractor, IntentClassifier};
pub use validator::{ConfidenceValidator, ValidatedAnalysis};

/// Errors raised while compiling knowledge data into matchers.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("invalid {context} pattern '{pattern}': {source}")]
    InvalidPattern {
        context: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub(crate) fn compile(context: &str, pattern: &str) -> Result<regex::Regex, KnowledgeError> {
    regex::Regex::new(pattern).map_err(|source| KnowledgeError::InvalidPattern {
        context: context.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

/// Word-boundary, case-insensitive keyword matcher allowing a plural suffix.
pub(crate) fn keyword_regex(context: &str, keyword: &str) -> Result<regex::Regex, KnowledgeError> {
    compile(
        context,
        &format!(r"(?i)\b{}(?:s|es)?\b", regex::escape(keyword.trim())),
    )
}
