//! Error types for the QueryLens domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum; none of them ever
//! reaches the caller of `analyze_question`, which degrades instead.

use thiserror::Error;

/// The top-level error type for QueryLens operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Language model / embedding errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Business metadata errors ---
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    // --- Analysis pipeline errors ---
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the external language-model and embedding services.
///
/// Every variant is recoverable: callers switch to a heuristic path.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Request cancelled by caller")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// No model is wired up at all, as opposed to one that failed.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

/// Failures of the business metadata catalog.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetadataError {
    #[error("Catalog backend failed: {0}")]
    Backend(String),

    #[error("Not found in catalog: {0}")]
    NotFound(String),
}

/// Failures inside one branch of the analysis fan-out.
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("metadata lookup failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{stage} failed: {reason}")]
    Stage { stage: String, reason: String },
}

impl AnalysisError {
    pub fn stage(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn timeout_reports_duration() {
        let err = ModelError::Timeout { timeout_ms: 1500 };
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn analysis_error_wraps_metadata() {
        let err: AnalysisError = MetadataError::Backend("connection reset".into()).into();
        assert!(err.to_string().contains("connection reset"));

        let stage = AnalysisError::stage("domain_detection", "no profiles loaded");
        assert_eq!(stage.to_string(), "domain_detection failed: no profiles loaded");
    }
}
