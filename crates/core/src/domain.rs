//! Business domains: the subject area a question belongs to.

use serde::{Deserialize, Serialize};

/// Name of the catch-all domain used when nothing else fits.
pub const GENERAL_DOMAIN: &str = "General";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Domain keywords found in the question.
    #[serde(default)]
    pub key_concepts: Vec<String>,

    #[serde(default)]
    pub related_tables: Vec<String>,

    /// Relevance in [0, 1].
    pub relevance_score: f64,
}

impl Domain {
    pub fn new(name: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            key_concepts: Vec::new(),
            related_tables: Vec::new(),
            relevance_score: crate::scoring::clamp_unit(relevance_score),
        }
    }

    /// The `General` domain at the given relevance.
    pub fn general(relevance_score: f64) -> Self {
        Self {
            description: "General business questions without a specific subject area".into(),
            ..Self::new(GENERAL_DOMAIN, relevance_score)
        }
    }

    pub fn is_general(&self) -> bool {
        self.name.eq_ignore_ascii_case(GENERAL_DOMAIN)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::general(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_domain() {
        let d = Domain::general(0.5);
        assert!(d.is_general());
        assert_eq!(d.relevance_score, 0.5);
        assert!(!Domain::new("Banking", 0.8).is_general());
    }

    #[test]
    fn relevance_is_clamped() {
        assert_eq!(Domain::new("Gaming", 1.4).relevance_score, 1.0);
    }
}
