//! Stand-in model used when no endpoint is configured.
//!
//! Every call fails with `NotConfigured`, which the analysis pipeline
//! treats like having no model: the heuristic path runs alone and the
//! result is not marked degraded.

use async_trait::async_trait;
use querylens_core::{LanguageModel, ModelError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DisabledModel {
    reason: String,
}

impl DisabledModel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_not_configured() {
        let model = DisabledModel::new("no api key");
        let err = model
            .complete("anything", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::NotConfigured("no api key".into()));
    }
}
