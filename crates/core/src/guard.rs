//! Bounded, cancellable language-model calls.
//!
//! Every model call made by the analysis pipeline goes through
//! [`GuardedModel`], which races the call against a timeout and the
//! caller's cancellation token. Both outcomes are ordinary errors.

use crate::error::ModelError;
use crate::services::LanguageModel;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct GuardedModel {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl GuardedModel {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one completion, bounded by the timeout and `cancel`.
    pub async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        let timeout_ms = self.timeout.as_millis() as u64;
        let call = tokio::time::timeout(self.timeout, self.model.complete(prompt, self.timeout));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(model = %self.model.name(), "Model call cancelled by caller");
                Err(ModelError::Cancelled)
            }
            outcome = call => match outcome {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) if e.is_not_configured() => Err(e),
                Ok(Err(e)) => {
                    warn!(model = %self.model.name(), error = %e, "Model call failed");
                    Err(e)
                }
                Err(_) => {
                    warn!(model = %self.model.name(), timeout_ms, "Model call timed out");
                    Err(ModelError::Timeout { timeout_ms })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowModel {
        delay: Duration,
    }

    #[async_trait]
    impl LanguageModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
            tokio::time::sleep(self.delay).await;
            Ok("done".into())
        }
    }

    fn guarded(delay_ms: u64, timeout_ms: u64) -> GuardedModel {
        GuardedModel::new(
            Arc::new(SlowModel {
                delay: Duration::from_millis(delay_ms),
            }),
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_timeout() {
        let out = guarded(10, 100).complete("p", &CancellationToken::new()).await;
        assert_eq!(out.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_an_error() {
        let out = guarded(500, 100).complete("p", &CancellationToken::new()).await;
        assert_eq!(out, Err(ModelError::Timeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let out = guarded(0, 100).complete("p", &token).await;
        assert_eq!(out, Err(ModelError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_call() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });
        let out = guarded(5_000, 10_000).complete("p", &token).await;
        assert_eq!(out, Err(ModelError::Cancelled));
    }
}
