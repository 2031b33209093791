//! In-memory feedback repository with a rolling score window per key.

use async_trait::async_trait;
use querylens_core::FeedbackRepository;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

pub struct InMemoryFeedbackRepository {
    window: usize,
    scores: RwLock<HashMap<String, VecDeque<f64>>>,
}

impl InMemoryFeedbackRepository {
    /// Keep the last `window` scores per key.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            scores: RwLock::new(HashMap::new()),
        }
    }

    /// Number of scores recorded for `key` (at most the window size).
    pub async fn sample_count(&self, key: &str) -> usize {
        self.scores.read().await.get(key).map_or(0, |s| s.len())
    }
}

impl Default for InMemoryFeedbackRepository {
    fn default() -> Self {
        Self::new(20)
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn threshold_feedback_score(&self, key: &str) -> Option<f64> {
        let scores = self.scores.read().await;
        let window = scores.get(key)?;
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    async fn record_threshold_feedback(&self, key: &str, score: f64) {
        let mut scores = self.scores.write().await;
        let window = scores.entry(key.to_string()).or_default();
        window.push_back(score.clamp(0.0, 1.0));
        while window.len() > self.window {
            window.pop_front();
        }
    }
}
