//! Pronunciation scoring seam.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use speak_core::model::Score;

use crate::error::EvaluationError;

const MIN_MOCK_SCORE: f64 = 30.0;
const MAX_MOCK_SCORE: f64 = 95.0;
const NAMED_BASE: f64 = 75.0;
const UNNAMED_BASE: f64 = 60.0;
const JITTER: f64 = 20.0;

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score how well the audio at `audio_uri` pronounces `drug_name` (0..=100).
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError` if the recording could not be scored.
    async fn evaluate(&self, audio_uri: &str, drug_name: &str) -> Result<Score, EvaluationError>;
}

/// Stand-in evaluator that returns a plausible random score after a delay.
#[derive(Debug, Clone)]
pub struct MockEvaluator {
    latency: Duration,
}

impl MockEvaluator {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn mock_score(drug_name: &str) -> Score {
        let base = if drug_name.trim().is_empty() {
            UNNAMED_BASE
        } else {
            NAMED_BASE
        };
        let jitter = rand::rng().random_range(-JITTER..=JITTER);
        clamp_score(base + jitter)
    }
}

#[async_trait]
impl Evaluator for MockEvaluator {
    async fn evaluate(&self, _audio_uri: &str, drug_name: &str) -> Result<Score, EvaluationError> {
        tokio::time::sleep(self.latency).await;
        Ok(Self::mock_score(drug_name))
    }
}

fn clamp_score(raw: f64) -> Score {
    let clamped = raw.round().clamp(MIN_MOCK_SCORE, MAX_MOCK_SCORE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = clamped as u32;
    Score::new(value)
}

/// Score used when the evaluator itself fails: uniform in `30..=99`.
#[must_use]
pub fn fallback_score() -> Score {
    Score::new(rand::rng().random_range(30..=99))
}
