use std::sync::Arc;

use tracing::{info, warn};

use speak_core::Clock;
use speak_core::model::{DrugId, Recording, Score, UserId};
use speak_core::progress::ProgressChange;
use storage::repository::RecordingRepository;

use crate::error::RecordingError;
use crate::evaluation::{Evaluator, fallback_score};
use crate::progress_store::ProgressStore;

/// Result of scoring one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub score: Score,
    pub best: Score,
    /// Whether the drug's stored best score went up.
    pub raised: bool,
}

/// Per-drug pronunciation attempts of the signed-in user.
pub struct RecordingService {
    clock: Clock,
    recordings: Arc<dyn RecordingRepository>,
    store: Arc<ProgressStore>,
    evaluator: Arc<dyn Evaluator>,
}

impl RecordingService {
    #[must_use]
    pub fn new(
        clock: Clock,
        recordings: Arc<dyn RecordingRepository>,
        store: Arc<ProgressStore>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            clock,
            recordings,
            store,
            evaluator,
        }
    }

    fn user(&self) -> Result<UserId, RecordingError> {
        self.store.current_user().ok_or(RecordingError::NotSignedIn)
    }

    /// Recording history for `drug_id`, oldest first. Empty when signed out.
    ///
    /// # Errors
    ///
    /// Returns `RecordingError::Storage` if the history cannot be read.
    pub async fn list(&self, drug_id: &DrugId) -> Result<Vec<Recording>, RecordingError> {
        let Some(user_id) = self.store.current_user() else {
            return Ok(Vec::new());
        };
        Ok(self.recordings.load_recordings(user_id, drug_id).await?)
    }

    /// Append a fresh, unevaluated recording.
    ///
    /// # Errors
    ///
    /// Returns `RecordingError::NotSignedIn` for anonymous callers and
    /// `RecordingError::Storage` if the history cannot be saved.
    pub async fn add(
        &self,
        drug_id: &DrugId,
        uri: impl Into<String>,
    ) -> Result<Recording, RecordingError> {
        let user_id = self.user()?;
        let recording = Recording::new(uri, self.clock.now());
        let mut history = self.recordings.load_recordings(user_id, drug_id).await?;
        history.push(recording.clone());
        self.recordings
            .save_recordings(user_id, drug_id, &history)
            .await?;
        info!(%user_id, %drug_id, attempts = history.len(), "recording saved");
        Ok(recording)
    }

    /// Delete the recording at `index`. The stored best score is left as is.
    ///
    /// # Errors
    ///
    /// Returns `RecordingError::NoSuchRecording` for an out-of-range index.
    pub async fn delete(&self, drug_id: &DrugId, index: usize) -> Result<Recording, RecordingError> {
        let user_id = self.user()?;
        let mut history = self.recordings.load_recordings(user_id, drug_id).await?;
        if index >= history.len() {
            return Err(RecordingError::NoSuchRecording { index });
        }
        let removed = history.remove(index);
        self.recordings
            .save_recordings(user_id, drug_id, &history)
            .await?;
        Ok(removed)
    }

    /// Score the recording at `index` and offer the best score to the store.
    ///
    /// An evaluator failure is logged and replaced by a fallback score. If
    /// another user signed in meanwhile, only the recording history of the
    /// original user is updated.
    ///
    /// # Errors
    ///
    /// Returns `RecordingError::NoSuchRecording` for an out-of-range index and
    /// `RecordingError::Storage`/`Progress` if the result cannot be saved.
    pub async fn evaluate(
        &self,
        drug_id: &DrugId,
        index: usize,
    ) -> Result<EvaluationOutcome, RecordingError> {
        let user_id = self.user()?;
        let mut history = self.recordings.load_recordings(user_id, drug_id).await?;
        let uri = history
            .get(index)
            .map(|recording| recording.uri.clone())
            .ok_or(RecordingError::NoSuchRecording { index })?;

        let score = match self.evaluator.evaluate(&uri, drug_id.as_str()).await {
            Ok(score) => score,
            Err(err) => {
                warn!(%drug_id, error = %err, "evaluation failed; using fallback score");
                fallback_score()
            }
        };

        if let Some(recording) = history.get_mut(index) {
            recording.score = Some(score);
        }
        self.recordings
            .save_recordings(user_id, drug_id, &history)
            .await?;

        let best = Recording::best_score(&history).unwrap_or(score);
        let change = self
            .store
            .update_score_for(user_id, drug_id.clone(), best)
            .await?;
        let raised = matches!(change, ProgressChange::ScoreRaised { .. });
        info!(%user_id, %drug_id, score = score.value(), best = best.value(), raised, "recording evaluated");

        Ok(EvaluationOutcome {
            score,
            best,
            raised,
        })
    }
}
