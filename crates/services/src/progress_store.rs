//! Authoritative in-process study state for the signed-in user.
//!
//! Every mutation runs under one async gate: it applies a `ProgressAction`
//! to a copy of the state, persists what changed, commits, notifies
//! observers and finally syncs. List changes sync immediately and supersede
//! a pending score push; score changes go through the debouncer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use speak_core::model::{AuthContext, DrugId, Score, ScoreMap, StudyData, UserId};
use speak_core::progress::{ProgressAction, ProgressChange, StudyList, StudyProgress};
use storage::repository::{ProgressRepository, RecordingRepository};

use crate::error::ProgressError;
use crate::sync::{DebouncedSync, StudySync};

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Notification emitted after the store commits new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Loaded {
        user_id: UserId,
        data: StudyData,
    },
    Changed {
        user_id: UserId,
        change: ProgressChange,
        data: StudyData,
    },
    Cleared,
}

/// Receives `ProgressEvent`s. Implemented for plain closures.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event);
    }
}

#[derive(Clone, Copy, Debug)]
enum SyncTrigger {
    Immediate,
    Debounced,
}

#[derive(Default)]
struct StoreState {
    auth: Option<AuthContext>,
    progress: StudyProgress,
}

//
// ─── STORE ─────────────────────────────────────────────────────────────────────
//

pub struct ProgressStore {
    progress_repo: Arc<dyn ProgressRepository>,
    recordings: Arc<dyn RecordingRepository>,
    sync: Arc<dyn StudySync>,
    debounced: DebouncedSync,
    state: Mutex<StoreState>,
    gate: tokio::sync::Mutex<()>,
    observers: Mutex<Vec<Arc<dyn ProgressObserver>>>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        progress_repo: Arc<dyn ProgressRepository>,
        recordings: Arc<dyn RecordingRepository>,
        sync: Arc<dyn StudySync>,
        debounced: DebouncedSync,
    ) -> Self {
        Self {
            progress_repo,
            recordings,
            sync,
            debounced,
            state: Mutex::new(StoreState::default()),
            gate: tokio::sync::Mutex::new(()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn ProgressObserver>) {
        lock(&self.observers).push(observer);
    }

    // ─── Session lifecycle ─────────────────────────────────────────────────

    /// Replace in-memory state with `auth`'s persisted progress and push it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if persisted progress cannot be read;
    /// the previous state is kept in that case.
    pub async fn load_user(&self, auth: AuthContext) -> Result<StudyData, ProgressError> {
        let gate = self.gate.lock().await;
        let stored = self.progress_repo.load_progress(auth.user_id).await?;
        let progress = StudyProgress::from_persisted(stored.learning, stored.finished, stored.scores);
        let data = progress.study_data();
        {
            let mut state = lock(&self.state);
            state.auth = Some(auth.clone());
            state.progress = progress;
        }
        drop(gate);

        info!(
            user_id = %auth.user_id,
            learning = data.current_learning,
            finished = data.finished_learning,
            "study progress loaded"
        );
        self.notify(&ProgressEvent::Loaded {
            user_id: auth.user_id,
            data,
        });
        if !self.sync.sync_immediate(Some(&auth), data).await {
            warn!(user_id = %auth.user_id, "initial study sync failed");
        }
        Ok(data)
    }

    /// Forget the current user's in-memory state. Persisted data is kept.
    pub async fn clear(&self) {
        let _gate = self.gate.lock().await;
        *lock(&self.state) = StoreState::default();
        self.notify(&ProgressEvent::Cleared);
        debug!("study progress cleared");
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the new lists cannot be saved.
    pub async fn add_to_learning(&self, drug_id: DrugId) -> Result<ProgressChange, ProgressError> {
        self.dispatch(ProgressAction::AddToLearning(drug_id), SyncTrigger::Immediate, None)
            .await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the new lists cannot be saved.
    pub async fn mark_finished(&self, drug_id: DrugId) -> Result<ProgressChange, ProgressError> {
        self.dispatch(ProgressAction::MarkFinished(drug_id), SyncTrigger::Immediate, None)
            .await
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the new lists cannot be saved.
    pub async fn move_to_learning(
        &self,
        drug_id: DrugId,
    ) -> Result<ProgressChange, ProgressError> {
        self.dispatch(ProgressAction::MoveToLearning(drug_id), SyncTrigger::Immediate, None)
            .await
    }

    /// Drop `drug_id` from one list together with its score and recordings.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if lists or scores cannot be saved.
    pub async fn remove(
        &self,
        drug_id: DrugId,
        from_finished: bool,
    ) -> Result<ProgressChange, ProgressError> {
        let action = ProgressAction::Remove {
            drug_id,
            list: StudyList::from_finished_flag(from_finished),
        };
        self.dispatch(action, SyncTrigger::Immediate, None).await
    }

    /// Record `score` if it beats the stored best.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the score map cannot be saved.
    pub async fn update_score(
        &self,
        drug_id: DrugId,
        score: Score,
    ) -> Result<ProgressChange, ProgressError> {
        self.dispatch(
            ProgressAction::RecordScore { drug_id, score },
            SyncTrigger::Debounced,
            None,
        )
        .await
    }

    /// Like `update_score`, but only while `user_id` is still signed in.
    /// A score that arrives after a user switch is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the score map cannot be saved.
    pub async fn update_score_for(
        &self,
        user_id: UserId,
        drug_id: DrugId,
        score: Score,
    ) -> Result<ProgressChange, ProgressError> {
        self.dispatch(
            ProgressAction::RecordScore { drug_id, score },
            SyncTrigger::Debounced,
            Some(user_id),
        )
        .await
    }

    // ─── Sync ──────────────────────────────────────────────────────────────

    /// Push the current aggregate now, superseding a pending score push of
    /// the same user. Always `true` when nobody is signed in.
    pub async fn force_sync(&self) -> bool {
        let gate = self.gate.lock().await;
        let (auth, data) = {
            let state = lock(&self.state);
            (state.auth.clone(), state.progress.study_data())
        };
        if let Some(auth) = &auth {
            self.debounced.supersede(auth.user_id);
        }
        drop(gate);
        self.sync.sync_immediate(auth.as_ref(), data).await
    }

    /// Run a pending debounced push now.
    pub async fn flush_pending_sync(&self) -> Option<bool> {
        self.debounced.flush().await
    }

    /// Drop a pending debounced push.
    pub fn cancel_pending_sync(&self) -> bool {
        self.debounced.cancel()
    }

    #[must_use]
    pub fn has_pending_sync(&self) -> bool {
        self.debounced.is_pending()
    }

    // ─── Selectors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn current_user(&self) -> Option<UserId> {
        lock(&self.state).auth.as_ref().map(|auth| auth.user_id)
    }

    #[must_use]
    pub fn learning_list(&self) -> Vec<DrugId> {
        lock(&self.state).progress.learning().to_vec()
    }

    #[must_use]
    pub fn finished_list(&self) -> Vec<DrugId> {
        lock(&self.state).progress.finished().to_vec()
    }

    #[must_use]
    pub fn learning_count(&self) -> usize {
        lock(&self.state).progress.learning().len()
    }

    #[must_use]
    pub fn is_learning(&self, drug_id: &DrugId) -> bool {
        lock(&self.state).progress.is_learning(drug_id)
    }

    #[must_use]
    pub fn is_finished(&self, drug_id: &DrugId) -> bool {
        lock(&self.state).progress.is_finished(drug_id)
    }

    #[must_use]
    pub fn score(&self, drug_id: &DrugId) -> Option<Score> {
        lock(&self.state).progress.score(drug_id)
    }

    #[must_use]
    pub fn scores(&self) -> ScoreMap {
        lock(&self.state).progress.scores().clone()
    }

    #[must_use]
    pub fn study_data(&self) -> StudyData {
        lock(&self.state).progress.study_data()
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    async fn dispatch(
        &self,
        action: ProgressAction,
        trigger: SyncTrigger,
        expected_user: Option<UserId>,
    ) -> Result<ProgressChange, ProgressError> {
        let gate = self.gate.lock().await;
        let (auth, mut next) = {
            let state = lock(&self.state);
            (state.auth.clone(), state.progress.clone())
        };
        let Some(auth) = auth else {
            warn!(?action, "ignoring study change without a signed-in user");
            return Ok(ProgressChange::Unchanged);
        };
        if let Some(expected) = expected_user.filter(|expected| *expected != auth.user_id) {
            warn!(
                %expected,
                current = %auth.user_id,
                ?action,
                "ignoring study change for a signed-out user"
            );
            return Ok(ProgressChange::Unchanged);
        }

        let change = next.apply(action);
        if change.is_unchanged() {
            return Ok(change);
        }
        self.persist(auth.user_id, &next, &change).await?;

        let data = next.study_data();
        lock(&self.state).progress = next;
        match trigger {
            SyncTrigger::Immediate => {
                self.debounced.supersede(auth.user_id);
            }
            SyncTrigger::Debounced => self.debounced.schedule(Some(auth.clone()), data),
        }
        drop(gate);

        debug!(user_id = %auth.user_id, ?change, "study progress changed");
        self.notify(&ProgressEvent::Changed {
            user_id: auth.user_id,
            change: change.clone(),
            data,
        });

        if matches!(trigger, SyncTrigger::Immediate)
            && !self.sync.sync_immediate(Some(&auth), data).await
        {
            warn!(user_id = %auth.user_id, "study sync failed; local state kept");
        }
        Ok(change)
    }

    async fn persist(
        &self,
        user_id: UserId,
        next: &StudyProgress,
        change: &ProgressChange,
    ) -> Result<(), ProgressError> {
        if change.touches_lists() {
            self.progress_repo
                .save_lists(user_id, next.learning(), next.finished())
                .await?;
        }
        if change.touches_scores() {
            self.progress_repo.save_scores(user_id, next.scores()).await?;
        }
        if let ProgressChange::Removed { drug_id, .. } = change {
            if let Err(err) = self.recordings.delete_recordings(user_id, drug_id).await {
                warn!(%user_id, %drug_id, error = %err, "failed to delete recordings");
            }
        }
        Ok(())
    }

    fn notify(&self, event: &ProgressEvent) {
        let observers = lock(&self.observers).clone();
        for observer in observers {
            observer.on_event(event);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
