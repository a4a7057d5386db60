use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use speak_core::model::{
    AuthToken, DrugId, Recording, Score, ScoreMap, Session, User, UserId, normalize_score,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::keys::StorageKey;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Raw string store underneath every local repository.
///
/// Mirrors what a mobile key/value store offers: whole-value reads and
/// writes, no partial updates, no transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn set(&self, key: &StorageKey, value: String) -> Result<(), StorageError>;

    /// Delete `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn remove(&self, key: &StorageKey) -> Result<(), StorageError>;
}

/// Lists and scores as last persisted for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredProgress {
    pub learning: Vec<DrugId>,
    pub finished: Vec<DrugId>,
    pub scores: ScoreMap,
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Load a user's learning list, finished list and best scores.
    ///
    /// Missing keys load as empty collections.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if a stored list is corrupt, or
    /// other storage errors.
    async fn load_progress(&self, user_id: UserId) -> Result<StoredProgress, StorageError>;

    /// Persist both study lists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if either list cannot be stored.
    async fn save_lists(
        &self,
        user_id: UserId,
        learning: &[DrugId],
        finished: &[DrugId],
    ) -> Result<(), StorageError>;

    /// Persist the best-score map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the map cannot be stored.
    async fn save_scores(&self, user_id: UserId, scores: &ScoreMap) -> Result<(), StorageError>;
}

#[async_trait]
pub trait RecordingRepository: Send + Sync {
    /// Load the recording history for one drug, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the history cannot be read or decoded.
    async fn load_recordings(
        &self,
        user_id: UserId,
        drug_id: &DrugId,
    ) -> Result<Vec<Recording>, StorageError>;

    /// Replace the recording history for one drug.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the history cannot be stored.
    async fn save_recordings(
        &self,
        user_id: UserId,
        drug_id: &DrugId,
        recordings: &[Recording],
    ) -> Result<(), StorageError>;

    /// Drop the recording history for one drug.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn delete_recordings(
        &self,
        user_id: UserId,
        drug_id: &DrugId,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Load the persisted session, if both token and user are present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stored user cannot be decoded.
    async fn load_session(&self) -> Result<Option<Session>, StorageError>;

    /// Persist token and user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if either value cannot be stored.
    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Forget the persisted session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn clear_session(&self) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY STORE ───────────────────────────────────────────────────────────
//

/// Simple in-memory store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under a key, for assertions.
    #[must_use]
    pub fn raw(&self, key: &StorageKey) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|guard| guard.get(&key.to_string()).cloned())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &StorageKey, value: String) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&key.to_string());
        Ok(())
    }
}

//
// ─── TYPED REPOSITORY ──────────────────────────────────────────────────────────
//

/// JSON-over-key/value implementation of the local repositories.
#[derive(Clone)]
pub struct LocalRepository {
    store: Arc<dyn KeyValueStore>,
}

impl LocalRepository {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn read_json<T: DeserializeOwned + Send>(
        &self,
        key: &StorageKey,
    ) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("{key}: {e}")))
    }

    async fn write_json<T: Serialize + Sync + ?Sized>(
        &self,
        key: &StorageKey,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StorageError::Serialization(format!("{key}: {e}")))?;
        self.store.set(key, raw).await
    }

    async fn read_scores(&self, user_id: UserId) -> Result<ScoreMap, StorageError> {
        let key = StorageKey::Scores(user_id);
        let Some(value) = self.read_json::<Value>(&key).await? else {
            return Ok(ScoreMap::new());
        };
        let Value::Object(entries) = value else {
            // Only the keyed shape can be attributed to drugs.
            tracing::warn!(%key, "ignoring scores stored in a legacy shape");
            return Ok(ScoreMap::new());
        };
        Ok(entries
            .into_iter()
            .filter_map(|(drug, raw)| {
                let score = raw.as_f64().map(normalize_score)?;
                let score = u32::try_from(score).unwrap_or(u32::MAX);
                Some((DrugId::new(drug), Score::new(score)))
            })
            .collect())
    }
}

#[async_trait]
impl ProgressRepository for LocalRepository {
    async fn load_progress(&self, user_id: UserId) -> Result<StoredProgress, StorageError> {
        let learning = self
            .read_json(&StorageKey::LearningList(user_id))
            .await?
            .unwrap_or_default();
        let finished = self
            .read_json(&StorageKey::FinishedList(user_id))
            .await?
            .unwrap_or_default();
        let scores = self.read_scores(user_id).await?;
        tracing::debug!(%user_id, "loaded study progress");
        Ok(StoredProgress {
            learning,
            finished,
            scores,
        })
    }

    async fn save_lists(
        &self,
        user_id: UserId,
        learning: &[DrugId],
        finished: &[DrugId],
    ) -> Result<(), StorageError> {
        self.write_json(&StorageKey::LearningList(user_id), learning)
            .await?;
        self.write_json(&StorageKey::FinishedList(user_id), finished)
            .await
    }

    async fn save_scores(&self, user_id: UserId, scores: &ScoreMap) -> Result<(), StorageError> {
        self.write_json(&StorageKey::Scores(user_id), scores).await
    }
}

#[async_trait]
impl RecordingRepository for LocalRepository {
    async fn load_recordings(
        &self,
        user_id: UserId,
        drug_id: &DrugId,
    ) -> Result<Vec<Recording>, StorageError> {
        Ok(self
            .read_json(&StorageKey::Recordings(user_id, drug_id.clone()))
            .await?
            .unwrap_or_default())
    }

    async fn save_recordings(
        &self,
        user_id: UserId,
        drug_id: &DrugId,
        recordings: &[Recording],
    ) -> Result<(), StorageError> {
        self.write_json(&StorageKey::Recordings(user_id, drug_id.clone()), recordings)
            .await
    }

    async fn delete_recordings(
        &self,
        user_id: UserId,
        drug_id: &DrugId,
    ) -> Result<(), StorageError> {
        self.store
            .remove(&StorageKey::Recordings(user_id, drug_id.clone()))
            .await
    }
}

#[async_trait]
impl SessionRepository for LocalRepository {
    async fn load_session(&self) -> Result<Option<Session>, StorageError> {
        let Some(token) = self.store.get(&StorageKey::SessionToken).await? else {
            return Ok(None);
        };
        let Some(user) = self.read_json::<User>(&StorageKey::SessionUser).await? else {
            return Ok(None);
        };
        let token = AuthToken::new(token);
        if token.is_blank() {
            return Ok(None);
        }
        Ok(Some(Session::new(user, token)))
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        self.store
            .set(&StorageKey::SessionToken, session.token.expose().to_owned())
            .await?;
        self.write_json(&StorageKey::SessionUser, &session.user)
            .await
    }

    async fn clear_session(&self) -> Result<(), StorageError> {
        self.store.remove(&StorageKey::SessionToken).await?;
        self.store.remove(&StorageKey::SessionUser).await
    }
}

/// Aggregates local repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub recordings: Arc<dyn RecordingRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Storage {
    /// Build typed repositories over any key/value store.
    #[must_use]
    pub fn from_store(store: Arc<dyn KeyValueStore>) -> Self {
        let repo = LocalRepository::new(store);
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let recordings: Arc<dyn RecordingRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo);
        Self {
            progress,
            recordings,
            sessions,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryStore::new()))
    }
}
