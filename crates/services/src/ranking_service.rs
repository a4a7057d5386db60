use std::sync::Arc;

use tracing::{debug, warn};

use speak_core::model::{RankingEntry, StudyRecord, UserId};

use crate::api::StudyRecordApi;
use crate::error::RankingError;
use crate::progress_store::ProgressStore;

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingRow {
    /// 1-based position.
    pub rank: usize,
    pub entry: RankingEntry,
    pub is_current_user: bool,
}

/// Orders every user's study record by total score.
pub struct RankingService {
    api: Arc<dyn StudyRecordApi>,
    store: Arc<ProgressStore>,
}

impl RankingService {
    #[must_use]
    pub fn new(api: Arc<dyn StudyRecordApi>, store: Arc<ProgressStore>) -> Self {
        Self { api, store }
    }

    /// Push local progress, then fetch and rank all study records.
    ///
    /// Ties keep the backend's order. A failed push does not stop the fetch.
    ///
    /// # Errors
    ///
    /// Returns `RankingError::Fetch` if the records cannot be fetched.
    pub async fn leaderboard(&self) -> Result<Vec<RankingRow>, RankingError> {
        let current = self.store.current_user();
        if current.is_some() && !self.store.force_sync().await {
            warn!("study sync before ranking failed; showing backend data");
        }

        let entries = self.api.list_study_records().await?;
        debug!(rows = entries.len(), "study records fetched");
        Ok(rank_entries(entries, current))
    }

    /// A single user's backend record.
    ///
    /// # Errors
    ///
    /// Returns `RankingError::Fetch` if the record cannot be fetched.
    pub async fn own_record(&self, user_id: UserId) -> Result<StudyRecord, RankingError> {
        Ok(self.api.get_study_record(user_id).await?)
    }
}

/// Stable sort by descending total score, numbered from 1.
#[must_use]
pub fn rank_entries(mut entries: Vec<RankingEntry>, current: Option<UserId>) -> Vec<RankingRow> {
    entries.sort_by(|a, b| b.record.total_score.cmp(&a.record.total_score));
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankingRow {
            rank: i + 1,
            is_current_user: current == Some(entry.record.user_id),
            entry,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use speak_core::model::{DrugId, RankedUser, Score};
    use storage::Storage;

    use super::*;
    use crate::sync::{DEFAULT_DEBOUNCE, DebouncedSync, StudyRecordSync};
    use crate::test_support::{FakeBackend, auth};

    fn entry(user_id: u64, total_score: u64, name: Option<&str>) -> RankingEntry {
        RankingEntry {
            record: StudyRecord {
                user_id: UserId::new(user_id),
                current_learning: 0,
                finished_learning: 0,
                total_score,
            },
            user: name.map(|name| RankedUser {
                username: Some(name.to_owned()),
                gender: None,
            }),
        }
    }

    fn service() -> (RankingService, Arc<FakeBackend>, Arc<ProgressStore>) {
        let storage = Storage::in_memory();
        let backend = Arc::new(FakeBackend::default());
        let sync = Arc::new(StudyRecordSync::new(backend.clone()));
        let store = Arc::new(ProgressStore::new(
            Arc::clone(&storage.progress),
            Arc::clone(&storage.recordings),
            sync.clone(),
            DebouncedSync::new(sync, DEFAULT_DEBOUNCE),
        ));
        (
            RankingService::new(backend.clone(), Arc::clone(&store)),
            backend,
            store,
        )
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let rows = rank_entries(
            vec![
                entry(1, 50, Some("a")),
                entry(2, 90, Some("b")),
                entry(3, 50, Some("c")),
                entry(4, 70, None),
            ],
            Some(UserId::new(3)),
        );
        let order: Vec<_> = rows.iter().map(|r| r.entry.record.user_id.value()).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].entry.username(), "-");
        assert!(rows[3].is_current_user);
        assert!(rows.iter().filter(|r| r.is_current_user).count() == 1);
    }

    #[tokio::test]
    async fn leaderboard_pushes_local_progress_first() {
        let (service, backend, store) = service();
        store.load_user(auth(9)).await.unwrap();
        store
            .update_score(DrugId::new("Aspirin"), Score::new(45))
            .await
            .unwrap();
        backend.set_records(vec![entry(1, 100, Some("top")), entry(9, 0, Some("me"))]);

        let pushes = backend.upserts().len();
        let rows = service.leaderboard().await.unwrap();
        let upserts = backend.upserts();
        assert_eq!(upserts.len(), pushes + 1);
        assert_eq!(upserts[pushes].total_score, 45);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].is_current_user);
        assert!(!store.has_pending_sync());
    }

    #[tokio::test]
    async fn failed_push_still_fetches() {
        let (service, backend, store) = service();
        store.load_user(auth(9)).await.unwrap();
        backend.fail_upserts(true);
        backend.set_records(vec![entry(9, 10, Some("me"))]);

        let rows = service.leaderboard().await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn anonymous_leaderboard_marks_nobody() {
        let (service, backend, _store) = service();
        backend.set_records(vec![entry(1, 10, None), entry(2, 20, None)]);
        let rows = service.leaderboard().await.unwrap();
        assert!(rows.iter().all(|r| !r.is_current_user));
        assert!(backend.upserts().is_empty());
    }

    #[tokio::test]
    async fn own_record_surfaces_missing_rows() {
        let (service, backend, _store) = service();
        backend.set_records(vec![entry(5, 33, None)]);
        assert_eq!(service.own_record(UserId::new(5)).await.unwrap().total_score, 33);
        assert!(matches!(
            service.own_record(UserId::new(6)).await,
            Err(RankingError::Fetch(_))
        ));
    }
}
