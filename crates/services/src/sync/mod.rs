//! Pushes local study aggregates to the backend.

mod debounce;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use speak_core::model::{AuthContext, StudyData};

use crate::api::StudyRecordApi;

pub use debounce::{DEFAULT_DEBOUNCE, DebouncedSync};

/// Best-effort upload of a user's `StudyData`.
///
/// Both operations report success as a bool and never fail; callers log and
/// carry on since local state stays the source of truth.
#[async_trait]
pub trait StudySync: Send + Sync {
    /// Push `data` now. Anonymous callers succeed without a request.
    async fn sync_immediate(&self, auth: Option<&AuthContext>, data: StudyData) -> bool;

    /// Create the zeroed record for a freshly registered user.
    async fn create_initial(&self, auth: &AuthContext) -> bool;
}

/// `StudySync` backed by `POST /study-record`.
#[derive(Clone)]
pub struct StudyRecordSync {
    api: Arc<dyn StudyRecordApi>,
}

impl StudyRecordSync {
    #[must_use]
    pub fn new(api: Arc<dyn StudyRecordApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StudySync for StudyRecordSync {
    async fn sync_immediate(&self, auth: Option<&AuthContext>, data: StudyData) -> bool {
        let Some(auth) = auth.filter(|auth| !auth.token.is_blank()) else {
            debug!("skipping study sync for anonymous user");
            return true;
        };
        let record = data.into_record(auth.user_id);
        match self.api.upsert_study_record(&auth.token, &record).await {
            Ok(()) => {
                debug!(user_id = %auth.user_id, total_score = data.total_score, "study data synced");
                true
            }
            Err(err) => {
                warn!(user_id = %auth.user_id, error = %err, "study sync failed");
                false
            }
        }
    }

    async fn create_initial(&self, auth: &AuthContext) -> bool {
        self.sync_immediate(Some(auth), StudyData::zeroed()).await
    }
}

#[cfg(test)]
mod tests {
    use speak_core::model::{AuthToken, UserId};

    use super::*;
    use crate::test_support::FakeBackend;

    fn auth(id: u64, token: &str) -> AuthContext {
        AuthContext::new(UserId::new(id), AuthToken::new(token))
    }

    #[tokio::test]
    async fn anonymous_sync_succeeds_without_request() {
        let backend = Arc::new(FakeBackend::default());
        let sync = StudyRecordSync::new(backend.clone());
        assert!(sync.sync_immediate(None, StudyData::zeroed()).await);
        assert!(sync.sync_immediate(Some(&auth(1, "  ")), StudyData::zeroed()).await);
        assert!(backend.upserts().is_empty());
    }

    #[tokio::test]
    async fn sync_posts_record_for_user() {
        let backend = Arc::new(FakeBackend::default());
        let sync = StudyRecordSync::new(backend.clone());
        let data = StudyData {
            total_score: 30,
            current_learning: 2,
            finished_learning: 1,
        };
        assert!(sync.sync_immediate(Some(&auth(9, "tok")), data).await);
        assert_eq!(backend.upserts(), vec![data.into_record(UserId::new(9))]);
    }

    #[tokio::test]
    async fn failed_push_reports_false() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_upserts(true);
        let sync = StudyRecordSync::new(backend.clone());
        assert!(!sync.create_initial(&auth(3, "tok")).await);
    }

    #[tokio::test]
    async fn initial_record_is_zeroed() {
        let backend = Arc::new(FakeBackend::default());
        let sync = StudyRecordSync::new(backend.clone());
        assert!(sync.create_initial(&auth(3, "tok")).await);
        assert_eq!(
            backend.upserts(),
            vec![StudyData::zeroed().into_record(UserId::new(3))]
        );
    }
}
