use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::api::{AuthApi, BackendClient, StudyRecordApi};
use crate::auth_service::AuthService;
use crate::config::AppConfig;
use crate::error::AppServicesError;
use crate::evaluation::{Evaluator, MockEvaluator};
use crate::progress_store::ProgressStore;
use crate::ranking_service::RankingService;
use crate::recording_service::RecordingService;
use crate::sync::{DebouncedSync, StudyRecordSync, StudySync};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    store: Arc<ProgressStore>,
    auth: Arc<AuthService>,
    recordings: Arc<RecordingService>,
    ranking: Arc<RankingService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the HTTP backend.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage or the HTTP client cannot be initialised.
    pub async fn new_sqlite(
        db_url: &str,
        config: &AppConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let backend = Arc::new(BackendClient::new(config.api.clone(), clock)?);
        let evaluator = Arc::new(MockEvaluator::new(config.evaluation_latency));
        Ok(Self::assemble(
            &storage,
            backend.clone(),
            backend,
            evaluator,
            config,
            clock,
        ))
    }

    /// Wire services from explicit parts.
    #[must_use]
    pub fn assemble(
        storage: &Storage,
        auth_api: Arc<dyn AuthApi>,
        records_api: Arc<dyn StudyRecordApi>,
        evaluator: Arc<dyn Evaluator>,
        config: &AppConfig,
        clock: Clock,
    ) -> Self {
        let sync: Arc<dyn StudySync> = Arc::new(StudyRecordSync::new(Arc::clone(&records_api)));
        let store = Arc::new(ProgressStore::new(
            Arc::clone(&storage.progress),
            Arc::clone(&storage.recordings),
            Arc::clone(&sync),
            DebouncedSync::new(Arc::clone(&sync), config.sync_debounce),
        ));
        let auth = Arc::new(AuthService::new(
            auth_api,
            Arc::clone(&storage.sessions),
            Arc::clone(&store),
            sync,
            config.api.auth_timeout,
        ));
        let recordings = Arc::new(RecordingService::new(
            clock,
            Arc::clone(&storage.recordings),
            Arc::clone(&store),
            evaluator,
        ));
        let ranking = Arc::new(RankingService::new(records_api, Arc::clone(&store)));

        Self {
            store,
            auth,
            recordings,
            ranking,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn recordings(&self) -> Arc<RecordingService> {
        Arc::clone(&self.recordings)
    }

    #[must_use]
    pub fn ranking(&self) -> Arc<RankingService> {
        Arc::clone(&self.ranking)
    }
}
