use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use services::api::{AuthApi, AuthResponse, ProfileResponse, StudyRecordApi};
use services::{ApiError, AppConfig, AppServices, EvaluationError, Evaluator};
use speak_core::model::{
    AuthToken, DrugId, Gender, LoginRequest, ProfileUpdate, RankedUser, RankingEntry, Score,
    SignInForm, SignUpForm, SignUpRequest, StudyRecord, User, UserId,
};
use speak_core::time::fixed_clock;
use storage::repository::Storage;

/// Backend double that keeps study records the way the server would.
#[derive(Default)]
struct Backend {
    records: Mutex<Vec<RankingEntry>>,
}

impl Backend {
    fn seed(&self, user_id: u64, name: &str, total_score: u64) {
        self.records.lock().unwrap().push(RankingEntry {
            record: StudyRecord {
                user_id: UserId::new(user_id),
                current_learning: 0,
                finished_learning: 0,
                total_score,
            },
            user: Some(RankedUser {
                username: Some(name.to_owned()),
                gender: None,
            }),
        });
    }

    fn record(&self, user_id: u64) -> Option<StudyRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.record.user_id == UserId::new(user_id))
            .map(|e| e.record.clone())
    }
}

fn account(username: &str) -> AuthResponse {
    AuthResponse {
        token: AuthToken::new("token-42"),
        user: User {
            id: UserId::new(42),
            username: username.to_owned(),
            email: "sam@example.com".into(),
            gender: Gender::Other,
        },
    }
}

#[async_trait]
impl AuthApi for Backend {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        if request.password == "secret" {
            Ok(account("sam"))
        } else {
            Err(ApiError::Status {
                status: reqwest::StatusCode::UNAUTHORIZED,
                message: Some("Invalid password".into()),
            })
        }
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<AuthResponse, ApiError> {
        Ok(account(&request.username))
    }

    async fn update_profile(
        &self,
        _token: &AuthToken,
        _update: &ProfileUpdate,
    ) -> Result<ProfileResponse, ApiError> {
        Ok(ProfileResponse::default())
    }
}

#[async_trait]
impl StudyRecordApi for Backend {
    async fn upsert_study_record(
        &self,
        _token: &AuthToken,
        record: &StudyRecord,
    ) -> Result<(), ApiError> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|e| e.record.user_id == record.user_id) {
            Some(entry) => entry.record = record.clone(),
            None => records.push(RankingEntry {
                record: record.clone(),
                user: Some(RankedUser {
                    username: Some("sam".into()),
                    gender: Some(Gender::Other),
                }),
            }),
        }
        Ok(())
    }

    async fn get_study_record(&self, user_id: UserId) -> Result<StudyRecord, ApiError> {
        self.record(user_id.value()).ok_or(ApiError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            message: None,
        })
    }

    async fn list_study_records(&self) -> Result<Vec<RankingEntry>, ApiError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

struct Fixed(u32);

#[async_trait]
impl Evaluator for Fixed {
    async fn evaluate(&self, _uri: &str, _drug: &str) -> Result<Score, EvaluationError> {
        Ok(Score::new(self.0))
    }
}

async fn app(db: &str, backend: &Arc<Backend>) -> AppServices {
    let storage = Storage::sqlite(db).await.unwrap();
    AppServices::assemble(
        &storage,
        backend.clone(),
        backend.clone(),
        Arc::new(Fixed(72)),
        &AppConfig::default(),
        fixed_clock(),
    )
}

#[tokio::test]
async fn sign_up_study_and_rank() {
    let backend = Arc::new(Backend::default());
    backend.seed(1, "alex", 500);
    backend.seed(2, "bo", 10);
    let app = app("sqlite:file:memdb_flow?mode=memory&cache=shared", &backend).await;

    app.auth()
        .sign_up(SignUpForm {
            username: "sam".into(),
            email: "sam@example.com".into(),
            password: "secret".into(),
            gender: Gender::Other,
        })
        .await
        .unwrap();
    assert_eq!(backend.record(42).unwrap().total_score, 0);

    let progress = app.progress();
    let aspirin = DrugId::new("Aspirin");
    progress.add_to_learning(aspirin.clone()).await.unwrap();
    progress.add_to_learning(DrugId::new("Warfarin")).await.unwrap();
    progress.mark_finished(aspirin.clone()).await.unwrap();
    assert_eq!(backend.record(42).unwrap().finished_learning, 1);

    let recordings = app.recordings();
    recordings.add(&aspirin, "file://aspirin-1.m4a").await.unwrap();
    let outcome = recordings.evaluate(&aspirin, 0).await.unwrap();
    assert!(outcome.raised);

    let rows = app.ranking().leaderboard().await.unwrap();
    let order: Vec<_> = rows.iter().map(|r| r.entry.username().to_owned()).collect();
    assert_eq!(order, vec!["alex", "sam", "bo"]);
    assert!(rows[1].is_current_user);
    assert_eq!(rows[1].entry.record.total_score, 72);
    assert_eq!(rows[1].rank, 2);

    app.auth().logout().await;
    assert!(app.auth().session().is_none());
    assert!(progress.learning_list().is_empty());
}

#[tokio::test]
async fn progress_survives_a_restart() {
    let backend = Arc::new(Backend::default());
    let db = "sqlite:file:memdb_restart?mode=memory&cache=shared";
    let first = app(db, &backend).await;
    first
        .auth()
        .sign_in(SignInForm {
            email: "sam@example.com".into(),
            password: "secret".into(),
        })
        .await
        .unwrap();
    first
        .progress()
        .add_to_learning(DrugId::new("Metformin"))
        .await
        .unwrap();
    first
        .progress()
        .update_score(DrugId::new("Metformin"), Score::new(64))
        .await
        .unwrap();
    first.progress().flush_pending_sync().await;

    let second = app(db, &backend).await;
    let session = second.auth().restore_session().await.unwrap().unwrap();
    assert_eq!(session.user.id, UserId::new(42));
    let progress = second.progress();
    assert_eq!(progress.learning_list(), vec![DrugId::new("Metformin")]);
    assert_eq!(progress.score(&DrugId::new("Metformin")), Some(Score::new(64)));
    assert_eq!(progress.study_data().total_score, 64);
    drop(first);
}

#[tokio::test]
async fn wrong_password_keeps_user_signed_out() {
    let backend = Arc::new(Backend::default());
    let app = app("sqlite:file:memdb_badpw?mode=memory&cache=shared", &backend).await;
    let err = app
        .auth()
        .sign_in(SignInForm {
            email: "sam@example.com".into(),
            password: "nope".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Incorrect password. Please try again.");
    assert!(app.progress().current_user().is_none());
    assert_eq!(
        app.auth().status().error.as_deref(),
        Some("Incorrect password. Please try again.")
    );
}
